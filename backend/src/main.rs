mod classifier;
mod config;
mod detection;
mod routes;
mod video;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use config::AppConfig;
use detection::Detector;
use routes::configure_routes;
use std::env;

fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    let config = AppConfig::load().map_err(|e| {
        log::error!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration failed: {}", e))
    })?;

    // The blocking client owns its own runtime, so it is built before the
    // actix system starts.
    let http_client = reqwest::blocking::Client::builder()
        .build()
        .map_err(|e| std::io::Error::other(format!("HTTP client setup failed: {}", e)))?;

    let detector = Detector::from_config(&config, &http_client).map_err(|e| {
        log::error!("Failed to build detector: {}", e);
        std::io::Error::other(format!("Detector setup failed: {}", e))
    })?;

    if config.inference.api_token.is_none() {
        log::warn!("HF_API_TOKEN is not set, hosted models may reject requests");
    }

    actix_web::rt::System::new().block_on(serve(config, detector))
}

async fn serve(config: AppConfig, detector: Detector) -> std::io::Result<()> {
    let bind_address = format!("{}:{}", config.server.host, config.server.port);
    let static_dir = config.server.static_dir.clone();
    let max_upload_bytes = config.server.max_upload_bytes;
    let detector = web::Data::new(detector);

    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(detector.clone())
            .configure(|cfg| configure_routes(cfg, static_dir.clone(), max_upload_bytes))
    })
    .bind(&bind_address)?
    .run()
    .await
}
