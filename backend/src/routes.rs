use actix_files::Files;
use actix_multipart::Multipart;
use actix_web::http::StatusCode;
use actix_web::{web, Error, HttpResponse};
use futures::TryStreamExt;
use log::{info, warn};
use serde::Deserialize;
use shared::{ErrorKind, VerdictRecord};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::detection::Detector;

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    #[serde(default)]
    pub text: Option<String>,
}

/// Byte ceiling for a single uploaded image or video.
#[derive(Debug, Clone, Copy)]
pub struct UploadLimit(pub usize);

enum Upload<T> {
    Missing,
    Received(T),
    TooLarge,
}

pub fn configure_routes(cfg: &mut web::ServiceConfig, static_dir: Option<PathBuf>, max_upload_bytes: usize) {
    cfg.app_data(web::Data::new(UploadLimit(max_upload_bytes)))
        .service(web::resource("/api/detect/text").route(web::post().to(detect_text)))
        .service(web::resource("/api/detect/image").route(web::post().to(detect_image)))
        .service(web::resource("/api/detect/video").route(web::post().to(detect_video)))
        .service(web::resource("/api/models/health").route(web::get().to(model_health)));

    if let Some(dir) = static_dir {
        if dir.is_dir() {
            cfg.service(Files::new("/", dir).index_file("index.html"));
        } else {
            warn!("Static directory {} not found, UI will not be served", dir.display());
        }
    }
}

fn respond(record: VerdictRecord) -> HttpResponse {
    let status = match record.error_kind {
        None => StatusCode::OK,
        Some(ErrorKind::Validation) => StatusCode::BAD_REQUEST,
        Some(ErrorKind::EmptySampleSet) | Some(ErrorKind::VideoUnavailable) => StatusCode::UNPROCESSABLE_ENTITY,
        Some(ErrorKind::ClassifierFailure) | Some(ErrorKind::UnrecognizedLabels) => StatusCode::BAD_GATEWAY,
    };
    HttpResponse::build(status).json(record)
}

async fn detect_text(
    detector: web::Data<Detector>,
    request: web::Json<TextRequest>,
) -> Result<HttpResponse, Error> {
    let text = request.into_inner().text.unwrap_or_default();
    let record = web::block(move || detector.analyze_text(&text)).await?;
    Ok(respond(record))
}

async fn detect_image(
    detector: web::Data<Detector>,
    limit: web::Data<UploadLimit>,
    mut payload: Multipart,
) -> Result<HttpResponse, Error> {
    let record = match read_field(&mut payload, "image", limit.0).await? {
        Upload::TooLarge => detector.reject_oversized_image(limit.0),
        Upload::Missing => web::block(move || detector.analyze_image_bytes(None)).await?,
        Upload::Received(data) => web::block(move || detector.analyze_image_bytes(Some(&data))).await?,
    };
    Ok(respond(record))
}

async fn detect_video(
    detector: web::Data<Detector>,
    limit: web::Data<UploadLimit>,
    mut payload: Multipart,
) -> Result<HttpResponse, Error> {
    let upload = match save_field(&mut payload, "video", limit.0).await? {
        Upload::TooLarge => return Ok(respond(detector.reject_oversized_video(limit.0))),
        Upload::Missing => None,
        Upload::Received(upload) => Some(upload),
    };
    let record = web::block(move || {
        let record = detector.analyze_video(upload.as_ref().map(|u| u.path()));
        drop(upload);
        record
    })
    .await?;
    Ok(respond(record))
}

async fn model_health(detector: web::Data<Detector>) -> Result<HttpResponse, Error> {
    let report = web::block(move || detector.probe_text_model()).await?;
    info!("Model health probe: working={} ({})", report.working, report.message);
    Ok(HttpResponse::Ok().json(report))
}

/// Collects the first field named `wanted`, draining every other field.
/// Stops reading once the field grows past `limit` bytes.
async fn read_field(payload: &mut Multipart, wanted: &str, limit: usize) -> Result<Upload<Vec<u8>>, Error> {
    let mut found = Upload::Missing;
    while let Some(mut field) = payload.try_next().await? {
        let keep = matches!(found, Upload::Missing) && field.name() == Some(wanted);
        let mut data = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            if keep {
                if data.len() + chunk.len() > limit {
                    return Ok(Upload::TooLarge);
                }
                data.extend_from_slice(&chunk);
            }
        }
        if keep {
            found = Upload::Received(data);
        }
    }
    Ok(found)
}

/// Uploaded file spooled to the temp directory, removed on drop.
struct TempUpload {
    path: PathBuf,
}

impl TempUpload {
    fn new() -> Self {
        Self {
            path: std::env::temp_dir().join(format!("authenticity-guard-{}.upload", Uuid::new_v4())),
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove upload {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Streams the first non-empty field named `wanted` to a temp file. A field
/// past `limit` bytes is discarded along with its partial file.
async fn save_field(payload: &mut Multipart, wanted: &str, limit: usize) -> Result<Upload<TempUpload>, Error> {
    let mut saved = Upload::Missing;
    while let Some(mut field) = payload.try_next().await? {
        if !matches!(saved, Upload::Missing) || field.name() != Some(wanted) {
            while field.try_next().await?.is_some() {}
            continue;
        }

        let upload = TempUpload::new();
        let mut file = tokio::fs::File::create(upload.path()).await?;
        let mut written = 0usize;
        while let Some(chunk) = field.try_next().await? {
            written += chunk.len();
            if written > limit {
                drop(file);
                return Ok(Upload::TooLarge);
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;

        if written > 0 {
            saved = Upload::Received(upload);
        }
    }
    Ok(saved)
}
