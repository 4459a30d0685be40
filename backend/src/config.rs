use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::classifier::hf_inference::DEFAULT_ENDPOINT;
use crate::detection::labels::{LabelAliasTable, LabelAliases};

pub const DEFAULT_CONFIG_PATH: &str = "config/detector.yaml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("No label aliases configured for model {0}")]
    MissingAliases(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub text: TextConfig,
    pub image: ImageConfig,
    pub video: VideoConfig,
    pub inference: InferenceConfig,
    pub labels: LabelAliasTable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: Option<PathBuf>,
    /// Largest accepted image or video upload.
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TextConfig {
    pub display_name: String,
    pub fallback_name: String,
    /// Tried in order; empty selects the stylometric fallback.
    pub models: Vec<String>,
    pub min_chars: usize,
    pub max_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    pub display_name: String,
    pub fallback_name: String,
    /// `None` selects the variance heuristic.
    pub model: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub display_name: String,
    pub sample_every_secs: f64,
    pub max_frames: usize,
    pub ffmpeg: String,
    pub ffprobe: String,
    pub placeholder: PlaceholderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaceholderConfig {
    pub min: f64,
    pub max: f64,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub endpoint: String,
    #[serde(skip_serializing)]
    pub api_token: Option<String>,
    /// Treat a response with no recognized label as an error instead of 0%/0%.
    pub strict_labels: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 7860,
            static_dir: None,
            max_upload_bytes: 100 * 1024 * 1024,
        }
    }
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            display_name: "ChatGPT Detector (RoBERTa)".to_string(),
            fallback_name: "Fallback Heuristics".to_string(),
            models: vec!["Hello-SimpleAI/chatgpt-detector-roberta".to_string()],
            min_chars: 50,
            max_chars: 512,
        }
    }
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            display_name: "AI Image Detector".to_string(),
            fallback_name: "Fallback Analysis".to_string(),
            model: Some("umm-maybe/AI-image-detector".to_string()),
        }
    }
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            display_name: "Frame-by-Frame Analysis".to_string(),
            sample_every_secs: 0.5,
            max_frames: 20,
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            placeholder: PlaceholderConfig::default(),
        }
    }
}

impl Default for PlaceholderConfig {
    fn default() -> Self {
        Self {
            min: 20.0,
            max: 80.0,
            seed: None,
        }
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_token: None,
            strict_labels: false,
        }
    }
}

impl Default for LabelAliasTable {
    fn default() -> Self {
        let mut models = HashMap::new();
        models.insert(
            "Hello-SimpleAI/chatgpt-detector-roberta".to_string(),
            LabelAliases::new(&["ChatGPT", "Fake", "LABEL_1"], &["Human", "Real", "LABEL_0"]),
        );
        models.insert(
            "roberta-base-openai-detector".to_string(),
            LabelAliases::new(&["Fake", "LABEL_1"], &["Real", "LABEL_0"]),
        );
        models.insert(
            "umm-maybe/AI-image-detector".to_string(),
            LabelAliases::new(&["artificial", "LABEL_1"], &["human", "LABEL_0"]),
        );
        LabelAliasTable::new(models)
    }
}

impl AppConfig {
    /// Loads the YAML file at `path`; a missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::warn!("Config file {} not found, using defaults", path.display());
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }

        let config_str = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&config_str)
    }

    pub fn from_yaml(config_str: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = serde_yaml::from_str(config_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolves the config path from `DETECTOR_CONFIG`, loads it, then applies
    /// `PORT` and `HF_API_TOKEN` from the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("DETECTOR_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = Self::load_from(Path::new(&path))?;

        if let Ok(port) = std::env::var("PORT") {
            config.server.port = port
                .parse()
                .map_err(|_| ConfigError::Invalid(format!("PORT is not a valid port: {}", port)))?;
        }
        if let Ok(token) = std::env::var("HF_API_TOKEN") {
            if !token.trim().is_empty() {
                config.inference.api_token = Some(token);
            }
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let configured = self.text.models.iter().chain(self.image.model.iter());
        for model in configured {
            if self.labels.for_model(model).is_none() {
                return Err(ConfigError::MissingAliases(model.clone()));
            }
        }
        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid("server.max_upload_bytes must be positive".to_string()));
        }
        if self.text.max_chars < self.text.min_chars {
            return Err(ConfigError::Invalid(format!(
                "text.max_chars ({}) is below text.min_chars ({})",
                self.text.max_chars, self.text.min_chars
            )));
        }
        if !(self.video.sample_every_secs.is_finite() && self.video.sample_every_secs > 0.0) {
            return Err(ConfigError::Invalid("video.sample_every_secs must be positive".to_string()));
        }
        if self.video.max_frames == 0 {
            return Err(ConfigError::Invalid("video.max_frames must be at least 1".to_string()));
        }
        let placeholder = &self.video.placeholder;
        if !(placeholder.min <= placeholder.max && placeholder.min >= 0.0 && placeholder.max <= 100.0) {
            return Err(ConfigError::Invalid(format!(
                "video.placeholder range [{}, {}] must lie within [0, 100]",
                placeholder.min, placeholder.max
            )));
        }
        Ok(())
    }
}
