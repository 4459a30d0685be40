use image::RgbImage;
use log::{error, info, warn};
use reqwest::blocking::Client as HttpClient;
use serde::Serialize;
use shared::{ErrorKind, VerdictRecord};
use std::path::Path;
use std::sync::Arc;

use super::error::DetectionError;
use super::heuristics::{RandomPlaceholder, StylometricHeuristic, VarianceHeuristic};
use super::labels::ProbabilityPair;
use super::sampler::{mean_ai_probability, sample_frames, SamplingPolicy};
use super::scorers::{ImageScorer, ModelBackedImage, ModelBackedText, ModelBinding, TextScorer};
use super::verdict::aggregate;
use crate::classifier::{HfInferenceClient, ImageClassifier, TextClassifier};
use crate::config::{AppConfig, ConfigError};
use crate::video::{FfmpegDecoder, VideoDecoder};

const HEALTH_PROBE_TEXT: &str = "Artificial intelligence is a branch of computer science that aims to create \
    intelligent machines. It has become an essential part of the technology industry.";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextLimits {
    pub min_chars: usize,
    pub max_chars: usize,
}

impl Default for TextLimits {
    fn default() -> Self {
        Self {
            min_chars: 50,
            max_chars: 512,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub working: bool,
    pub model: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<VerdictRecord>,
}

/// Everything a request handler needs, built once at startup and read-only
/// afterwards.
#[derive(Clone)]
pub struct Detector {
    text: Arc<dyn TextScorer>,
    image: Arc<dyn ImageScorer>,
    frames: Arc<dyn ImageScorer>,
    decoder: Arc<dyn VideoDecoder>,
    text_limits: TextLimits,
    sampling: SamplingPolicy,
    video_model_name: String,
}

impl Detector {
    pub fn new(
        text: Arc<dyn TextScorer>,
        image: Arc<dyn ImageScorer>,
        frames: Arc<dyn ImageScorer>,
        decoder: Arc<dyn VideoDecoder>,
    ) -> Self {
        Self {
            text,
            image,
            frames,
            decoder,
            text_limits: TextLimits::default(),
            sampling: SamplingPolicy::default(),
            video_model_name: "Frame-by-Frame Analysis".to_string(),
        }
    }

    pub fn with_text_limits(mut self, limits: TextLimits) -> Self {
        self.text_limits = limits;
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingPolicy) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn with_video_model_name(mut self, name: impl Into<String>) -> Self {
        self.video_model_name = name.into();
        self
    }

    /// Selects model-backed or fallback scorers from the configuration.
    pub fn from_config(config: &AppConfig, http_client: &HttpClient) -> Result<Self, ConfigError> {
        let strict = config.inference.strict_labels;
        let hf_client = |model: &str| {
            HfInferenceClient::new(
                http_client.clone(),
                &config.inference.endpoint,
                model,
                config.inference.api_token.clone(),
            )
            .map_err(|e| ConfigError::Invalid(format!("inference endpoint: {}", e)))
        };
        let aliases_for = |model: &str| {
            config
                .labels
                .for_model(model)
                .cloned()
                .ok_or_else(|| ConfigError::MissingAliases(model.to_string()))
        };

        let text: Arc<dyn TextScorer> = if config.text.models.is_empty() {
            warn!("No text model configured, using {}", config.text.fallback_name);
            Arc::new(StylometricHeuristic::new(&config.text.fallback_name))
        } else {
            let mut bindings = Vec::with_capacity(config.text.models.len());
            for model in &config.text.models {
                let classifier: Arc<dyn TextClassifier> = Arc::new(hf_client(model.as_str())?);
                bindings.push(ModelBinding::new(classifier, aliases_for(model.as_str())?));
            }
            info!("Text models: {}", config.text.models.join(", "));
            Arc::new(ModelBackedText::new(&config.text.display_name, bindings, strict))
        };

        let (image, frames): (Arc<dyn ImageScorer>, Arc<dyn ImageScorer>) = match &config.image.model {
            Some(model) => {
                let classifier: Arc<dyn ImageClassifier> = Arc::new(hf_client(model.as_str())?);
                let scorer: Arc<dyn ImageScorer> = Arc::new(ModelBackedImage::new(
                    &config.image.display_name,
                    ModelBinding::new(classifier, aliases_for(model.as_str())?),
                    strict,
                ));
                info!("Image model: {}", model);
                (scorer.clone(), scorer)
            }
            None => {
                let placeholder = &config.video.placeholder;
                warn!(
                    "No image model configured, images use {} and video frames a random placeholder in [{}, {}]",
                    config.image.fallback_name, placeholder.min, placeholder.max
                );
                let image: Arc<dyn ImageScorer> = Arc::new(VarianceHeuristic::new(&config.image.fallback_name));
                let frames: Arc<dyn ImageScorer> = Arc::new(RandomPlaceholder::new(
                    "Random Placeholder",
                    placeholder.min,
                    placeholder.max,
                    placeholder.seed,
                ));
                (image, frames)
            }
        };

        let decoder = Arc::new(FfmpegDecoder::new(&config.video.ffmpeg, &config.video.ffprobe));

        Ok(Self::new(text, image, frames, decoder)
            .with_text_limits(TextLimits {
                min_chars: config.text.min_chars,
                max_chars: config.text.max_chars,
            })
            .with_sampling(SamplingPolicy {
                every_secs: config.video.sample_every_secs,
                max_samples: config.video.max_frames,
            })
            .with_video_model_name(&config.video.display_name))
    }

    pub fn analyze_text(&self, text: &str) -> VerdictRecord {
        let model = self.text.model_name();
        finish("text", model, self.try_analyze_text(text))
    }

    /// Decodes an uploaded image and analyzes it. Undecodable bytes are a
    /// validation error.
    pub fn analyze_image_bytes(&self, bytes: Option<&[u8]>) -> VerdictRecord {
        let image = match bytes.filter(|b| !b.is_empty()) {
            None => None,
            Some(bytes) => match image::load_from_memory(bytes) {
                Ok(decoded) => Some(decoded.to_rgb8()),
                Err(e) => {
                    let err = DetectionError::Validation(format!("Could not decode image: {}", e));
                    return finish("image", self.image.model_name(), Err(err));
                }
            },
        };
        self.analyze_image(image.as_ref())
    }

    pub fn analyze_image(&self, image: Option<&RgbImage>) -> VerdictRecord {
        let model = self.image.model_name();
        finish("image", model, self.try_analyze_image(image))
    }

    pub fn analyze_video(&self, path: Option<&Path>) -> VerdictRecord {
        finish("video", &self.video_model_name, self.try_analyze_video(path))
    }

    /// Validation record for an image upload past `limit` bytes.
    pub fn reject_oversized_image(&self, limit: usize) -> VerdictRecord {
        finish("image", self.image.model_name(), Err(oversized_upload(limit)))
    }

    pub fn reject_oversized_video(&self, limit: usize) -> VerdictRecord {
        finish("video", &self.video_model_name, Err(oversized_upload(limit)))
    }

    /// Classifies a fixed sentence to check the text model answers.
    pub fn probe_text_model(&self) -> HealthReport {
        let record = self.analyze_text(HEALTH_PROBE_TEXT);
        let model = self.text.model_name().to_string();
        if record.is_error() {
            HealthReport {
                working: false,
                model,
                message: record.message.unwrap_or_else(|| "Text model did not answer".to_string()),
                result: None,
            }
        } else {
            HealthReport {
                working: true,
                model,
                message: "Text model is answering".to_string(),
                result: Some(record),
            }
        }
    }

    fn try_analyze_text(&self, text: &str) -> Result<VerdictRecord, DetectionError> {
        let limits = &self.text_limits;
        if text.is_empty() || text.chars().count() < limits.min_chars {
            return Err(DetectionError::Validation(format!(
                "Please enter at least {} characters.",
                limits.min_chars
            )));
        }

        let pair = self.text.score(truncate_chars(text, limits.max_chars))?;
        Ok(aggregate(pair, self.text.model_name()))
    }

    fn try_analyze_image(&self, image: Option<&RgbImage>) -> Result<VerdictRecord, DetectionError> {
        let image = image.ok_or_else(|| DetectionError::Validation("Please upload an image.".to_string()))?;
        let pair = self.image.score(image)?;
        Ok(aggregate(pair, self.image.model_name()))
    }

    fn try_analyze_video(&self, path: Option<&Path>) -> Result<VerdictRecord, DetectionError> {
        let path = path.ok_or_else(|| DetectionError::Validation("Please upload a video.".to_string()))?;
        let mut source = self.decoder.open(path).map_err(DetectionError::VideoUnavailable)?;

        let samples = sample_frames(source.as_mut(), self.frames.as_ref(), &self.sampling)?;
        drop(source);

        let mean = mean_ai_probability(&samples).ok_or(DetectionError::EmptySampleSet)?;
        Ok(aggregate(ProbabilityPair::complement_of(mean), &self.video_model_name)
            .with_frames_analyzed(samples.len()))
    }
}

fn finish(kind: &str, model: &str, outcome: Result<VerdictRecord, DetectionError>) -> VerdictRecord {
    match outcome {
        Ok(record) => {
            info!(
                "{} analysis by {}: {} ({:.1}% AI)",
                kind, model, record.verdict, record.ai_probability
            );
            record
        }
        Err(e) => {
            let record = e.into_record(model);
            if record.error_kind == Some(ErrorKind::Validation) {
                info!("{} analysis rejected: {}", kind, record.message.as_deref().unwrap_or_default());
            } else {
                error!("{} analysis failed: {}", kind, record.message.as_deref().unwrap_or_default());
            }
            record
        }
    }
}

fn oversized_upload(limit: usize) -> DetectionError {
    DetectionError::Validation(format!("Upload exceeds the limit of {} bytes.", limit))
}

/// First `max_chars` characters of `text`, cut on a char boundary.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
