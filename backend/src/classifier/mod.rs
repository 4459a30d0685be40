pub mod hf_inference;

use image::RgbImage;
use serde::{Deserialize, Serialize};

pub use hf_inference::HfInferenceClient;

/// One `(label, score)` pair as emitted by a pretrained classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f32,
}

impl LabelScore {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// Raw output of a classifier for one input. Not ordered by score and may be
/// empty, depending on the model.
pub type ClassificationResult = Vec<LabelScore>;

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Model {model} returned status {status}: {body}")]
    Status {
        model: String,
        status: u16,
        body: String,
    },
    #[error("Model {0} is still loading")]
    ModelLoading(String),
    #[error("Inference API error: {0}")]
    Api(String),
    #[error("Image encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("Malformed classifier response: {0}")]
    MalformedResponse(#[from] serde_json::Error),
    #[error("Invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),
}

/// A pretrained text-classification capability.
pub trait TextClassifier: Send + Sync {
    /// Identifier used to look up the model's label aliases.
    fn model_id(&self) -> &str;

    fn classify(&self, text: &str) -> Result<ClassificationResult, ClassifierError>;
}

/// A pretrained image-classification capability.
pub trait ImageClassifier: Send + Sync {
    fn model_id(&self) -> &str;

    fn classify(&self, image: &RgbImage) -> Result<ClassificationResult, ClassifierError>;
}
