use shared::{ErrorKind, VerdictRecord};

use crate::classifier::ClassifierError;
use crate::video::VideoError;

#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("{0}")]
    Validation(String),
    #[error("Analysis failed: {0}")]
    ClassifierFailure(#[from] ClassifierError),
    #[error("Model {model} returned no recognized labels (saw: {labels})")]
    UnrecognizedLabels { model: String, labels: String },
    #[error("No frames could be analyzed.")]
    EmptySampleSet,
    #[error("Could not open video file: {0}")]
    VideoUnavailable(VideoError),
    #[error("Analysis failed: {0}")]
    Decode(VideoError),
}

impl DetectionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DetectionError::Validation(_) => ErrorKind::Validation,
            DetectionError::ClassifierFailure(_) | DetectionError::Decode(_) => ErrorKind::ClassifierFailure,
            DetectionError::UnrecognizedLabels { .. } => ErrorKind::UnrecognizedLabels,
            DetectionError::EmptySampleSet => ErrorKind::EmptySampleSet,
            DetectionError::VideoUnavailable(_) => ErrorKind::VideoUnavailable,
        }
    }

    pub fn into_record(self, model_name: &str) -> VerdictRecord {
        VerdictRecord::error(self.kind(), self.to_string(), model_name)
    }
}
