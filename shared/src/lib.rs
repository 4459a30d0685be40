use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Discrete outcome of one analysis request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Verdict {
    Ai,
    Human,
    Error,
}

/// Why a request ended in [`Verdict::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    #[display(fmt = "validation")]
    Validation,
    #[display(fmt = "classifier_failure")]
    ClassifierFailure,
    #[display(fmt = "unrecognized_labels")]
    UnrecognizedLabels,
    #[display(fmt = "empty_sample_set")]
    EmptySampleSet,
    #[display(fmt = "video_unavailable")]
    VideoUnavailable,
}

/// Final result of a text, image, or video analysis.
///
/// Probabilities are kept as plain numbers in `[0, 100]` and rendered on the
/// wire as one-decimal percent strings (`"87.5%"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictRecord {
    pub verdict: Verdict,
    #[serde(with = "percent")]
    pub ai_probability: f64,
    #[serde(with = "percent")]
    pub human_probability: f64,
    #[serde(with = "percent")]
    pub confidence: f64,
    pub model_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames_analyzed: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl VerdictRecord {
    pub fn error(kind: ErrorKind, message: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Error,
            ai_probability: 0.0,
            human_probability: 0.0,
            confidence: 0.0,
            model_name: model_name.into(),
            message: Some(message.into()),
            frames_analyzed: None,
            error_kind: Some(kind),
        }
    }

    pub fn with_frames_analyzed(mut self, frames: usize) -> Self {
        self.frames_analyzed = Some(frames);
        self
    }

    pub fn is_error(&self) -> bool {
        self.verdict == Verdict::Error
    }
}

/// Renders a probability as `"{:.1}%"` and accepts either that form or a bare
/// number when reading it back.
pub mod percent {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(value: f64) -> String {
        format!("{:.1}%", value)
    }

    pub fn serialize<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(*value))
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(n),
            Raw::Text(s) => s
                .trim()
                .trim_end_matches('%')
                .parse::<f64>()
                .map_err(|e| serde::de::Error::custom(format!("Invalid percentage '{}': {}", s, e))),
        }
    }
}
