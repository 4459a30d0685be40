use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::{ImageFormat, RgbImage};
use log::debug;
use reqwest::blocking::Client as HttpClient;
use serde::Deserialize;
use serde_json::json;
use std::io::Cursor;
use url::Url;

use super::{ClassificationResult, ClassifierError, ImageClassifier, LabelScore, TextClassifier};

pub const DEFAULT_ENDPOINT: &str = "https://api-inference.huggingface.co/models/";

/// Client for one model hosted behind the Hugging Face Inference API.
#[derive(Clone)]
pub struct HfInferenceClient {
    http_client: HttpClient,
    model_url: Url,
    model_id: String,
    api_token: Option<String>,
}

// The API answers either `[[{label, score}, ...]]`, `[{label, score}, ...]`
// or `{"error": "..."}` depending on the pipeline and model state.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    Nested(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
    Failure { error: String },
}

impl HfInferenceClient {
    pub fn new(
        http_client: HttpClient,
        endpoint: &str,
        model_id: impl Into<String>,
        api_token: Option<String>,
    ) -> Result<Self, ClassifierError> {
        let model_id = model_id.into();
        let base = if endpoint.ends_with('/') {
            Url::parse(endpoint)?
        } else {
            Url::parse(&format!("{}/", endpoint))?
        };
        let model_url = base.join(&model_id)?;

        Ok(Self {
            http_client,
            model_url,
            model_id,
            api_token,
        })
    }

    fn post(&self, inputs: serde_json::Value) -> Result<ClassificationResult, ClassifierError> {
        let mut request = self
            .http_client
            .post(self.model_url.clone())
            .json(&json!({ "inputs": inputs }));
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send()?;
        let status = response.status();
        let body = response.text()?;
        debug!("Model {} responded with status {}", self.model_id, status);

        if !status.is_success() {
            if body.to_lowercase().contains("loading") {
                return Err(ClassifierError::ModelLoading(self.model_id.clone()));
            }
            return Err(ClassifierError::Status {
                model: self.model_id.clone(),
                status: status.as_u16(),
                body,
            });
        }

        parse_response(&self.model_id, &body)
    }
}

fn parse_response(model_id: &str, body: &str) -> Result<ClassificationResult, ClassifierError> {
    match serde_json::from_str::<InferenceResponse>(body)? {
        InferenceResponse::Nested(rows) => Ok(rows.into_iter().next().unwrap_or_default()),
        InferenceResponse::Flat(items) => Ok(items),
        InferenceResponse::Failure { error } if error.to_lowercase().contains("loading") => {
            Err(ClassifierError::ModelLoading(model_id.to_string()))
        }
        InferenceResponse::Failure { error } => Err(ClassifierError::Api(error)),
    }
}

impl TextClassifier for HfInferenceClient {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn classify(&self, text: &str) -> Result<ClassificationResult, ClassifierError> {
        self.post(json!(text))
    }
}

impl ImageClassifier for HfInferenceClient {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn classify(&self, image: &RgbImage) -> Result<ClassificationResult, ClassifierError> {
        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
        self.post(json!(STANDARD.encode(&png)))
    }
}
