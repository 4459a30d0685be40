//! Scoring strategies behind the text and image paths.
//!
//! Each handler holds one `TextScorer` / `ImageScorer` chosen at startup:
//! a model-backed variant when a pretrained classifier is configured, a
//! heuristic or placeholder variant otherwise.

use image::RgbImage;
use log::warn;
use std::sync::Arc;

use super::error::DetectionError;
use super::labels::{normalize, LabelAliases, ProbabilityPair};
use crate::classifier::{ClassificationResult, ClassifierError, ImageClassifier, TextClassifier};

pub trait TextScorer: Send + Sync {
    /// Name reported in the result record.
    fn model_name(&self) -> &str;

    fn score(&self, text: &str) -> Result<ProbabilityPair, DetectionError>;
}

pub trait ImageScorer: Send + Sync {
    fn model_name(&self) -> &str;

    fn score(&self, image: &RgbImage) -> Result<ProbabilityPair, DetectionError>;
}

/// A classifier paired with the label vocabulary it speaks.
pub struct ModelBinding<C: ?Sized> {
    pub classifier: Arc<C>,
    pub aliases: LabelAliases,
}

impl<C: ?Sized> Clone for ModelBinding<C> {
    fn clone(&self) -> Self {
        Self {
            classifier: self.classifier.clone(),
            aliases: self.aliases.clone(),
        }
    }
}

impl<C: ?Sized> ModelBinding<C> {
    pub fn new(classifier: Arc<C>, aliases: LabelAliases) -> Self {
        Self { classifier, aliases }
    }

    fn interpret(
        &self,
        model_id: &str,
        result: &ClassificationResult,
        strict: bool,
    ) -> Result<ProbabilityPair, DetectionError> {
        let normalized = normalize(result, &self.aliases);
        if !normalized.recognized() {
            let labels = seen_labels(result);
            if strict {
                return Err(DetectionError::UnrecognizedLabels {
                    model: model_id.to_string(),
                    labels,
                });
            }
            warn!(
                "Model {} returned no recognized labels (saw: [{}]), reporting 0% for both classes",
                model_id, labels
            );
        }
        Ok(normalized.pair)
    }
}

fn seen_labels(result: &ClassificationResult) -> String {
    result
        .iter()
        .map(|entry| entry.label.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Text scorer over one or more hosted models, tried in order.
///
/// An earlier model that fails or answers with labels it has no aliases for
/// is skipped; the last model's outcome is final.
pub struct ModelBackedText {
    display_name: String,
    models: Vec<ModelBinding<dyn TextClassifier>>,
    strict_labels: bool,
}

impl ModelBackedText {
    pub fn new(
        display_name: impl Into<String>,
        models: Vec<ModelBinding<dyn TextClassifier>>,
        strict_labels: bool,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            models,
            strict_labels,
        }
    }
}

impl TextScorer for ModelBackedText {
    fn model_name(&self) -> &str {
        &self.display_name
    }

    fn score(&self, text: &str) -> Result<ProbabilityPair, DetectionError> {
        let Some((last, earlier)) = self.models.split_last() else {
            return Err(ClassifierError::Api("no text models configured".to_string()).into());
        };

        for binding in earlier {
            let model_id = binding.classifier.model_id();
            match binding.classifier.classify(text) {
                Ok(result) => {
                    let normalized = normalize(&result, &binding.aliases);
                    if normalized.recognized() {
                        return Ok(normalized.pair);
                    }
                    warn!(
                        "Model {} returned no recognized labels (saw: [{}]), trying next model",
                        model_id,
                        seen_labels(&result)
                    );
                }
                Err(e) => warn!("Model {} failed: {}, trying next model", model_id, e),
            }
        }

        let result = last.classifier.classify(text)?;
        last.interpret(last.classifier.model_id(), &result, self.strict_labels)
    }
}

/// Image scorer backed by a hosted image classifier. Also used per video
/// frame when the model is available.
pub struct ModelBackedImage {
    display_name: String,
    binding: ModelBinding<dyn ImageClassifier>,
    strict_labels: bool,
}

impl ModelBackedImage {
    pub fn new(
        display_name: impl Into<String>,
        binding: ModelBinding<dyn ImageClassifier>,
        strict_labels: bool,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            binding,
            strict_labels,
        }
    }
}

impl ImageScorer for ModelBackedImage {
    fn model_name(&self) -> &str {
        &self.display_name
    }

    fn score(&self, image: &RgbImage) -> Result<ProbabilityPair, DetectionError> {
        let result = self.binding.classifier.classify(image)?;
        self.binding
            .interpret(self.binding.classifier.model_id(), &result, self.strict_labels)
    }
}


#[cfg(test)]
mod tests {
    use super::stubs::*;
    use super::*;

    fn text_binding(stub: StubText) -> ModelBinding<dyn TextClassifier> {
        ModelBinding::new(Arc::new(stub) as Arc<dyn TextClassifier>, roberta_aliases())
    }

    #[test]
    fn single_model_scores_through_aliases() {
        let scorer = ModelBackedText::new(
            "ChatGPT Detector (RoBERTa)",
            vec![text_binding(StubText::answering("a", &[("Fake", 0.8), ("Real", 0.2)]))],
            false,
        );

        let pair = scorer.score("some text").unwrap();
        assert!((pair.ai - 80.0).abs() < 1e-4);
        assert!((pair.human - 20.0).abs() < 1e-4);
    }

    #[test]
    fn single_model_failure_is_terminal() {
        let scorer = ModelBackedText::new("m", vec![text_binding(StubText::failing("a", "boom"))], false);

        let err = scorer.score("text").unwrap_err();
        assert!(matches!(err, DetectionError::ClassifierFailure(_)));
    }

    #[test]
    fn chain_skips_failing_and_unrecognized_models() {
        let scorer = ModelBackedText::new(
            "m",
            vec![
                text_binding(StubText::failing("a", "503")),
                text_binding(StubText::answering("b", &[("POSITIVE", 0.9)])),
                text_binding(StubText::answering("c", &[("LABEL_0", 0.7)])),
            ],
            false,
        );

        let pair = scorer.score("text").unwrap();
        assert_eq!(pair.ai, 0.0);
        assert!((pair.human - 70.0).abs() < 1e-4);
    }

    #[test]
    fn strict_mode_flags_unknown_vocabulary() {
        let scorer = ModelBackedText::new(
            "m",
            vec![text_binding(StubText::answering("a", &[("POSITIVE", 0.9)]))],
            true,
        );

        match scorer.score("text") {
            Err(DetectionError::UnrecognizedLabels { model, labels }) => {
                assert_eq!(model, "a");
                assert_eq!(labels, "POSITIVE");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn lenient_mode_reports_zero_for_unknown_vocabulary() {
        let scorer = ModelBackedText::new(
            "m",
            vec![text_binding(StubText::answering("a", &[("POSITIVE", 0.9)]))],
            false,
        );

        assert_eq!(scorer.score("text").unwrap(), ProbabilityPair::default());
    }

    #[test]
    fn image_model_uses_its_own_aliases() {
        let stub = Arc::new(StubImage::answering("img", &[("artificial", 0.3), ("human", 0.7)]));
        let scorer = ModelBackedImage::new(
            "AI Image Detector",
            ModelBinding::new(stub.clone() as Arc<dyn ImageClassifier>, image_aliases()),
            false,
        );

        let pair = scorer.score(&RgbImage::new(2, 2)).unwrap();
        assert!((pair.ai - 30.0).abs() < 1e-4);
        assert_eq!(*stub.calls.lock().unwrap(), 1);
        assert_eq!(scorer.model_name(), "AI Image Detector");
    }
}
