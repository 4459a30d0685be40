//! Non-model scorers used when no pretrained classifier is configured.
//!
//! None of these are detectors. Their constants are uncalibrated and exist so
//! the service still answers with a plausible-looking record.

use image::RgbImage;
use lazy_static::lazy_static;
use ndarray::ArrayView3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use regex::Regex;
use std::sync::Mutex;

use super::error::DetectionError;
use super::labels::ProbabilityPair;
use super::scorers::{ImageScorer, TextScorer};

lazy_static! {
    static ref SENTENCE_END: Regex = Regex::new(r"[.!?]+").expect("valid sentence regex");
    static ref FIRST_PERSON: Regex = Regex::new(r"(?i)\b(I|my|me|we|our)\b").expect("valid pronoun regex");
    static ref REPEATED_PUNCTUATION: Regex = Regex::new(r"[!?]{2,}").expect("valid punctuation regex");
}

/// Image fallback: low pixel variance reads as AI.
/// `ai = clamp(100 - variance / 100, 0, 100)`.
pub struct VarianceHeuristic {
    display_name: String,
}

impl VarianceHeuristic {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
        }
    }
}

/// Population variance over every channel value of the image.
pub fn pixel_variance(image: &RgbImage) -> Result<f64, DetectionError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(DetectionError::Validation("Image has no pixels.".to_string()));
    }

    let pixels = ArrayView3::from_shape((height as usize, width as usize, 3), image.as_raw().as_slice())
        .map_err(|e| DetectionError::Validation(format!("Unexpected pixel layout: {}", e)))?;
    Ok(pixels.mapv(f64::from).var(0.0))
}

impl ImageScorer for VarianceHeuristic {
    fn model_name(&self) -> &str {
        &self.display_name
    }

    fn score(&self, image: &RgbImage) -> Result<ProbabilityPair, DetectionError> {
        let variance = pixel_variance(image)?;
        Ok(ProbabilityPair::complement_of(100.0 - variance / 100.0))
    }
}

/// Frame fallback: a uniform random AI score drawn from `[min, max]`.
///
/// Seed it to make video results reproducible.
pub struct RandomPlaceholder {
    display_name: String,
    min: f64,
    max: f64,
    rng: Mutex<StdRng>,
}

impl RandomPlaceholder {
    pub fn new(display_name: impl Into<String>, min: f64, max: f64, seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            display_name: display_name.into(),
            min,
            max,
            rng: Mutex::new(rng),
        }
    }
}

impl ImageScorer for RandomPlaceholder {
    fn model_name(&self) -> &str {
        &self.display_name
    }

    fn score(&self, _image: &RgbImage) -> Result<ProbabilityPair, DetectionError> {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let ai = rng.random_range(self.min..=self.max);
        Ok(ProbabilityPair::complement_of(ai))
    }
}

/// Text fallback built from surface statistics of the input.
pub struct StylometricHeuristic {
    display_name: String,
}

impl StylometricHeuristic {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
        }
    }
}

pub fn stylometric_ai_score(text: &str) -> f64 {
    let sentences = SENTENCE_END
        .split(text)
        .filter(|s| !s.trim().is_empty())
        .count()
        .max(1);
    let words = text.split_whitespace().count().max(1);
    let letters = text.chars().filter(|c| !c.is_whitespace()).count();

    let avg_word_length = letters as f64 / words as f64;
    let avg_sentence_length = words as f64 / sentences as f64;

    let mut score: f64 = 0.0;
    if avg_sentence_length > 20.0 {
        score += 25.0;
    }
    if avg_word_length > 5.5 {
        score += 20.0;
    }
    if !FIRST_PERSON.is_match(text) {
        score += 25.0;
    }
    if !REPEATED_PUNCTUATION.is_match(text) && !text.contains("...") {
        score += 15.0;
    }
    if text.split("\n\n").count() < 2 {
        score += 15.0;
    }
    score.min(100.0)
}

impl TextScorer for StylometricHeuristic {
    fn model_name(&self) -> &str {
        &self.display_name
    }

    fn score(&self, text: &str) -> Result<ProbabilityPair, DetectionError> {
        Ok(ProbabilityPair::complement_of(stylometric_ai_score(text)))
    }
}
