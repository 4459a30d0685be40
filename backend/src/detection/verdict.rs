use shared::{Verdict, VerdictRecord};

use super::labels::ProbabilityPair;

/// AI probability (percent) that must be strictly exceeded for an AI verdict.
pub const AI_THRESHOLD: f64 = 50.0;

pub fn verdict_for(pair: &ProbabilityPair) -> Verdict {
    if pair.ai > AI_THRESHOLD {
        Verdict::Ai
    } else {
        Verdict::Human
    }
}

pub fn confidence_for(pair: &ProbabilityPair) -> f64 {
    pair.ai.max(pair.human)
}

pub fn aggregate(pair: ProbabilityPair, model_name: impl Into<String>) -> VerdictRecord {
    VerdictRecord {
        verdict: verdict_for(&pair),
        ai_probability: pair.ai,
        human_probability: pair.human,
        confidence: confidence_for(&pair),
        model_name: model_name.into(),
        message: None,
        frames_analyzed: None,
        error_kind: None,
    }
}
