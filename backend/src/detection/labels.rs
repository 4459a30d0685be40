use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::classifier::LabelScore;

/// Raw label strings one model uses for each semantic class.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LabelAliases {
    pub ai: Vec<String>,
    pub human: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelClass {
    Ai,
    Human,
}

impl LabelAliases {
    pub fn new(ai: &[&str], human: &[&str]) -> Self {
        Self {
            ai: ai.iter().map(|s| s.to_string()).collect(),
            human: human.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn class_of(&self, label: &str) -> Option<LabelClass> {
        if self.ai.iter().any(|alias| alias.eq_ignore_ascii_case(label)) {
            Some(LabelClass::Ai)
        } else if self.human.iter().any(|alias| alias.eq_ignore_ascii_case(label)) {
            Some(LabelClass::Human)
        } else {
            None
        }
    }
}

/// `model_id -> aliases`, so a new model only needs a config entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelAliasTable(HashMap<String, LabelAliases>);

impl LabelAliasTable {
    pub fn new(models: HashMap<String, LabelAliases>) -> Self {
        Self(models)
    }

    pub fn for_model(&self, model_id: &str) -> Option<&LabelAliases> {
        self.0.get(model_id)
    }
}

/// Two-class probabilities in percent. They need not sum to 100.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ProbabilityPair {
    pub ai: f64,
    pub human: f64,
}

impl ProbabilityPair {
    pub fn new(ai: f64, human: f64) -> Self {
        Self { ai, human }
    }

    /// Pair whose human side is the complement of `ai`.
    pub fn complement_of(ai: f64) -> Self {
        let ai = ai.clamp(0.0, 100.0);
        Self { ai, human: 100.0 - ai }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub pair: ProbabilityPair,
    /// Entries whose label hit either alias set.
    pub matched: usize,
}

impl Normalized {
    pub fn recognized(&self) -> bool {
        self.matched > 0
    }
}

/// Maps raw classifier output onto an AI/human pair. The last matching entry
/// for a class wins; unmatched labels are skipped.
pub fn normalize(result: &[LabelScore], aliases: &LabelAliases) -> Normalized {
    let mut pair = ProbabilityPair::default();
    let mut matched = 0;

    for entry in result {
        let percent = (f64::from(entry.score) * 100.0).clamp(0.0, 100.0);
        match aliases.class_of(&entry.label) {
            Some(LabelClass::Ai) => pair.ai = percent,
            Some(LabelClass::Human) => pair.human = percent,
            None => continue,
        }
        matched += 1;
    }

    Normalized { pair, matched }
}
