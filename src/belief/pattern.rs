//! Patterns: themes that cut across several hypotheses.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::confidence::Confidence;
use crate::id::{HypothesisId, PatternId};

/// How a pattern was detected.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    PriorKnowledge,
    Synthesis,
    Explicit,
}

/// A cross-cutting theme. Append-only: patterns have no lifecycle.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: PatternId,
    pub theme: String,
    pub description: String,
    pub related_hypotheses: BTreeSet<HypothesisId>,
    pub confidence: Confidence,
    pub detected_at: DateTime<Utc>,
    pub detection_source: DetectionSource,
}

impl Pattern {
    /// Starts a draft for [`crate::BeliefStore::add_pattern`].
    #[must_use]
    pub fn draft(theme: impl Into<String>, description: impl Into<String>) -> PatternDraft {
        PatternDraft {
            theme: theme.into(),
            description: description.into(),
            related_hypotheses: BTreeSet::new(),
            confidence: 0.5,
            detection_source: DetectionSource::Synthesis,
        }
    }
}

/// Input for recording a new pattern.
#[derive(Debug, Clone)]
pub struct PatternDraft {
    pub(crate) theme: String,
    pub(crate) description: String,
    pub(crate) related_hypotheses: BTreeSet<HypothesisId>,
    pub(crate) confidence: f32,
    pub(crate) detection_source: DetectionSource,
}

impl PatternDraft {
    /// Links a hypothesis that must exist in the same understanding.
    #[must_use]
    pub fn related(mut self, hypothesis: HypothesisId) -> Self {
        self.related_hypotheses.insert(hypothesis);
        self
    }

    /// Sets the confidence (validated on insert).
    #[must_use]
    pub fn confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    /// Sets the detection source.
    #[must_use]
    pub fn detection_source(mut self, source: DetectionSource) -> Self {
        self.detection_source = source;
        self
    }
}
