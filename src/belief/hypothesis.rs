//! Hypotheses: confidence-weighted theories about a subject.
//!
//! The confidence/status table lives in [`Hypothesis::evidence_outcome`], a
//! pure function. The store records its result as an event; it never mutates
//! a hypothesis directly.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::BeliefConfig;
use crate::confidence::Confidence;
use crate::evidence::Evidence;
use crate::id::HypothesisId;

/// Lifecycle status of a hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HypothesisStatus {
    /// Newly formed, not yet supported enough to act on.
    Forming,
    /// Supported; part of the working understanding.
    Active,
    /// Contradicted below the weakening threshold.
    Weakening,
    /// About to be replaced by a successor theory.
    Evolving,
    /// Closed; see `resolution_kind`.
    Resolved,
}

impl Default for HypothesisStatus {
    fn default() -> Self {
        Self::Forming
    }
}

impl fmt::Display for HypothesisStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Forming => write!(f, "forming"),
            Self::Active => write!(f, "active"),
            Self::Weakening => write!(f, "weakening"),
            Self::Evolving => write!(f, "evolving"),
            Self::Resolved => write!(f, "resolved"),
        }
    }
}

/// How a hypothesis came to be.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormationSource {
    DirectObservation,
    CrossPattern,
    PriorKnowledge,
    Contradiction,
}

/// How a hypothesis was closed.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionKind {
    Confirmed,
    Refuted,
    Evolved,
    Outgrown,
}

impl fmt::Display for ResolutionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Confirmed => write!(f, "confirmed"),
            Self::Refuted => write!(f, "refuted"),
            Self::Evolved => write!(f, "evolved"),
            Self::Outgrown => write!(f, "outgrown"),
        }
    }
}

/// What a new piece of evidence does to a hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceEffect {
    /// Raises confidence by the support step.
    Supports,
    /// Lowers confidence by the contradiction step.
    Contradicts,
    /// Recorded without changing confidence or status.
    Neutral,
    /// Forces the hypothesis into `evolving`.
    Transforms,
}

/// Resulting confidence and status after one piece of evidence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EvidenceOutcome {
    /// Confidence after the step, on the basis-point grid.
    pub confidence: Confidence,
    /// Status after threshold checks against the new confidence.
    pub status: HypothesisStatus,
}

/// A theory about the subject, with the evidence behind it.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    pub id: HypothesisId,
    pub theory: String,
    pub domain: String,
    pub formation_source: FormationSource,
    /// Insertion order is chronological.
    pub evidence: Vec<Evidence>,
    pub status: HypothesisStatus,
    pub confidence: Confidence,
    pub formed_at: DateTime<Utc>,
    pub last_evidence_at: DateTime<Utc>,
    pub resolution_kind: Option<ResolutionKind>,
    pub resolution_note: Option<String>,
    pub evolved_into: Option<HypothesisId>,
}

impl Hypothesis {
    /// Starts a draft for [`crate::BeliefStore::form_hypothesis`].
    #[must_use]
    pub fn draft(theory: impl Into<String>, domain: impl Into<String>) -> HypothesisDraft {
        HypothesisDraft::new(theory, domain)
    }

    /// True unless resolved.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.status != HypothesisStatus::Resolved
    }

    /// Confidence and status after applying `effect`.
    ///
    /// Thresholds are checked against the confidence produced by this very
    /// update, not the prior value.
    #[must_use]
    pub fn evidence_outcome(&self, effect: EvidenceEffect, cfg: &BeliefConfig) -> EvidenceOutcome {
        match effect {
            EvidenceEffect::Supports => {
                let confidence = self.confidence.strengthen(cfg.support_step);
                let status = if self.status == HypothesisStatus::Forming
                    && confidence.exceeds(cfg.activation_threshold)
                {
                    HypothesisStatus::Active
                } else {
                    self.status
                };
                EvidenceOutcome { confidence, status }
            }
            EvidenceEffect::Contradicts => {
                let confidence = self.confidence.weaken(cfg.contradiction_step);
                let status = if self.is_live() && confidence.below(cfg.weakening_threshold) {
                    HypothesisStatus::Weakening
                } else {
                    self.status
                };
                EvidenceOutcome { confidence, status }
            }
            EvidenceEffect::Neutral => EvidenceOutcome {
                confidence: self.confidence,
                status: self.status,
            },
            EvidenceEffect::Transforms => EvidenceOutcome {
                confidence: self.confidence,
                status: HypothesisStatus::Evolving,
            },
        }
    }

    /// True iff forming/active and no evidence arrived for more than
    /// `threshold_days` before `now`. Advisory only.
    #[must_use]
    pub fn is_stale(&self, threshold_days: i64, now: DateTime<Utc>) -> bool {
        matches!(self.status, HypothesisStatus::Forming | HypothesisStatus::Active)
            && now - self.last_evidence_at > Duration::days(threshold_days)
    }
}

/// Input for forming a new hypothesis.
#[derive(Debug, Clone)]
pub struct HypothesisDraft {
    pub(crate) theory: String,
    pub(crate) domain: String,
    pub(crate) formation_source: FormationSource,
    pub(crate) confidence: f32,
    pub(crate) status: HypothesisStatus,
    pub(crate) evidence: Vec<Evidence>,
}

impl HypothesisDraft {
    /// A forming, directly observed hypothesis at confidence 0.5.
    #[must_use]
    pub fn new(theory: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            theory: theory.into(),
            domain: domain.into(),
            formation_source: FormationSource::DirectObservation,
            confidence: 0.5,
            status: HypothesisStatus::Forming,
            evidence: Vec::new(),
        }
    }

    /// Sets the formation source.
    #[must_use]
    pub fn formation_source(mut self, source: FormationSource) -> Self {
        self.formation_source = source;
        self
    }

    /// Sets the initial confidence (validated on formation).
    #[must_use]
    pub fn confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    /// Sets the initial status. `resolved` is rejected on formation.
    #[must_use]
    pub fn status(mut self, status: HypothesisStatus) -> Self {
        self.status = status;
        self
    }

    /// Seeds the hypothesis with evidence that prompted it.
    #[must_use]
    pub fn evidence(mut self, evidence: Evidence) -> Self {
        self.evidence.push(evidence);
        self
    }
}
