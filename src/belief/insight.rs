//! Pending insights waiting to be shared with the caregiver.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{HypothesisId, InsightId};

/// How important an insight is. Ordered low to high.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    Low,
    Medium,
    High,
}

/// When an insight may be surfaced.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisclosurePolicy {
    NextTurn,
    WhenRelevant,
    WhenAsked,
}

/// An insight queued for disclosure. `disclosed` only ever flips to true.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingInsight {
    pub id: InsightId,
    pub content: String,
    pub importance: Importance,
    pub disclosure_policy: DisclosurePolicy,
    pub related_hypotheses: BTreeSet<HypothesisId>,
    pub created_at: DateTime<Utc>,
    pub disclosed: bool,
}

impl PendingInsight {
    /// Starts a draft for [`crate::BeliefStore::add_insight`].
    #[must_use]
    pub fn draft(content: impl Into<String>) -> InsightDraft {
        InsightDraft {
            content: content.into(),
            importance: Importance::Medium,
            disclosure_policy: DisclosurePolicy::WhenRelevant,
            related_hypotheses: BTreeSet::new(),
        }
    }
}

/// Input for queueing a new insight.
#[derive(Debug, Clone)]
pub struct InsightDraft {
    pub(crate) content: String,
    pub(crate) importance: Importance,
    pub(crate) disclosure_policy: DisclosurePolicy,
    pub(crate) related_hypotheses: BTreeSet<HypothesisId>,
}

impl InsightDraft {
    /// Sets the importance.
    #[must_use]
    pub fn importance(mut self, importance: Importance) -> Self {
        self.importance = importance;
        self
    }

    /// Sets the disclosure policy.
    #[must_use]
    pub fn disclosure_policy(mut self, policy: DisclosurePolicy) -> Self {
        self.disclosure_policy = policy;
        self
    }

    /// Links a hypothesis that must exist in the same understanding.
    #[must_use]
    pub fn related(mut self, hypothesis: HypothesisId) -> Self {
        self.related_hypotheses.insert(hypothesis);
        self
    }
}
