//! Provenance-carrying events.
//!
//! Every mutation of the belief state is described by exactly one `Event`.
//! Events are immutable once recorded; the log they live in exposes no update
//! or delete operation.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::id::{EventId, EvidenceId, SessionId, SubjectId};

/// Kind of entity an event targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A hypothesis.
    Hypothesis,
    /// A pattern.
    Pattern,
    /// A pending insight.
    Insight,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hypothesis => write!(f, "hypothesis"),
            Self::Pattern => write!(f, "pattern"),
            Self::Insight => write!(f, "insight"),
        }
    }
}

/// What happened.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    HypothesisFormed,
    EvidenceAttached,
    HypothesisResolved,
    PatternDetected,
    InsightQueued,
    InsightDisclosed,
}

impl EventType {
    /// The entity type this kind of event applies to.
    #[must_use]
    pub const fn entity_type(self) -> EntityType {
        match self {
            Self::HypothesisFormed | Self::EvidenceAttached | Self::HypothesisResolved => {
                EntityType::Hypothesis
            }
            Self::PatternDetected => EntityType::Pattern,
            Self::InsightQueued | Self::InsightDisclosed => EntityType::Insight,
        }
    }

    /// True for events that bring a new entity into existence.
    #[must_use]
    pub const fn is_creation(self) -> bool {
        matches!(
            self,
            Self::HypothesisFormed | Self::PatternDetected | Self::InsightQueued
        )
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::HypothesisFormed => "hypothesis_formed",
            Self::EvidenceAttached => "evidence_attached",
            Self::HypothesisResolved => "hypothesis_resolved",
            Self::PatternDetected => "pattern_detected",
            Self::InsightQueued => "insight_queued",
            Self::InsightDisclosed => "insight_disclosed",
        };
        f.write_str(s)
    }
}

/// Before/after values of one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    /// `null` for creations.
    pub from: serde_json::Value,
    /// Value after the mutation.
    pub to: serde_json::Value,
}

impl FieldChange {
    /// A change between two values.
    #[must_use]
    pub fn new(from: serde_json::Value, to: serde_json::Value) -> Self {
        Self { from, to }
    }

    /// A field that did not exist before.
    #[must_use]
    pub fn created(to: serde_json::Value) -> Self {
        Self {
            from: serde_json::Value::Null,
            to,
        }
    }
}

/// One immutable record of a belief state mutation.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    /// Logical time; non-decreasing per subject.
    pub timestamp: DateTime<Utc>,
    pub session_id: SessionId,
    pub subject_id: SubjectId,
    pub event_type: EventType,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub changes: BTreeMap<String, FieldChange>,
    pub reasoning: String,
    #[serde(default)]
    pub evidence_refs: Vec<EvidenceId>,
    /// Parent event in a cascade; `None` for root events.
    #[serde(default)]
    pub triggered_by: Option<EventId>,
    pub recorded_at: DateTime<Utc>,
}

impl Event {
    /// True when this event starts a cascade.
    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.triggered_by.is_none()
    }

    /// The change recorded for `field`, if any.
    #[must_use]
    pub fn change(&self, field: &str) -> Option<&FieldChange> {
        self.changes.get(field)
    }
}

/// Who is making a mutation and why.
///
/// Every belief store mutation takes one of these; its `reasoning` ends up on
/// the recorded event.
#[derive(Debug, Clone, PartialEq)]
pub struct Provenance {
    /// Session the mutation happened in.
    pub session_id: SessionId,
    /// Human-readable justification. Must not be blank.
    pub reasoning: String,
    /// Parent event when this mutation is part of a cascade.
    pub triggered_by: Option<EventId>,
}

impl Provenance {
    /// Creates a root provenance.
    #[must_use]
    pub fn new(session_id: impl Into<SessionId>, reasoning: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            reasoning: reasoning.into(),
            triggered_by: None,
        }
    }

    /// Marks the mutation as caused by `parent`.
    #[must_use]
    pub fn triggered_by(mut self, parent: EventId) -> Self {
        self.triggered_by = Some(parent);
        self
    }

    /// Rejects blank reasoning.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyReasoning` when `reasoning` is blank.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.reasoning.trim().is_empty() {
            return Err(ValidationError::EmptyReasoning);
        }
        Ok(())
    }
}
