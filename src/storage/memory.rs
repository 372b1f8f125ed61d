//! In-memory storage backends.
//!
//! Thread-safe implementations of the storage traits, intended for embedded
//! usage, tests, and as a reference implementation.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::error::{IntegrityError, StorageError, ValidationError};
use crate::event::{EntityType, Event};
use crate::evidence::Evidence;
use crate::id::{EventId, EvidenceId, SubjectId};
use crate::storage::traits::{EventLog, EvidenceLedger};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

#[derive(Debug, Default)]
struct LedgerState {
    by_id: HashMap<EvidenceId, Evidence>,
    by_subject: HashMap<SubjectId, Vec<EvidenceId>>,
}

/// Thread-safe in-memory evidence ledger.
#[derive(Debug, Default)]
pub struct InMemoryEvidenceLedger {
    state: RwLock<LedgerState>,
}

impl InMemoryEvidenceLedger {
    /// Create a new empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn validate_evidence(evidence: &Evidence) -> Result<(), ValidationError> {
    if evidence.subject_id.as_str().trim().is_empty() {
        return Err(ValidationError::EmptyField {
            field: "subject_id".to_string(),
        });
    }
    if evidence.content.trim().is_empty() {
        return Err(ValidationError::EmptyField {
            field: "content".to_string(),
        });
    }
    Ok(())
}

impl EvidenceLedger for InMemoryEvidenceLedger {
    fn append(&self, evidence: Evidence) -> Result<EvidenceId, StorageError> {
        validate_evidence(&evidence)?;

        let mut state = self.state.write().map_err(|_| lock_err("ledger.append"))?;
        if state.by_id.contains_key(&evidence.id) {
            return Err(StorageError::DuplicateKey(evidence.id.to_string()));
        }

        let id = evidence.id;
        state
            .by_subject
            .entry(evidence.subject_id.clone())
            .or_default()
            .push(id);
        state.by_id.insert(id, evidence);
        Ok(id)
    }

    fn get(&self, id: EvidenceId) -> Result<Option<Evidence>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("ledger.get"))?;
        Ok(state.by_id.get(&id).cloned())
    }

    fn query(
        &self,
        subject: &SubjectId,
        domain: Option<&str>,
    ) -> Result<Vec<Evidence>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("ledger.query"))?;
        let mut out: Vec<Evidence> = state
            .by_subject
            .get(subject)
            .into_iter()
            .flatten()
            .filter_map(|id| state.by_id.get(id))
            .filter(|e| domain.map_or(true, |d| e.domain == d))
            .cloned()
            .collect();
        // Stable: equal instants keep append order.
        out.sort_by_key(|e| e.observed_at);
        Ok(out)
    }

    fn count(&self, subject: &SubjectId) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("ledger.count"))?;
        Ok(state.by_subject.get(subject).map_or(0, Vec::len))
    }
}

#[derive(Debug, Default)]
struct SubjectLog {
    events: Vec<Event>,
    entities: HashMap<Uuid, EntityType>,
    last_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct EventLogState {
    subjects: HashMap<SubjectId, SubjectLog>,
    index: HashMap<EventId, (SubjectId, usize)>,
    children: HashMap<EventId, Vec<EventId>>,
}

impl EventLogState {
    fn lookup(&self, id: EventId) -> Option<&Event> {
        let (subject, pos) = self.index.get(&id)?;
        self.subjects.get(subject)?.events.get(*pos)
    }

    fn check(&self, event: &Event) -> Result<(), IntegrityError> {
        if event.reasoning.trim().is_empty() {
            return Err(IntegrityError::EmptyReasoning { event_id: event.id });
        }
        if self.index.contains_key(&event.id) {
            return Err(IntegrityError::DuplicateEvent { event_id: event.id });
        }

        let log = self.subjects.get(&event.subject_id);

        if let Some(parent) = event.triggered_by {
            // A parent must already be recorded, so it is strictly earlier.
            let same_subject = self
                .index
                .get(&parent)
                .is_some_and(|(subject, _)| *subject == event.subject_id);
            if !same_subject {
                return Err(IntegrityError::UnknownParent {
                    event_id: event.id,
                    parent,
                });
            }
        }

        if let Some(last) = log.and_then(|l| l.last_timestamp) {
            if event.timestamp < last {
                return Err(IntegrityError::NonMonotonicTimestamp {
                    event_id: event.id,
                    subject: event.subject_id.clone(),
                });
            }
        }

        let known = log.and_then(|l| l.entities.get(&event.entity_id));
        let expected = event.event_type.entity_type();
        match (event.event_type.is_creation(), known) {
            (true, Some(_)) => Err(IntegrityError::DuplicateEntity {
                event_id: event.id,
                entity_type: event.entity_type.to_string(),
                entity_id: event.entity_id.to_string(),
            }),
            (false, Some(kind)) if *kind == expected && event.entity_type == expected => Ok(()),
            (true, None) if event.entity_type == expected => Ok(()),
            _ => Err(IntegrityError::UnknownEntity {
                event_id: event.id,
                entity_type: event.entity_type.to_string(),
                entity_id: event.entity_id.to_string(),
            }),
        }
    }
}

/// Thread-safe in-memory event log.
#[derive(Debug, Default)]
pub struct InMemoryEventLog {
    state: RwLock<EventLogState>,
}

impl InMemoryEventLog {
    /// Create a new empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a log by re-recording `events` in order, re-running every
    /// integrity check.
    ///
    /// # Errors
    ///
    /// Returns the first integrity violation encountered.
    pub fn from_events(events: impl IntoIterator<Item = Event>) -> Result<Self, StorageError> {
        let log = Self::new();
        for event in events {
            log.record(event)?;
        }
        Ok(log)
    }

    /// Subjects with at least one recorded event.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::BackendError` if the lock is poisoned.
    pub fn subjects(&self) -> Result<Vec<SubjectId>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("events.subjects"))?;
        let mut out: Vec<SubjectId> = state.subjects.keys().cloned().collect();
        out.sort();
        Ok(out)
    }
}

impl EventLog for InMemoryEventLog {
    fn record(&self, event: Event) -> Result<EventId, StorageError> {
        let mut state = self.state.write().map_err(|_| lock_err("events.record"))?;
        if let Err(err) = state.check(&event) {
            warn!(event_id = %event.id, subject = %event.subject_id, error = %err, "event rejected");
            return Err(err.into());
        }

        let id = event.id;
        if let Some(parent) = event.triggered_by {
            state.children.entry(parent).or_default().push(id);
        }

        let subject = event.subject_id.clone();
        let log = state.subjects.entry(subject.clone()).or_default();
        log.entities.insert(event.entity_id, event.entity_type);
        log.last_timestamp = Some(event.timestamp);
        log.events.push(event);
        let pos = log.events.len() - 1;
        state.index.insert(id, (subject, pos));
        Ok(id)
    }

    fn get(&self, id: EventId) -> Result<Option<Event>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("events.get"))?;
        Ok(state.lookup(id).cloned())
    }

    fn replay(&self, subject: &SubjectId) -> Result<Vec<Event>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("events.replay"))?;
        Ok(state
            .subjects
            .get(subject)
            .map(|log| log.events.clone())
            .unwrap_or_default())
    }

    fn children(&self, id: EventId) -> Result<Vec<Event>, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("events.children"))?;
        Ok(state
            .children
            .get(&id)
            .into_iter()
            .flatten()
            .filter_map(|child| state.lookup(*child).cloned())
            .collect())
    }

    fn count(&self, subject: &SubjectId) -> Result<usize, StorageError> {
        let state = self.state.read().map_err(|_| lock_err("events.count"))?;
        Ok(state.subjects.get(subject).map_or(0, |log| log.events.len()))
    }
}

/// Collects the distinct evidence ids referenced by `events`.
#[must_use]
pub fn referenced_evidence(events: &[Event]) -> HashSet<EvidenceId> {
    events
        .iter()
        .flat_map(|e| e.evidence_refs.iter().copied())
        .collect()
}
