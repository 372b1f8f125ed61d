//! The belief store: per-subject understanding, mutated only through events.
//!
//! Each mutation is validated, turned into one [`Event`], recorded in the
//! event log and only then installed. A rejected write leaves both the log and
//! the aggregate untouched.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::config::BeliefConfig;
use crate::confidence::Confidence;
use crate::error::{EngineError, EngineResult, StorageError, ValidationError};
use crate::event::{Event, EventType, FieldChange, Provenance};
use crate::evidence::Evidence;
use crate::id::{EventId, EvidenceId, HypothesisId, InsightId, PatternId, SubjectId};
use crate::storage::EventLog;

use super::hypothesis::{
    EvidenceEffect, Hypothesis, HypothesisDraft, HypothesisStatus, ResolutionKind,
};
use super::insight::{InsightDraft, PendingInsight};
use super::journey::Journey;
use super::pattern::{Pattern, PatternDraft};
use super::understanding::Understanding;

/// The id of a newly created entity and the event that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Recorded<T> {
    /// The new entity.
    pub id: T,
    /// The creation event.
    pub event_id: EventId,
}

#[derive(Debug)]
struct SubjectBeliefs {
    understanding: Understanding,
    /// Creation event per entity id.
    origins: HashMap<Uuid, EventId>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl SubjectBeliefs {
    fn hydrate(subject: SubjectId, events: &[Event]) -> EngineResult<Self> {
        let understanding = Understanding::replay(subject, events)?;
        let origins = events
            .iter()
            .filter(|e| e.event_type.is_creation())
            .map(|e| (e.entity_id, e.id))
            .collect();
        Ok(Self {
            understanding,
            origins,
            last_timestamp: events.last().map(|e| e.timestamp),
        })
    }

    /// Strictly increasing per subject, even when the wall clock is not.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        }
    }

    fn hypothesis(&self, subject: &SubjectId, id: HypothesisId) -> EngineResult<&Hypothesis> {
        self.understanding.hypothesis(id).ok_or_else(|| {
            ValidationError::NotFound {
                entity: "hypothesis",
                id: id.to_string(),
                subject: subject.clone(),
            }
            .into()
        })
    }

    fn require_hypotheses<'a>(
        &self,
        field: &str,
        ids: impl IntoIterator<Item = &'a HypothesisId>,
    ) -> Result<(), ValidationError> {
        for id in ids {
            if self.understanding.hypothesis(*id).is_none() {
                return Err(ValidationError::DanglingReference {
                    field: field.to_string(),
                    id: id.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// A mutation about to be recorded.
struct Mutation {
    event_type: EventType,
    entity_id: Uuid,
    changes: BTreeMap<String, FieldChange>,
    evidence_refs: Vec<EvidenceId>,
}

/// Thread-safe store of every subject's [`Understanding`].
///
/// Subjects are partitioned: each has its own mutex, so writes for different
/// subjects never contend. A subject's partition is hydrated from the event
/// log the first time it is touched.
pub struct BeliefStore {
    config: BeliefConfig,
    events: Arc<dyn EventLog>,
    partitions: RwLock<HashMap<SubjectId, Arc<Mutex<SubjectBeliefs>>>>,
}

impl std::fmt::Debug for BeliefStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BeliefStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn lock_err(context: &'static str) -> EngineError {
    StorageError::BackendError(format!("poisoned lock: {context}")).into()
}

fn blank(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::EmptyField {
            field: field.to_string(),
        });
    }
    Ok(())
}

fn to_fields<T: Serialize>(entity: &T) -> EngineResult<serde_json::Map<String, serde_json::Value>> {
    match serde_json::to_value(entity) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(_) => Err(EngineError::internal("entity did not serialize to an object")),
        Err(e) => Err(EngineError::internal(e.to_string())),
    }
}

/// Field-level changes from `before` to `after`. A creation lists every field.
fn diff<T: Serialize>(before: Option<&T>, after: &T) -> EngineResult<BTreeMap<String, FieldChange>> {
    let after = to_fields(after)?;
    let Some(before) = before else {
        return Ok(after
            .into_iter()
            .map(|(field, value)| (field, FieldChange::created(value)))
            .collect());
    };
    let mut before = to_fields(before)?;
    Ok(after
        .into_iter()
        .filter_map(|(field, to)| {
            let from = before.remove(&field).unwrap_or(serde_json::Value::Null);
            (from != to).then(|| (field, FieldChange::new(from, to)))
        })
        .collect())
}

impl BeliefStore {
    /// Creates a store recording into `events`.
    #[must_use]
    pub fn new(config: BeliefConfig, events: Arc<dyn EventLog>) -> Self {
        Self {
            config,
            events,
            partitions: RwLock::new(HashMap::new()),
        }
    }

    /// The arithmetic and staleness settings in use.
    #[must_use]
    pub const fn config(&self) -> &BeliefConfig {
        &self.config
    }

    /// The event log this store records into.
    #[must_use]
    pub fn event_log(&self) -> &Arc<dyn EventLog> {
        &self.events
    }

    fn partition(&self, subject: &SubjectId) -> EngineResult<Arc<Mutex<SubjectBeliefs>>> {
        {
            let partitions = self
                .partitions
                .read()
                .map_err(|_| lock_err("beliefs.partition"))?;
            if let Some(p) = partitions.get(subject) {
                return Ok(Arc::clone(p));
            }
        }

        let mut partitions = self
            .partitions
            .write()
            .map_err(|_| lock_err("beliefs.partition"))?;
        if let Some(p) = partitions.get(subject) {
            return Ok(Arc::clone(p));
        }
        let history = self.events.replay(subject)?;
        let beliefs = SubjectBeliefs::hydrate(subject.clone(), &history)?;
        if !history.is_empty() {
            debug!(subject = %subject, events = history.len(), "hydrated understanding from log");
        }
        let p = Arc::new(Mutex::new(beliefs));
        partitions.insert(subject.clone(), Arc::clone(&p));
        Ok(p)
    }

    fn with_subject<R>(
        &self,
        subject: &SubjectId,
        f: impl FnOnce(&mut SubjectBeliefs) -> EngineResult<R>,
    ) -> EngineResult<R> {
        let partition = self.partition(subject)?;
        let mut beliefs = partition.lock().map_err(|_| lock_err("beliefs.subject"))?;
        f(&mut beliefs)
    }

    fn commit(
        &self,
        subject: &SubjectId,
        beliefs: &mut SubjectBeliefs,
        mutation: Mutation,
        provenance: &Provenance,
    ) -> EngineResult<EventId> {
        let timestamp = beliefs.next_timestamp();
        let event = Event {
            id: EventId::new(),
            timestamp,
            session_id: provenance.session_id.clone(),
            subject_id: subject.clone(),
            event_type: mutation.event_type,
            entity_type: mutation.event_type.entity_type(),
            entity_id: mutation.entity_id,
            changes: mutation.changes,
            reasoning: provenance.reasoning.clone(),
            evidence_refs: mutation.evidence_refs,
            triggered_by: provenance.triggered_by,
            recorded_at: Utc::now(),
        };

        let projected = beliefs.understanding.project(&event)?;
        let event_id = self.events.record(event)?;
        beliefs.understanding.install(projected);
        beliefs.last_timestamp = Some(timestamp);
        if mutation.event_type.is_creation() {
            beliefs.origins.insert(mutation.entity_id, event_id);
        }

        debug!(
            subject = %subject,
            event_id = %event_id,
            event_type = %mutation.event_type,
            entity_id = %mutation.entity_id,
            "belief mutation recorded"
        );
        Ok(event_id)
    }

    /// Forms a new hypothesis and records `hypothesis_formed`.
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank reasoning, theory or domain, an
    /// out-of-range confidence, a `resolved` initial status, or seeded
    /// evidence about another subject.
    pub fn form_hypothesis(
        &self,
        subject: &SubjectId,
        draft: HypothesisDraft,
        provenance: &Provenance,
    ) -> EngineResult<Recorded<HypothesisId>> {
        provenance.validate()?;
        blank("theory", &draft.theory)?;
        blank("domain", &draft.domain)?;
        let confidence = Confidence::new(draft.confidence)?;
        let id = HypothesisId::new();
        if draft.status == HypothesisStatus::Resolved {
            return Err(ValidationError::InvalidInitialStatus {
                id: id.to_string(),
                status: draft.status.to_string(),
            }
            .into());
        }
        let mut evidence = draft.evidence;
        if let Some(foreign) = evidence.iter().find(|e| e.subject_id != *subject) {
            return Err(ValidationError::SubjectMismatch {
                expected: subject.clone(),
                found: foreign.subject_id.clone(),
            }
            .into());
        }
        evidence.sort_by_key(|e| e.observed_at);
        evidence.dedup_by_key(|e| e.id);

        let evidence_refs = evidence.iter().map(|e| e.id).collect();

        self.with_subject(subject, |beliefs| {
            let formed_at = Utc::now();
            let hypothesis = Hypothesis {
                id,
                theory: draft.theory,
                domain: draft.domain,
                formation_source: draft.formation_source,
                last_evidence_at: evidence.last().map_or(formed_at, |e| e.observed_at),
                evidence,
                status: draft.status,
                confidence,
                formed_at,
                resolution_kind: None,
                resolution_note: None,
                evolved_into: None,
            };
            let mutation = Mutation {
                event_type: EventType::HypothesisFormed,
                entity_id: id.as_uuid(),
                changes: diff(None, &hypothesis)?,
                evidence_refs,
            };
            let event_id = self.commit(subject, beliefs, mutation, provenance)?;
            Ok(Recorded { id, event_id })
        })
    }

    /// Attaches evidence to a hypothesis and applies `effect`.
    ///
    /// `last_evidence_at` always becomes `evidence.observed_at`; confidence and
    /// status follow [`Hypothesis::evidence_outcome`].
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank reasoning, evidence about another
    /// subject, an unknown or resolved hypothesis, or evidence already
    /// attached to it.
    pub fn add_evidence(
        &self,
        subject: &SubjectId,
        hypothesis_id: HypothesisId,
        evidence: Evidence,
        effect: EvidenceEffect,
        provenance: &Provenance,
    ) -> EngineResult<EventId> {
        self.attach_evidence(subject, hypothesis_id, evidence, effect, provenance, |_| Ok(()))
    }

    /// [`BeliefStore::add_evidence`] with a hook that runs under the subject
    /// lock once every check has passed and before the event is recorded.
    /// A hook error aborts the attach.
    pub(crate) fn attach_evidence(
        &self,
        subject: &SubjectId,
        hypothesis_id: HypothesisId,
        evidence: Evidence,
        effect: EvidenceEffect,
        provenance: &Provenance,
        accepted: impl FnOnce(&Evidence) -> EngineResult<()>,
    ) -> EngineResult<EventId> {
        provenance.validate()?;
        if evidence.subject_id != *subject {
            return Err(ValidationError::SubjectMismatch {
                expected: subject.clone(),
                found: evidence.subject_id,
            }
            .into());
        }

        self.with_subject(subject, |beliefs| {
            let current = beliefs.hypothesis(subject, hypothesis_id)?;
            if !current.is_live() {
                return Err(ValidationError::HypothesisResolved {
                    id: hypothesis_id.to_string(),
                }
                .into());
            }
            if current.evidence.iter().any(|e| e.id == evidence.id) {
                return Err(ValidationError::DuplicateId {
                    entity: "evidence",
                    id: evidence.id.to_string(),
                }
                .into());
            }
            accepted(&evidence)?;

            let outcome = current.evidence_outcome(effect, &self.config);
            debug!(
                subject = %subject,
                hypothesis = %hypothesis_id,
                effect = ?effect,
                from = %current.confidence,
                to = %outcome.confidence,
                status = %outcome.status,
                "evidence outcome"
            );

            let mut updated = current.clone();
            updated.last_evidence_at = evidence.observed_at;
            updated.confidence = outcome.confidence;
            updated.status = outcome.status;
            let evidence_id = evidence.id;
            updated.evidence.push(evidence);

            let mutation = Mutation {
                event_type: EventType::EvidenceAttached,
                entity_id: hypothesis_id.as_uuid(),
                changes: diff(Some(current), &updated)?,
                evidence_refs: vec![evidence_id],
            };
            self.commit(subject, beliefs, mutation, provenance)
        })
    }

    /// Resolves a hypothesis.
    ///
    /// When `evolved_into` is given and the provenance names no parent, the
    /// recorded event is triggered by the successor's creation event.
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank reasoning, an unknown or already
    /// resolved hypothesis, a successor given with a kind other than
    /// `evolved`, a successor that does not exist, is the hypothesis itself,
    /// or would close a lineage cycle.
    pub fn resolve(
        &self,
        subject: &SubjectId,
        hypothesis_id: HypothesisId,
        kind: ResolutionKind,
        note: Option<String>,
        evolved_into: Option<HypothesisId>,
        provenance: &Provenance,
    ) -> EngineResult<EventId> {
        provenance.validate()?;

        self.with_subject(subject, |beliefs| {
            let current = beliefs.hypothesis(subject, hypothesis_id)?;
            if !current.is_live() {
                return Err(ValidationError::HypothesisResolved {
                    id: hypothesis_id.to_string(),
                }
                .into());
            }

            let mut provenance = provenance.clone();
            if let Some(successor) = evolved_into {
                if kind != ResolutionKind::Evolved {
                    return Err(ValidationError::SuccessorRequiresEvolved {
                        kind: kind.to_string(),
                    }
                    .into());
                }
                if successor == hypothesis_id {
                    return Err(ValidationError::SelfReference {
                        id: hypothesis_id.to_string(),
                    }
                    .into());
                }
                beliefs.require_hypotheses("evolved_into", [&successor])?;
                if lineage_of(&beliefs.understanding, successor).contains(&hypothesis_id) {
                    return Err(ValidationError::LineageCycle {
                        id: hypothesis_id.to_string(),
                        successor: successor.to_string(),
                    }
                    .into());
                }
                if provenance.triggered_by.is_none() {
                    provenance.triggered_by = beliefs.origins.get(&successor.as_uuid()).copied();
                }
            }

            let mut updated = current.clone();
            updated.status = HypothesisStatus::Resolved;
            updated.resolution_kind = Some(kind);
            updated.resolution_note = note;
            updated.evolved_into = evolved_into;

            let mutation = Mutation {
                event_type: EventType::HypothesisResolved,
                entity_id: hypothesis_id.as_uuid(),
                changes: diff(Some(current), &updated)?,
                evidence_refs: Vec::new(),
            };
            self.commit(subject, beliefs, mutation, &provenance)
        })
    }

    /// Records a new pattern.
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank reasoning or theme, an
    /// out-of-range confidence, or a related hypothesis that does not exist.
    pub fn add_pattern(
        &self,
        subject: &SubjectId,
        draft: PatternDraft,
        provenance: &Provenance,
    ) -> EngineResult<Recorded<PatternId>> {
        provenance.validate()?;
        blank("theme", &draft.theme)?;
        let confidence = Confidence::new(draft.confidence)?;

        self.with_subject(subject, |beliefs| {
            beliefs.require_hypotheses("related_hypotheses", &draft.related_hypotheses)?;
            let pattern = Pattern {
                id: PatternId::new(),
                theme: draft.theme,
                description: draft.description,
                related_hypotheses: draft.related_hypotheses,
                confidence,
                detected_at: Utc::now(),
                detection_source: draft.detection_source,
            };
            let id = pattern.id;
            let mutation = Mutation {
                event_type: EventType::PatternDetected,
                entity_id: id.as_uuid(),
                changes: diff(None, &pattern)?,
                evidence_refs: Vec::new(),
            };
            let event_id = self.commit(subject, beliefs, mutation, provenance)?;
            Ok(Recorded { id, event_id })
        })
    }

    /// Queues a new insight.
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank reasoning or content, or a related
    /// hypothesis that does not exist.
    pub fn add_insight(
        &self,
        subject: &SubjectId,
        draft: InsightDraft,
        provenance: &Provenance,
    ) -> EngineResult<Recorded<InsightId>> {
        provenance.validate()?;
        blank("content", &draft.content)?;

        self.with_subject(subject, |beliefs| {
            beliefs.require_hypotheses("related_hypotheses", &draft.related_hypotheses)?;
            let insight = PendingInsight {
                id: InsightId::new(),
                content: draft.content,
                importance: draft.importance,
                disclosure_policy: draft.disclosure_policy,
                related_hypotheses: draft.related_hypotheses,
                created_at: Utc::now(),
                disclosed: false,
            };
            let id = insight.id;
            let mutation = Mutation {
                event_type: EventType::InsightQueued,
                entity_id: id.as_uuid(),
                changes: diff(None, &insight)?,
                evidence_refs: Vec::new(),
            };
            let event_id = self.commit(subject, beliefs, mutation, provenance)?;
            Ok(Recorded { id, event_id })
        })
    }

    /// Flips an insight to disclosed.
    ///
    /// Returns `None` without recording anything if it already was.
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank reasoning or an unknown insight.
    pub fn mark_disclosed(
        &self,
        subject: &SubjectId,
        insight_id: InsightId,
        provenance: &Provenance,
    ) -> EngineResult<Option<EventId>> {
        provenance.validate()?;

        self.with_subject(subject, |beliefs| {
            let current =
                beliefs
                    .understanding
                    .insight(insight_id)
                    .ok_or_else(|| ValidationError::NotFound {
                        entity: "insight",
                        id: insight_id.to_string(),
                        subject: subject.clone(),
                    })?;
            if current.disclosed {
                return Ok(None);
            }
            let mut updated = current.clone();
            updated.disclosed = true;
            let mutation = Mutation {
                event_type: EventType::InsightDisclosed,
                entity_id: insight_id.as_uuid(),
                changes: diff(Some(current), &updated)?,
                evidence_refs: Vec::new(),
            };
            self.commit(subject, beliefs, mutation, provenance).map(Some)
        })
    }

    /// Runs `f` against the subject's current understanding.
    ///
    /// # Errors
    ///
    /// Returns an error if the partition lock is poisoned or hydration fails.
    pub fn read<R>(&self, subject: &SubjectId, f: impl FnOnce(&Understanding) -> R) -> EngineResult<R> {
        self.with_subject(subject, |beliefs| Ok(f(&beliefs.understanding)))
    }

    /// A snapshot of the subject's understanding.
    ///
    /// # Errors
    ///
    /// See [`BeliefStore::read`].
    pub fn understanding(&self, subject: &SubjectId) -> EngineResult<Understanding> {
        self.read(subject, Clone::clone)
    }

    /// A snapshot of one hypothesis.
    ///
    /// # Errors
    ///
    /// See [`BeliefStore::read`].
    pub fn hypothesis(&self, subject: &SubjectId, id: HypothesisId) -> EngineResult<Option<Hypothesis>> {
        self.read(subject, |u| u.hypothesis(id).cloned())
    }

    /// Hypotheses in `active` status.
    ///
    /// # Errors
    ///
    /// See [`BeliefStore::read`].
    pub fn active_hypotheses(&self, subject: &SubjectId) -> EngineResult<Vec<Hypothesis>> {
        self.read(subject, |u| u.active_hypotheses().cloned().collect())
    }

    /// Hypotheses tagged with `domain`.
    ///
    /// # Errors
    ///
    /// See [`BeliefStore::read`].
    pub fn hypotheses_for_domain(&self, subject: &SubjectId, domain: &str) -> EngineResult<Vec<Hypothesis>> {
        self.read(subject, |u| u.hypotheses_for_domain(domain).cloned().collect())
    }

    /// Evidence across `domain`'s hypotheses, merged chronologically.
    ///
    /// # Errors
    ///
    /// See [`BeliefStore::read`].
    pub fn journey_for_domain(&self, subject: &SubjectId, domain: &str) -> EngineResult<Journey> {
        self.read(subject, |u| u.journey_for_domain(domain))
    }

    /// Insights not yet disclosed.
    ///
    /// # Errors
    ///
    /// See [`BeliefStore::read`].
    pub fn undisclosed_insights(&self, subject: &SubjectId) -> EngineResult<Vec<PendingInsight>> {
        self.read(subject, |u| u.undisclosed_insights().cloned().collect())
    }

    /// Forming or active hypotheses with no evidence for longer than
    /// `stale_after_days`. Advisory: nothing transitions.
    ///
    /// # Errors
    ///
    /// See [`BeliefStore::read`].
    pub fn stale_hypotheses(&self, subject: &SubjectId, now: DateTime<Utc>) -> EngineResult<Vec<Hypothesis>> {
        let days = self.config.stale_after_days;
        self.read(subject, |u| {
            u.hypotheses()
                .iter()
                .filter(|h| h.is_stale(days, now))
                .cloned()
                .collect()
        })
    }

    /// `id` followed by each successor along `evolved_into`.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::NotFound` if `id` is unknown.
    pub fn lineage(&self, subject: &SubjectId, id: HypothesisId) -> EngineResult<Vec<HypothesisId>> {
        self.with_subject(subject, |beliefs| {
            beliefs.hypothesis(subject, id)?;
            Ok(lineage_of(&beliefs.understanding, id))
        })
    }

    /// The event that created an entity, if it belongs to `subject`.
    ///
    /// # Errors
    ///
    /// See [`BeliefStore::read`].
    pub fn origin_event(&self, subject: &SubjectId, entity_id: Uuid) -> EngineResult<Option<EventId>> {
        self.with_subject(subject, |beliefs| Ok(beliefs.origins.get(&entity_id).copied()))
    }

    /// Subjects with a hydrated partition.
    ///
    /// # Errors
    ///
    /// Returns an error if the partition map lock is poisoned.
    pub fn subjects(&self) -> EngineResult<Vec<SubjectId>> {
        let partitions = self
            .partitions
            .read()
            .map_err(|_| lock_err("beliefs.subjects"))?;
        let mut subjects: Vec<SubjectId> = partitions.keys().cloned().collect();
        subjects.sort();
        Ok(subjects)
    }

    /// Rebuilds the subject's understanding from the event log alone.
    ///
    /// # Errors
    ///
    /// Returns an integrity error if the log does not fold cleanly.
    pub fn replay(&self, subject: &SubjectId) -> EngineResult<Understanding> {
        let events = self.events.replay(subject)?;
        Ok(Understanding::replay(subject.clone(), &events)?)
    }
}

/// `start` followed by its successors. Stops at the first repeat.
fn lineage_of(understanding: &Understanding, start: HypothesisId) -> Vec<HypothesisId> {
    let mut chain = vec![start];
    let mut current = start;
    while let Some(next) = understanding.hypothesis(current).and_then(|h| h.evolved_into) {
        if chain.contains(&next) {
            break;
        }
        chain.push(next);
        current = next;
    }
    chain
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::storage::InMemoryEventLog;

    fn store() -> (BeliefStore, Arc<InMemoryEventLog>) {
        let log = Arc::new(InMemoryEventLog::new());
        let store = BeliefStore::new(BeliefConfig::default(), Arc::clone(&log) as Arc<dyn EventLog>);
        (store, log)
    }

    fn prov(reasoning: &str) -> Provenance {
        Provenance::new("session-1", reasoning)
    }

    fn evidence(subject: &str, content: &str) -> Evidence {
        Evidence::builder()
            .subject(subject)
            .observed_at(Utc::now())
            .content(content)
            .domain("sensory")
            .build()
            .unwrap()
    }

    #[test]
    fn form_records_creation_event() {
        let (store, log) = store();
        let subject = SubjectId::from("child");
        let formed = store
            .form_hypothesis(&subject, Hypothesis::draft("sensory seeking", "sensory"), &prov("spins a lot"))
            .unwrap();

        let events = log.replay(&subject).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, formed.event_id);
        assert_eq!(events[0].event_type, EventType::HypothesisFormed);
        assert_eq!(events[0].change("status").unwrap().to, serde_json::json!("forming"));
        assert_eq!(
            store.origin_event(&subject, formed.id.as_uuid()).unwrap(),
            Some(formed.event_id)
        );
    }

    #[test]
    fn blank_reasoning_changes_nothing() {
        let (store, log) = store();
        let subject = SubjectId::from("child");
        let formed = store
            .form_hypothesis(&subject, Hypothesis::draft("t", "sensory"), &prov("seen"))
            .unwrap();

        let err = store
            .add_evidence(&subject, formed.id, evidence("child", "spun"), EvidenceEffect::Supports, &prov("   "))
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(log.count(&subject).unwrap(), 1);
        assert!(store.hypothesis(&subject, formed.id).unwrap().unwrap().evidence.is_empty());
    }

    #[test]
    fn evidence_event_records_only_changed_fields() {
        let (store, log) = store();
        let subject = SubjectId::from("child");
        let formed = store
            .form_hypothesis(&subject, Hypothesis::draft("t", "sensory"), &prov("seen"))
            .unwrap();
        let e = evidence("child", "spun");
        let event_id = store
            .add_evidence(&subject, formed.id, e.clone(), EvidenceEffect::Neutral, &prov("noted"))
            .unwrap();

        let event = log.get(event_id).unwrap().unwrap();
        assert_eq!(event.evidence_refs, vec![e.id]);
        assert!(event.change("evidence").is_some());
        assert!(event.change("confidence").is_none());
        assert!(event.change("status").is_none());
    }

    #[test]
    fn foreign_evidence_is_rejected() {
        let (store, _) = store();
        let subject = SubjectId::from("child");
        let formed = store
            .form_hypothesis(&subject, Hypothesis::draft("t", "sensory"), &prov("seen"))
            .unwrap();
        let err = store
            .add_evidence(&subject, formed.id, evidence("sibling", "x"), EvidenceEffect::Supports, &prov("r"))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::SubjectMismatch { .. })
        ));
    }

    #[test]
    fn resolved_hypothesis_rejects_evidence_and_second_resolution() {
        let (store, _) = store();
        let subject = SubjectId::from("child");
        let formed = store
            .form_hypothesis(&subject, Hypothesis::draft("t", "sensory"), &prov("seen"))
            .unwrap();
        store
            .resolve(&subject, formed.id, ResolutionKind::Refuted, None, None, &prov("ruled out"))
            .unwrap();

        let err = store
            .add_evidence(&subject, formed.id, evidence("child", "x"), EvidenceEffect::Supports, &prov("r"))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::Validation(ValidationError::HypothesisResolved { .. })
        ));
        assert!(store
            .resolve(&subject, formed.id, ResolutionKind::Confirmed, None, None, &prov("again"))
            .is_err());
    }

    #[test]
    fn resolve_validates_successor() {
        let (store, _) = store();
        let subject = SubjectId::from("child");
        let h1 = store
            .form_hypothesis(&subject, Hypothesis::draft("h1", "sensory"), &prov("seen"))
            .unwrap();
        let h2 = store
            .form_hypothesis(&subject, Hypothesis::draft("h2", "sensory"), &prov("seen"))
            .unwrap();

        let dangling = store
            .resolve(&subject, h1.id, ResolutionKind::Evolved, None, Some(HypothesisId::new()), &prov("r"))
            .unwrap_err();
        assert!(matches!(
            dangling,
            EngineError::Validation(ValidationError::DanglingReference { .. })
        ));

        let wrong_kind = store
            .resolve(&subject, h1.id, ResolutionKind::Confirmed, None, Some(h2.id), &prov("r"))
            .unwrap_err();
        assert!(matches!(
            wrong_kind,
            EngineError::Validation(ValidationError::SuccessorRequiresEvolved { .. })
        ));

        let itself = store
            .resolve(&subject, h1.id, ResolutionKind::Evolved, None, Some(h1.id), &prov("r"))
            .unwrap_err();
        assert!(matches!(
            itself,
            EngineError::Validation(ValidationError::SelfReference { .. })
        ));
    }

    #[test]
    fn lineage_follows_successors_and_refuses_cycles() {
        let (store, _) = store();
        let subject = SubjectId::from("child");
        let h1 = store
            .form_hypothesis(&subject, Hypothesis::draft("h1", "motor"), &prov("seen"))
            .unwrap();
        let h2 = store
            .form_hypothesis(&subject, Hypothesis::draft("h2", "motor"), &prov("seen"))
            .unwrap();
        let h3 = store
            .form_hypothesis(&subject, Hypothesis::draft("h3", "motor"), &prov("seen"))
            .unwrap();
        store
            .resolve(&subject, h1.id, ResolutionKind::Evolved, None, Some(h2.id), &prov("r"))
            .unwrap();
        store
            .resolve(&subject, h2.id, ResolutionKind::Evolved, None, Some(h3.id), &prov("r"))
            .unwrap();

        assert_eq!(store.lineage(&subject, h1.id).unwrap(), vec![h1.id, h2.id, h3.id]);
        let cycle = store
            .resolve(&subject, h3.id, ResolutionKind::Evolved, None, Some(h1.id), &prov("r"))
            .unwrap_err();
        assert!(matches!(
            cycle,
            EngineError::Validation(ValidationError::LineageCycle { .. })
        ));
    }

    #[test]
    fn related_hypotheses_must_exist() {
        let (store, log) = store();
        let subject = SubjectId::from("child");
        let err = store
            .add_pattern(
                &subject,
                Pattern::draft("routine", "prefers sameness").related(HypothesisId::new()),
                &prov("synthesis"),
            )
            .unwrap_err();
        assert!(err.is_validation());
        let err = store
            .add_insight(
                &subject,
                PendingInsight::draft("share later").related(HypothesisId::new()),
                &prov("synthesis"),
            )
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(log.count(&subject).unwrap(), 0);
    }

    #[test]
    fn mark_disclosed_is_one_way() {
        let (store, log) = store();
        let subject = SubjectId::from("child");
        let insight = store
            .add_insight(&subject, PendingInsight::draft("likes music"), &prov("noticed"))
            .unwrap();
        assert_eq!(store.undisclosed_insights(&subject).unwrap().len(), 1);

        assert!(store.mark_disclosed(&subject, insight.id, &prov("shared")).unwrap().is_some());
        assert!(store.mark_disclosed(&subject, insight.id, &prov("shared")).unwrap().is_none());
        assert!(store.undisclosed_insights(&subject).unwrap().is_empty());
        assert_eq!(log.count(&subject).unwrap(), 2);
    }

    #[test]
    fn stale_sweep_is_advisory() {
        let (store, _) = store();
        let subject = SubjectId::from("child");
        let formed = store
            .form_hypothesis(&subject, Hypothesis::draft("t", "sensory"), &prov("seen"))
            .unwrap();
        let later = Utc::now() + Duration::days(15);
        let stale = store.stale_hypotheses(&subject, later).unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, formed.id);
        assert_eq!(
            store.hypothesis(&subject, formed.id).unwrap().unwrap().status,
            HypothesisStatus::Forming
        );
    }

    #[test]
    fn partitions_hydrate_from_existing_log() {
        let (store, log) = store();
        let subject = SubjectId::from("child");
        store
            .form_hypothesis(&subject, Hypothesis::draft("t", "sensory"), &prov("seen"))
            .unwrap();

        let fresh = BeliefStore::new(BeliefConfig::default(), log as Arc<dyn EventLog>);
        assert_eq!(
            fresh.understanding(&subject).unwrap(),
            store.understanding(&subject).unwrap()
        );
        assert_eq!(store.replay(&subject).unwrap(), store.understanding(&subject).unwrap());
    }
}
