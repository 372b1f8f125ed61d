//! The per-subject aggregate and its event projection.
//!
//! `Understanding` changes only by applying events. The live store and
//! replay share [`Understanding::apply`], so folding a subject's log from an
//! empty aggregate reproduces the live state.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IntegrityError;
use crate::event::{EntityType, Event};
use crate::id::{HypothesisId, InsightId, PatternId, SubjectId};

use super::hypothesis::{Hypothesis, HypothesisStatus};
use super::insight::PendingInsight;
use super::journey::Journey;
use super::pattern::Pattern;

/// Belief state for one subject: hypotheses, patterns and pending insights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Understanding {
    subject_id: SubjectId,
    hypotheses: Vec<Hypothesis>,
    patterns: Vec<Pattern>,
    insights: Vec<PendingInsight>,
}

/// An entity as it looks after an event.
#[derive(Debug, Clone)]
pub(crate) enum Projected {
    Hypothesis(Hypothesis),
    Pattern(Pattern),
    Insight(PendingInsight),
}

trait Projectable: Serialize + DeserializeOwned {
    fn entity_uuid(&self) -> Uuid;
}

impl Projectable for Hypothesis {
    fn entity_uuid(&self) -> Uuid {
        self.id.as_uuid()
    }
}

impl Projectable for Pattern {
    fn entity_uuid(&self) -> Uuid {
        self.id.as_uuid()
    }
}

impl Projectable for PendingInsight {
    fn entity_uuid(&self) -> Uuid {
        self.id.as_uuid()
    }
}

impl Understanding {
    /// An empty understanding.
    #[must_use]
    pub fn new(subject_id: SubjectId) -> Self {
        Self {
            subject_id,
            hypotheses: Vec::new(),
            patterns: Vec::new(),
            insights: Vec::new(),
        }
    }

    /// Rebuilds an understanding by folding `events` in order.
    ///
    /// # Errors
    ///
    /// Returns `IntegrityError::CorruptEvent` if an event does not apply
    /// cleanly to the state built so far.
    pub fn replay<'a>(
        subject_id: SubjectId,
        events: impl IntoIterator<Item = &'a Event>,
    ) -> Result<Self, IntegrityError> {
        let mut understanding = Self::new(subject_id);
        for event in events {
            understanding.apply(event)?;
        }
        Ok(understanding)
    }

    /// Applies one event.
    ///
    /// # Errors
    ///
    /// Returns `IntegrityError::CorruptEvent` if the event belongs to another
    /// subject, targets a missing (or, for creations, existing) entity, or
    /// its `from` values disagree with the current state.
    pub fn apply(&mut self, event: &Event) -> Result<(), IntegrityError> {
        let projected = self.project(event)?;
        self.install(projected);
        Ok(())
    }

    /// The subject this understanding is about.
    #[must_use]
    pub const fn subject_id(&self) -> &SubjectId {
        &self.subject_id
    }

    /// All hypotheses, in formation order.
    #[must_use]
    pub fn hypotheses(&self) -> &[Hypothesis] {
        &self.hypotheses
    }

    /// All patterns, in detection order.
    #[must_use]
    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    /// All insights, in creation order.
    #[must_use]
    pub fn insights(&self) -> &[PendingInsight] {
        &self.insights
    }

    /// Looks up a hypothesis.
    #[must_use]
    pub fn hypothesis(&self, id: HypothesisId) -> Option<&Hypothesis> {
        self.hypotheses.iter().find(|h| h.id == id)
    }

    /// Looks up a pattern.
    #[must_use]
    pub fn pattern(&self, id: PatternId) -> Option<&Pattern> {
        self.patterns.iter().find(|p| p.id == id)
    }

    /// Looks up an insight.
    #[must_use]
    pub fn insight(&self, id: InsightId) -> Option<&PendingInsight> {
        self.insights.iter().find(|i| i.id == id)
    }

    /// Hypotheses currently in `active` status.
    pub fn active_hypotheses(&self) -> impl Iterator<Item = &Hypothesis> {
        self.hypotheses
            .iter()
            .filter(|h| h.status == HypothesisStatus::Active)
    }

    /// Hypotheses tagged with `domain`, any status.
    pub fn hypotheses_for_domain<'a>(
        &'a self,
        domain: &'a str,
    ) -> impl Iterator<Item = &'a Hypothesis> + 'a {
        self.hypotheses.iter().filter(move |h| h.domain == domain)
    }

    /// Evidence across `domain`'s hypotheses, merged chronologically.
    #[must_use]
    pub fn journey_for_domain(&self, domain: &str) -> Journey {
        Journey::new(
            self.hypotheses_for_domain(domain)
                .map(|h| h.evidence.clone())
                .collect(),
        )
    }

    /// Insights not yet disclosed.
    pub fn undisclosed_insights(&self) -> impl Iterator<Item = &PendingInsight> {
        self.insights.iter().filter(|i| !i.disclosed)
    }

    /// True when `id` names an entity of `entity_type` in this aggregate.
    #[must_use]
    pub fn contains(&self, entity_type: EntityType, id: Uuid) -> bool {
        match entity_type {
            EntityType::Hypothesis => self.hypotheses.iter().any(|h| h.id.as_uuid() == id),
            EntityType::Pattern => self.patterns.iter().any(|p| p.id.as_uuid() == id),
            EntityType::Insight => self.insights.iter().any(|i| i.id.as_uuid() == id),
        }
    }

    /// Computes the entity an event would produce without installing it.
    pub(crate) fn project(&self, event: &Event) -> Result<Projected, IntegrityError> {
        if event.subject_id != self.subject_id {
            return Err(corrupt(event, format!("belongs to subject {}", event.subject_id)));
        }
        if event.entity_type != event.event_type.entity_type() {
            return Err(corrupt(
                event,
                format!("{} cannot target a {}", event.event_type, event.entity_type),
            ));
        }

        let id = event.entity_id;
        Ok(match event.entity_type {
            EntityType::Hypothesis => Projected::Hypothesis(project_entity(
                self.hypotheses.iter().find(|h| h.id.as_uuid() == id),
                event,
            )?),
            EntityType::Pattern => Projected::Pattern(project_entity(
                self.patterns.iter().find(|p| p.id.as_uuid() == id),
                event,
            )?),
            EntityType::Insight => Projected::Insight(project_entity(
                self.insights.iter().find(|i| i.id.as_uuid() == id),
                event,
            )?),
        })
    }

    pub(crate) fn install(&mut self, projected: Projected) {
        match projected {
            Projected::Hypothesis(h) => upsert(&mut self.hypotheses, h),
            Projected::Pattern(p) => upsert(&mut self.patterns, p),
            Projected::Insight(i) => upsert(&mut self.insights, i),
        }
    }
}

fn upsert<T: Projectable>(items: &mut Vec<T>, item: T) {
    let id = item.entity_uuid();
    match items.iter_mut().find(|existing| existing.entity_uuid() == id) {
        Some(slot) => *slot = item,
        None => items.push(item),
    }
}

fn project_entity<T: Projectable>(current: Option<&T>, event: &Event) -> Result<T, IntegrityError> {
    let mut fields = match (event.event_type.is_creation(), current) {
        (true, None) => serde_json::Map::new(),
        (true, Some(_)) => return Err(corrupt(event, "entity already exists".to_string())),
        (false, None) => return Err(corrupt(event, "entity does not exist".to_string())),
        (false, Some(entity)) => match serde_json::to_value(entity) {
            Ok(serde_json::Value::Object(map)) => map,
            Ok(_) => return Err(corrupt(event, "entity is not an object".to_string())),
            Err(e) => return Err(corrupt(event, e.to_string())),
        },
    };

    for (field, change) in &event.changes {
        let current_value = fields.get(field).unwrap_or(&serde_json::Value::Null);
        if *current_value != change.from {
            return Err(corrupt(
                event,
                format!("field '{field}' is {current_value}, event expected {}", change.from),
            ));
        }
        fields.insert(field.clone(), change.to.clone());
    }

    let entity: T = serde_json::from_value(serde_json::Value::Object(fields))
        .map_err(|e| corrupt(event, e.to_string()))?;
    if entity.entity_uuid() != event.entity_id {
        return Err(corrupt(event, "projected id does not match entity_id".to_string()));
    }
    Ok(entity)
}

fn corrupt(event: &Event, reason: String) -> IntegrityError {
    IntegrityError::CorruptEvent {
        event_id: event.id,
        reason,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::Utc;

    use super::*;
    use crate::confidence::Confidence;
    use crate::event::{EventType, FieldChange};
    use crate::id::{EventId, SessionId};
    use crate::belief::hypothesis::FormationSource;

    fn formed(subject: &SubjectId) -> (Hypothesis, Event) {
        let now = Utc::now();
        let h = Hypothesis {
            id: HypothesisId::new(),
            theory: "sensory seeking".to_string(),
            domain: "sensory".to_string(),
            formation_source: FormationSource::DirectObservation,
            evidence: Vec::new(),
            status: HypothesisStatus::Forming,
            confidence: Confidence::new(0.5).unwrap(),
            formed_at: now,
            last_evidence_at: now,
            resolution_kind: None,
            resolution_note: None,
            evolved_into: None,
        };
        let serde_json::Value::Object(fields) = serde_json::to_value(&h).unwrap() else {
            panic!("hypothesis serializes to an object");
        };
        let changes: BTreeMap<String, FieldChange> = fields
            .into_iter()
            .map(|(k, v)| (k, FieldChange::created(v)))
            .collect();
        let event = Event {
            id: EventId::new(),
            timestamp: now,
            session_id: SessionId::from("s1"),
            subject_id: subject.clone(),
            event_type: EventType::HypothesisFormed,
            entity_type: EntityType::Hypothesis,
            entity_id: h.id.as_uuid(),
            changes,
            reasoning: "parent described spinning".to_string(),
            evidence_refs: Vec::new(),
            triggered_by: None,
            recorded_at: now,
        };
        (h, event)
    }

    #[test]
    fn creation_event_projects_full_entity() {
        let subject = SubjectId::from("child");
        let (h, event) = formed(&subject);
        let understanding = Understanding::replay(subject, [&event]).unwrap();
        assert_eq!(understanding.hypothesis(h.id), Some(&h));
    }

    #[test]
    fn creation_twice_is_corrupt() {
        let subject = SubjectId::from("child");
        let (_, event) = formed(&subject);
        let err = Understanding::replay(subject, [&event, &event]).unwrap_err();
        assert!(matches!(err, IntegrityError::CorruptEvent { .. }));
    }

    #[test]
    fn stale_from_value_is_rejected() {
        let subject = SubjectId::from("child");
        let (h, created) = formed(&subject);
        let mut update = created.clone();
        update.id = EventId::new();
        update.event_type = EventType::HypothesisResolved;
        update.changes = BTreeMap::from([(
            "status".to_string(),
            FieldChange::new(serde_json::json!("active"), serde_json::json!("resolved")),
        )]);

        let mut understanding = Understanding::replay(subject, [&created]).unwrap();
        let err = understanding.apply(&update).unwrap_err();
        assert!(matches!(err, IntegrityError::CorruptEvent { .. }));
        assert_eq!(
            understanding.hypothesis(h.id).map(|h| h.status),
            Some(HypothesisStatus::Forming)
        );
    }

    #[test]
    fn foreign_subject_is_rejected() {
        let (_, event) = formed(&SubjectId::from("other"));
        let mut understanding = Understanding::new(SubjectId::from("child"));
        assert!(understanding.apply(&event).is_err());
    }
}
