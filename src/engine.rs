//! The engine facade.
//!
//! Wires the evidence ledger, the event log, the belief store and the
//! lifecycle orchestrator together. Every belief mutation made through the
//! facade is followed by an evaluation cycle for the same subject, so moments
//! react to the change before the call returns (generation itself runs in the
//! background).

use std::sync::Arc;

use tracing::{debug, warn};

use crate::belief::{
    BeliefStore, EvidenceEffect, HypothesisDraft, InsightDraft, PatternDraft, Recorded,
    ResolutionKind, Understanding,
};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, ValidationError};
use crate::event::Provenance;
use crate::evidence::Evidence;
use crate::id::{EventId, EvidenceId, HypothesisId, InsightId, PatternId, SubjectId};
use crate::lifecycle::{CycleReport, GenerationService, MomentCatalog, Orchestrator};
use crate::storage::{EventLog, EvidenceLedger, InMemoryEventLog, InMemoryEvidenceLedger};

/// Understanding engine over pluggable stores.
#[derive(Clone)]
pub struct Engine {
    config: EngineConfig,
    ledger: Arc<dyn EvidenceLedger>,
    events: Arc<dyn EventLog>,
    beliefs: Arc<BeliefStore>,
    orchestrator: Orchestrator,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates an engine backed by in-memory stores.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` for an unusable config, or
    /// an internal error if generation workers cannot be started.
    pub fn new(
        config: EngineConfig,
        catalog: MomentCatalog,
        generator: Arc<dyn GenerationService>,
    ) -> EngineResult<Self> {
        Self::with_stores(
            config,
            catalog,
            Arc::new(InMemoryEvidenceLedger::new()),
            Arc::new(InMemoryEventLog::new()),
            generator,
        )
    }

    /// Creates an engine over the given stores. Belief state for subjects
    /// already present in `events` is rebuilt on first access.
    ///
    /// # Errors
    ///
    /// See [`Engine::new`].
    pub fn with_stores(
        config: EngineConfig,
        catalog: MomentCatalog,
        ledger: Arc<dyn EvidenceLedger>,
        events: Arc<dyn EventLog>,
        generator: Arc<dyn GenerationService>,
    ) -> EngineResult<Self> {
        config.validate()?;
        let beliefs = Arc::new(BeliefStore::new(config.beliefs.clone(), Arc::clone(&events)));
        let orchestrator = Orchestrator::new(
            config.orchestrator.clone(),
            catalog,
            Arc::clone(&beliefs),
            Arc::clone(&ledger),
            generator,
        )?;
        Ok(Self {
            config,
            ledger,
            events,
            beliefs,
            orchestrator,
        })
    }

    /// The configuration the engine was built with.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The evidence ledger.
    #[must_use]
    pub fn ledger(&self) -> &Arc<dyn EvidenceLedger> {
        &self.ledger
    }

    /// The provenance event log.
    #[must_use]
    pub fn event_log(&self) -> &Arc<dyn EventLog> {
        &self.events
    }

    /// The belief store, for queries and mutations that should not trigger
    /// an evaluation cycle.
    #[must_use]
    pub fn beliefs(&self) -> &BeliefStore {
        &self.beliefs
    }

    /// The lifecycle orchestrator.
    #[must_use]
    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Runs an evaluation cycle, logging instead of returning failures.
    fn react(&self, subject: &SubjectId) {
        if let Err(err) = self.orchestrator.evaluate(subject) {
            warn!(subject = %subject, error = %err, "evaluation cycle failed");
        }
    }

    /// Runs an evaluation cycle for `subject`.
    ///
    /// # Errors
    ///
    /// See [`Orchestrator::evaluate`].
    pub fn evaluate(&self, subject: &SubjectId) -> EngineResult<CycleReport> {
        self.orchestrator.evaluate(subject)
    }

    /// Records evidence in the ledger without attaching it to a hypothesis,
    /// then evaluates the subject's moments.
    ///
    /// # Errors
    ///
    /// Returns a validation error for blank content or subject, or a
    /// storage error if the evidence id was already recorded.
    pub fn observe(&self, evidence: Evidence) -> EngineResult<EvidenceId> {
        let subject = evidence.subject_id.clone();
        let id = self.ledger.append(evidence)?;
        debug!(subject = %subject, evidence = %id, "evidence observed");
        self.react(&subject);
        Ok(id)
    }

    /// Forms a hypothesis, then evaluates.
    ///
    /// # Errors
    ///
    /// See [`BeliefStore::form_hypothesis`].
    pub fn form_hypothesis(
        &self,
        subject: &SubjectId,
        draft: HypothesisDraft,
        provenance: &Provenance,
    ) -> EngineResult<Recorded<HypothesisId>> {
        let recorded = self.beliefs.form_hypothesis(subject, draft, provenance)?;
        self.react(subject);
        Ok(recorded)
    }

    /// Attaches `evidence` to a hypothesis, records it in the ledger (unless
    /// already there) and evaluates. Evidence the belief store rejects is
    /// never written to the ledger.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::SubjectMismatch` for evidence about another
    /// subject, and anything [`BeliefStore::add_evidence`] rejects.
    pub fn apply_evidence(
        &self,
        subject: &SubjectId,
        hypothesis: HypothesisId,
        evidence: Evidence,
        effect: EvidenceEffect,
        provenance: &Provenance,
    ) -> EngineResult<EventId> {
        if evidence.subject_id != *subject {
            return Err(ValidationError::SubjectMismatch {
                expected: subject.clone(),
                found: evidence.subject_id,
            }
            .into());
        }
        let ledger = &self.ledger;
        let event_id = self.beliefs.attach_evidence(
            subject,
            hypothesis,
            evidence,
            effect,
            provenance,
            |accepted| {
                if ledger.get(accepted.id)?.is_none() {
                    ledger.append(accepted.clone())?;
                }
                Ok(())
            },
        )?;
        self.react(subject);
        Ok(event_id)
    }

    /// Resolves a hypothesis, then evaluates.
    ///
    /// # Errors
    ///
    /// See [`BeliefStore::resolve`].
    pub fn resolve(
        &self,
        subject: &SubjectId,
        hypothesis: HypothesisId,
        kind: ResolutionKind,
        note: Option<String>,
        evolved_into: Option<HypothesisId>,
        provenance: &Provenance,
    ) -> EngineResult<EventId> {
        let event_id = self
            .beliefs
            .resolve(subject, hypothesis, kind, note, evolved_into, provenance)?;
        self.react(subject);
        Ok(event_id)
    }

    /// Records a pattern, then evaluates.
    ///
    /// # Errors
    ///
    /// See [`BeliefStore::add_pattern`].
    pub fn add_pattern(
        &self,
        subject: &SubjectId,
        draft: PatternDraft,
        provenance: &Provenance,
    ) -> EngineResult<Recorded<PatternId>> {
        let recorded = self.beliefs.add_pattern(subject, draft, provenance)?;
        self.react(subject);
        Ok(recorded)
    }

    /// Queues an insight, then evaluates.
    ///
    /// # Errors
    ///
    /// See [`BeliefStore::add_insight`].
    pub fn add_insight(
        &self,
        subject: &SubjectId,
        draft: InsightDraft,
        provenance: &Provenance,
    ) -> EngineResult<Recorded<InsightId>> {
        let recorded = self.beliefs.add_insight(subject, draft, provenance)?;
        self.react(subject);
        Ok(recorded)
    }

    /// Marks an insight disclosed, then evaluates if anything changed.
    ///
    /// # Errors
    ///
    /// See [`BeliefStore::mark_disclosed`].
    pub fn mark_disclosed(
        &self,
        subject: &SubjectId,
        insight: InsightId,
        provenance: &Provenance,
    ) -> EngineResult<Option<EventId>> {
        let event_id = self.beliefs.mark_disclosed(subject, insight, provenance)?;
        if event_id.is_some() {
            self.react(subject);
        }
        Ok(event_id)
    }

    /// Rebuilds the subject's understanding from the event log alone.
    ///
    /// # Errors
    ///
    /// See [`BeliefStore::replay`].
    pub fn replay(&self, subject: &SubjectId) -> EngineResult<Understanding> {
        self.beliefs.replay(subject)
    }

    /// Checks that replaying the log reproduces the live understanding.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Internal` describing the divergence, or any
    /// error from reading either side.
    pub fn verify_replay(&self, subject: &SubjectId) -> EngineResult<()> {
        let live = self.beliefs.understanding(subject)?;
        let replayed = self.replay(subject)?;
        if live == replayed {
            Ok(())
        } else {
            Err(EngineError::internal(format!(
                "replayed understanding for {subject} diverges from live state"
            )))
        }
    }
}
