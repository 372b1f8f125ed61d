//! The lifecycle orchestrator.
//!
//! Each cycle builds a context for one subject, evaluates the catalog's
//! moments against it and dispatches the effects of those whose condition
//! holds. The `not_fired -> firing` claim is made under the subject's lock;
//! it is the only thing standing between concurrent cycles and duplicate
//! generation.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::belief::BeliefStore;
use crate::config::OrchestratorConfig;
use crate::error::{EngineError, EngineResult, GenerationError, StorageError, ValidationError};
use crate::id::{ArtifactId, MomentId, SubjectId};
use crate::prerequisite::{evaluate, Context};
use crate::storage::EvidenceLedger;
use crate::value::Value;

use super::artifact::{Artifact, ArtifactStatus};
use super::context_view::{self, BeliefSummary, LifecycleFacts};
use super::generation::{millis, GenerationPool, GenerationRequest, GenerationService};
use super::moment::{Effect, Moment, MomentCatalog};

/// Per-subject firing state of a moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FiringState {
    /// Eligible to fire.
    #[default]
    NotFired,
    /// Claimed by a cycle; its effect is in progress.
    Firing,
    /// Effect completed.
    Fired,
}

impl fmt::Display for FiringState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFired => write!(f, "not_fired"),
            Self::Firing => write!(f, "firing"),
            Self::Fired => write!(f, "fired"),
        }
    }
}

/// What one evaluation cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Moments this cycle claimed.
    pub fired: Vec<MomentId>,
    /// Claimed moments whose artifact job was queued.
    pub dispatched: Vec<MomentId>,
}

/// What started a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cause {
    /// New evidence, a belief change, external context or an explicit call.
    Trigger,
    /// A generation job finished. Only moments that have not fired yet are
    /// considered, so repeatable moments cannot feed on their own output.
    Completion,
}

#[derive(Debug, Default)]
struct SubjectLifecycle {
    moments: HashMap<MomentId, FiringState>,
    artifacts: BTreeMap<String, Artifact>,
    capabilities: BTreeSet<String>,
    /// Exposed affordance id -> affordances it reveals.
    affordances: BTreeMap<String, BTreeSet<String>>,
    external: Context,
}

impl SubjectLifecycle {
    fn state(&self, id: &MomentId) -> FiringState {
        self.moments.get(id).copied().unwrap_or_default()
    }

    fn facts(&self) -> LifecycleFacts<'_> {
        LifecycleFacts {
            artifacts: &self.artifacts,
            capabilities: &self.capabilities,
            affordances: &self.affordances,
            external: &self.external,
        }
    }

    /// Artifact moments wait while their artifact is generating or failed.
    fn blocked(&self, moment: &Moment) -> bool {
        match &moment.effect {
            Effect::ProduceArtifact { kind } => matches!(
                self.artifacts.get(kind).map(|a| a.status),
                Some(ArtifactStatus::Generating | ArtifactStatus::Error)
            ),
            _ => false,
        }
    }

    /// Whether `moment` may be claimed. A repeatable moment that already
    /// fired is eligible again on triggered cycles.
    fn eligible(&self, moment: &Moment, cause: Cause) -> bool {
        let state_allows = match self.state(&moment.id) {
            FiringState::NotFired => true,
            FiringState::Fired => !moment.fires_once && cause == Cause::Trigger,
            FiringState::Firing => false,
        };
        state_allows && !self.blocked(moment)
    }

    /// The check-and-set: `not_fired -> firing` (or `fired -> firing` for a
    /// repeatable moment).
    fn try_claim(&mut self, moment: &Moment, cause: Cause) -> bool {
        if !self.eligible(moment, cause) {
            return false;
        }
        self.moments.insert(moment.id.clone(), FiringState::Firing);
        true
    }
}

struct Inner {
    config: OrchestratorConfig,
    catalog: MomentCatalog,
    beliefs: Arc<BeliefStore>,
    ledger: Arc<dyn EvidenceLedger>,
    pool: GenerationPool,
    subjects: RwLock<HashMap<SubjectId, Arc<Mutex<SubjectLifecycle>>>>,
    in_flight: Mutex<usize>,
    idle: Condvar,
}

fn lock_err(context: &'static str) -> EngineError {
    StorageError::BackendError(format!("poisoned lock: {context}")).into()
}

fn lock(lifecycle: &Mutex<SubjectLifecycle>) -> EngineResult<MutexGuard<'_, SubjectLifecycle>> {
    lifecycle.lock().map_err(|_| lock_err("lifecycle.subject"))
}

impl Inner {
    fn lifecycle(&self, subject: &SubjectId) -> EngineResult<Arc<Mutex<SubjectLifecycle>>> {
        {
            let subjects = self.subjects.read().map_err(|_| lock_err("lifecycle.subjects"))?;
            if let Some(l) = subjects.get(subject) {
                return Ok(Arc::clone(l));
            }
        }
        let mut subjects = self.subjects.write().map_err(|_| lock_err("lifecycle.subjects"))?;
        Ok(Arc::clone(subjects.entry(subject.clone()).or_default()))
    }

    fn begin_job(&self) {
        if let Ok(mut n) = self.in_flight.lock() {
            *n += 1;
        }
    }

    fn end_job(&self) {
        if let Ok(mut n) = self.in_flight.lock() {
            *n = n.saturating_sub(1);
            if *n == 0 {
                self.idle.notify_all();
            }
        }
    }
}

fn run_cycle(inner: &Arc<Inner>, subject: &SubjectId, cause: Cause) -> EngineResult<CycleReport> {
    let beliefs = inner.beliefs.read(subject, BeliefSummary::of)?;
    let evidence_total = inner.ledger.count(subject)?;
    let lifecycle = inner.lifecycle(subject)?;

    let (ctx, candidates) = {
        let state = lock(&lifecycle)?;
        let ctx = context_view::build(subject, &beliefs, evidence_total, &state.facts());
        let candidates: Vec<&Moment> = inner
            .catalog
            .iter()
            .filter(|m| state.eligible(m, cause))
            .collect();
        (ctx, candidates)
    };

    // Evaluation is pure and runs unlocked.
    let verdicts: Vec<(&Moment, bool)> = candidates
        .into_iter()
        .map(|m| (m, evaluate(&m.condition, &ctx)))
        .collect();

    let mut report = CycleReport::default();
    if verdicts.is_empty() {
        return Ok(report);
    }

    let mut guard = lock(&lifecycle)?;
    let state = &mut *guard;
    for (moment, holds) in verdicts {
        if !holds {
            continue;
        }
        if !state.try_claim(moment, cause) {
            debug!(subject = %subject, moment = %moment.id, "moment already claimed");
            continue;
        }
        report.fired.push(moment.id.clone());

        match &moment.effect {
            Effect::ProduceArtifact { kind } => {
                if dispatch(inner, subject, state, moment, kind, &ctx) {
                    report.dispatched.push(moment.id.clone());
                }
            }
            Effect::UnlockCapability { name } => {
                state.capabilities.insert(name.clone());
                state.moments.insert(moment.id.clone(), FiringState::Fired);
                info!(subject = %subject, moment = %moment.id, capability = %name, "capability unlocked");
            }
            Effect::ExposeAffordance { id, reveals } => {
                state.affordances.insert(id.clone(), reveals.clone());
                state.moments.insert(moment.id.clone(), FiringState::Fired);
                info!(subject = %subject, moment = %moment.id, affordance = %id, "affordance exposed");
            }
        }
    }

    debug!(
        subject = %subject,
        fired = report.fired.len(),
        dispatched = report.dispatched.len(),
        "evaluation cycle complete"
    );
    Ok(report)
}

/// Starts generation for a claimed artifact moment. Returns whether a job
/// was queued; on failure the moment is released again.
fn dispatch(
    inner: &Arc<Inner>,
    subject: &SubjectId,
    state: &mut SubjectLifecycle,
    moment: &Moment,
    kind: &str,
    ctx: &Context,
) -> bool {
    let artifact = state
        .artifacts
        .entry(kind.to_string())
        .or_insert_with(|| Artifact::pending(kind));
    if artifact.status != ArtifactStatus::Pending {
        *artifact = Artifact::pending(kind);
    }
    if let Err(err) = artifact.start_generation() {
        warn!(subject = %subject, moment = %moment.id, error = %err, "artifact could not start generating");
        state.moments.insert(moment.id.clone(), FiringState::NotFired);
        return false;
    }
    let artifact_id = artifact.id;

    let request = GenerationRequest {
        subject_id: subject.clone(),
        moment_id: moment.id.clone(),
        artifact_id,
        kind: kind.to_string(),
        context: ctx.clone(),
    };

    let weak = Arc::downgrade(inner);
    let job_subject = subject.clone();
    let job_moment = moment.id.clone();
    let job_kind = kind.to_string();
    inner.begin_job();
    let submitted = inner.pool.try_submit(
        request,
        Box::new(move |result, elapsed| {
            if let Some(inner) = weak.upgrade() {
                complete(&inner, &job_subject, &job_moment, &job_kind, artifact_id, result, elapsed);
                inner.end_job();
            }
        }),
    );

    match submitted {
        Ok(()) => {
            info!(subject = %subject, moment = %moment.id, kind, artifact_id = %artifact_id, "artifact generation dispatched");
            true
        }
        Err(err) => {
            inner.end_job();
            if let Some(artifact) = state.artifacts.get_mut(kind) {
                if let Err(revert) = artifact.abandon_generation() {
                    warn!(subject = %subject, kind, error = %revert, "could not revert artifact");
                }
            }
            state.moments.insert(moment.id.clone(), FiringState::NotFired);
            warn!(subject = %subject, moment = %moment.id, kind, error = %err, "generation not dispatched");
            false
        }
    }
}

fn record_outcome(
    inner: &Inner,
    subject: &SubjectId,
    moment_id: &MomentId,
    kind: &str,
    artifact_id: ArtifactId,
    result: Result<String, GenerationError>,
    duration_ms: u64,
) -> EngineResult<()> {
    let lifecycle = inner.lifecycle(subject)?;
    let mut guard = lock(&lifecycle)?;
    let state = &mut *guard;
    let Some(artifact) = state
        .artifacts
        .get_mut(kind)
        .filter(|a| a.id == artifact_id)
    else {
        return Err(EngineError::internal(format!(
            "artifact {artifact_id} ({kind}) was replaced while generating"
        )));
    };

    match result {
        Ok(content) => {
            artifact.complete(content, duration_ms)?;
            state.moments.insert(moment_id.clone(), FiringState::Fired);
            info!(subject = %subject, moment = %moment_id, kind, duration_ms, "artifact ready");
        }
        Err(err) => {
            artifact.fail(err.to_string(), duration_ms)?;
            state.moments.insert(moment_id.clone(), FiringState::NotFired);
            warn!(subject = %subject, moment = %moment_id, kind, error = %err, "artifact generation failed");
        }
    }
    Ok(())
}

fn complete(
    inner: &Arc<Inner>,
    subject: &SubjectId,
    moment_id: &MomentId,
    kind: &str,
    artifact_id: ArtifactId,
    result: Result<String, GenerationError>,
    elapsed: Duration,
) {
    let duration_ms = millis(elapsed);
    if let Err(err) = record_outcome(inner, subject, moment_id, kind, artifact_id, result, duration_ms) {
        warn!(subject = %subject, moment = %moment_id, error = %err, "generation outcome dropped");
        return;
    }
    if inner.config.reevaluate_on_completion {
        if let Err(err) = run_cycle(inner, subject, Cause::Completion) {
            warn!(subject = %subject, error = %err, "follow-up cycle failed");
        }
    }
}

/// Drives moments for every subject.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.inner.config)
            .field("moments", &self.inner.catalog.len())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Starts an orchestrator and its generation workers.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Internal` if a worker thread cannot be spawned.
    pub fn new(
        config: OrchestratorConfig,
        catalog: MomentCatalog,
        beliefs: Arc<BeliefStore>,
        ledger: Arc<dyn EvidenceLedger>,
        generator: Arc<dyn GenerationService>,
    ) -> EngineResult<Self> {
        let pool = GenerationPool::start(config.generation_workers, config.queue_capacity, generator)?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                catalog,
                beliefs,
                ledger,
                pool,
                subjects: RwLock::new(HashMap::new()),
                in_flight: Mutex::new(0),
                idle: Condvar::new(),
            }),
        })
    }

    /// The moments this orchestrator runs.
    #[must_use]
    pub fn catalog(&self) -> &MomentCatalog {
        &self.inner.catalog
    }

    /// Runs one evaluation cycle for `subject`. Returns without waiting for
    /// any generation it dispatches.
    ///
    /// # Errors
    ///
    /// Returns an error only if shared state cannot be read (poisoned lock,
    /// storage failure). Malformed conditions and generation failures are
    /// logged, not returned.
    pub fn evaluate(&self, subject: &SubjectId) -> EngineResult<CycleReport> {
        run_cycle(&self.inner, subject, Cause::Trigger)
    }

    /// Stores an externally supplied context field and runs a cycle.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::EmptyField` for a malformed path, or any
    /// error from [`Orchestrator::evaluate`].
    pub fn set_external(
        &self,
        subject: &SubjectId,
        path: &str,
        value: impl Into<Value>,
    ) -> EngineResult<CycleReport> {
        {
            let lifecycle = self.inner.lifecycle(subject)?;
            let mut state = lock(&lifecycle)?;
            state
                .external
                .set(path, value)
                .map_err(|_| ValidationError::EmptyField {
                    field: format!("path '{path}'"),
                })?;
        }
        debug!(subject = %subject, path, "external context updated");
        self.evaluate(subject)
    }

    /// Moves a failed artifact back to `pending` so its moment may fire
    /// again on a later cycle.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::NotFound` if there is no artifact of `kind`
    /// and `ValidationError::InvalidTransition` if it is not in error.
    pub fn reset_artifact(&self, subject: &SubjectId, kind: &str) -> EngineResult<()> {
        let lifecycle = self.inner.lifecycle(subject)?;
        let mut state = lock(&lifecycle)?;
        let artifact = state
            .artifacts
            .get_mut(kind)
            .ok_or_else(|| ValidationError::NotFound {
                entity: "artifact",
                id: kind.to_string(),
                subject: subject.clone(),
            })?;
        artifact.reset()?;
        info!(subject = %subject, kind, "artifact reset");
        Ok(())
    }

    /// Exposed affordances plus everything they reveal.
    ///
    /// # Errors
    ///
    /// Returns an error if the subject's lock is poisoned.
    pub fn available_affordances(&self, subject: &SubjectId) -> EngineResult<BTreeSet<String>> {
        let lifecycle = self.inner.lifecycle(subject)?;
        let state = lock(&lifecycle)?;
        Ok(state
            .affordances
            .iter()
            .flat_map(|(id, reveals)| std::iter::once(id).chain(reveals))
            .cloned()
            .collect())
    }

    /// Status of the subject's artifact of `kind`, if one exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the subject's lock is poisoned.
    pub fn artifact_status(&self, subject: &SubjectId, kind: &str) -> EngineResult<Option<ArtifactStatus>> {
        Ok(self.artifact(subject, kind)?.map(|a| a.status))
    }

    /// A snapshot of the subject's artifact of `kind`.
    ///
    /// # Errors
    ///
    /// Returns an error if the subject's lock is poisoned.
    pub fn artifact(&self, subject: &SubjectId, kind: &str) -> EngineResult<Option<Artifact>> {
        let lifecycle = self.inner.lifecycle(subject)?;
        let state = lock(&lifecycle)?;
        Ok(state.artifacts.get(kind).cloned())
    }

    /// Capabilities unlocked for the subject.
    ///
    /// # Errors
    ///
    /// Returns an error if the subject's lock is poisoned.
    pub fn capabilities(&self, subject: &SubjectId) -> EngineResult<BTreeSet<String>> {
        let lifecycle = self.inner.lifecycle(subject)?;
        let state = lock(&lifecycle)?;
        Ok(state.capabilities.clone())
    }

    /// Firing state of one moment for the subject.
    ///
    /// # Errors
    ///
    /// Returns an error if the subject's lock is poisoned.
    pub fn moment_state(&self, subject: &SubjectId, moment: &MomentId) -> EngineResult<FiringState> {
        let lifecycle = self.inner.lifecycle(subject)?;
        let state = lock(&lifecycle)?;
        Ok(state.state(moment))
    }

    /// The context a cycle would evaluate against right now.
    ///
    /// # Errors
    ///
    /// Returns an error if shared state cannot be read.
    pub fn context(&self, subject: &SubjectId) -> EngineResult<Context> {
        let beliefs = self.inner.beliefs.read(subject, BeliefSummary::of)?;
        let evidence_total = self.inner.ledger.count(subject)?;
        let lifecycle = self.inner.lifecycle(subject)?;
        let state = lock(&lifecycle)?;
        Ok(context_view::build(subject, &beliefs, evidence_total, &state.facts()))
    }

    /// Generation jobs queued or running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.lock().map_or(0, |n| *n)
    }

    /// Blocks until no generation is in flight, or `timeout` passes.
    /// Returns true when idle.
    #[must_use]
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let Ok(guard) = self.inner.in_flight.lock() else {
            return false;
        };
        match self.inner.idle.wait_timeout_while(guard, timeout, |n| *n > 0) {
            Ok((n, _)) => *n == 0,
            Err(_) => false,
        }
    }
}
