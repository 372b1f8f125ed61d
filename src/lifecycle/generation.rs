//! The generation service seam and the bounded pool that calls it.
//!
//! Evaluation cycles never block on generation: jobs are handed to a fixed
//! set of named worker threads over a bounded channel with `try_send`, and
//! the result comes back through a completion callback.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, error};

use crate::error::{EngineError, GenerationError};
use crate::id::{ArtifactId, MomentId, SubjectId};
use crate::prerequisite::Context;

/// Everything the generation service is told about one job.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// Whose artifact this is.
    pub subject_id: SubjectId,
    /// The moment that fired.
    pub moment_id: MomentId,
    /// The artifact being generated.
    pub artifact_id: ArtifactId,
    /// Artifact kind, e.g. `summary`.
    pub kind: String,
    /// The context the triggering moment was evaluated against.
    pub context: Context,
}

/// External producer of artifact content, e.g. a model-backed generator.
///
/// Called from a worker thread; may block. A panic is caught and recorded as
/// [`GenerationError::Panicked`].
pub trait GenerationService: Send + Sync {
    /// Produces content for the request's artifact.
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

impl<F> GenerationService for F
where
    F: Fn(&GenerationRequest) -> Result<String, GenerationError> + Send + Sync,
{
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        self(request)
    }
}

/// Receives the outcome of a job and how long the service took.
pub(crate) type Completion = Box<dyn FnOnce(Result<String, GenerationError>, Duration) + Send>;

struct Job {
    request: GenerationRequest,
    on_complete: Completion,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
pub(crate) fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

fn run_job(service: &dyn GenerationService, job: Job) {
    let started = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(|| service.generate(&job.request)))
        .unwrap_or_else(|payload| {
            Err(GenerationError::Panicked {
                message: panic_message(payload.as_ref()),
            })
        });
    let elapsed = started.elapsed();
    debug!(
        subject = %job.request.subject_id,
        kind = %job.request.kind,
        ok = result.is_ok(),
        elapsed_ms = millis(elapsed),
        "generation finished"
    );

    let on_complete = job.on_complete;
    if panic::catch_unwind(AssertUnwindSafe(move || on_complete(result, elapsed))).is_err() {
        error!(kind = %job.request.kind, "generation completion handler panicked");
    }
}

/// Fixed-size pool of generation workers.
pub(crate) struct GenerationPool {
    tx: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
    queue_capacity: usize,
}

impl GenerationPool {
    pub(crate) fn start(
        workers: usize,
        queue_capacity: usize,
        service: Arc<dyn GenerationService>,
    ) -> Result<Self, EngineError> {
        let workers = workers.max(1);
        let queue_capacity = queue_capacity.max(1);
        let (tx, rx) = bounded::<Job>(queue_capacity);

        let mut handles = Vec::with_capacity(workers);
        for idx in 0..workers {
            let rx: Receiver<Job> = rx.clone();
            let service = Arc::clone(&service);
            let handle = thread::Builder::new()
                .name(format!("understanding-gen-{idx}"))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        run_job(service.as_ref(), job);
                    }
                })
                .map_err(|e| EngineError::internal(format!("failed to spawn generation worker: {e}")))?;
            handles.push(handle);
        }

        Ok(Self {
            tx: Some(tx),
            workers: handles,
            queue_capacity,
        })
    }

    /// Queues a job without blocking.
    pub(crate) fn try_submit(
        &self,
        request: GenerationRequest,
        on_complete: Completion,
    ) -> Result<(), GenerationError> {
        let Some(tx) = &self.tx else {
            return Err(GenerationError::Disconnected);
        };
        match tx.try_send(Job {
            request,
            on_complete,
        }) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(GenerationError::QueueFull {
                capacity: self.queue_capacity,
            }),
            Err(TrySendError::Disconnected(_)) => Err(GenerationError::Disconnected),
        }
    }
}

impl Drop for GenerationPool {
    fn drop(&mut self) {
        // Close the channel: workers drain queued jobs then exit.
        drop(self.tx.take());
        let current = thread::current().id();
        for handle in self.workers.drain(..) {
            // The last owner can be dropped from inside a completion handler.
            if handle.thread().id() != current {
                let _ = handle.join();
            }
        }
    }
}
