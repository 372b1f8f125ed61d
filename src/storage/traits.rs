//! Abstract storage traits.
//!
//! These traits define the contract storage backends must implement. Both
//! are append-only: neither exposes an update or delete operation.

use crate::error::StorageError;
use crate::event::Event;
use crate::evidence::Evidence;
use crate::id::{EventId, EvidenceId, SubjectId};

/// Upper bound on cascade depth walked by [`EventLog::ancestry`].
pub const MAX_CASCADE_DEPTH: usize = 4096;

/// Immutable store of observations.
pub trait EvidenceLedger: Send + Sync {
    /// Appends evidence. Malformed evidence is rejected and nothing is written.
    fn append(&self, evidence: Evidence) -> Result<EvidenceId, StorageError>;

    /// Gets evidence by id.
    fn get(&self, id: EvidenceId) -> Result<Option<Evidence>, StorageError>;

    /// All evidence for a subject, optionally restricted to one domain,
    /// sorted by `observed_at` ascending.
    fn query(&self, subject: &SubjectId, domain: Option<&str>)
        -> Result<Vec<Evidence>, StorageError>;

    /// Number of evidence items recorded for a subject.
    fn count(&self, subject: &SubjectId) -> Result<usize, StorageError>;
}

/// Append-only, provenance-checked event log.
///
/// # Integrity rules
/// - `reasoning` must be non-blank
/// - creation events introduce a new entity id; other events target an
///   existing entity of the matching type
/// - `triggered_by` names an earlier event of the same subject
/// - timestamps are non-decreasing per subject
pub trait EventLog: Send + Sync {
    /// Validates and appends an event.
    fn record(&self, event: Event) -> Result<EventId, StorageError>;

    /// Gets an event by id.
    fn get(&self, id: EventId) -> Result<Option<Event>, StorageError>;

    /// All events for a subject in timestamp order.
    fn replay(&self, subject: &SubjectId) -> Result<Vec<Event>, StorageError>;

    /// Events whose `triggered_by` is `id`, in recording order.
    fn children(&self, id: EventId) -> Result<Vec<Event>, StorageError>;

    /// Number of events recorded for a subject.
    fn count(&self, subject: &SubjectId) -> Result<usize, StorageError>;

    /// The cascade chain from `id` up to its root (inclusive, child first).
    ///
    /// Returns an empty chain if `id` is unknown.
    fn ancestry(&self, id: EventId) -> Result<Vec<Event>, StorageError> {
        let mut chain = Vec::new();
        let mut next = Some(id);
        while let Some(current) = next {
            if chain.len() >= MAX_CASCADE_DEPTH {
                return Err(StorageError::BackendError(format!(
                    "cascade from {id} exceeds {MAX_CASCADE_DEPTH} events"
                )));
            }
            let Some(event) = self.get(current)? else {
                break;
            };
            next = event.triggered_by;
            chain.push(event);
        }
        Ok(chain)
    }
}
