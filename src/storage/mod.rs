//! Storage for evidence and events.
//!
//! The traits define the abstract interface; `memory` provides the in-process
//! backends and `jsonl` the audit export format.

pub mod jsonl;
mod memory;
mod traits;

pub use crate::error::StorageError;
pub use memory::{referenced_evidence, InMemoryEventLog, InMemoryEvidenceLedger};
pub use traits::{EventLog, EvidenceLedger, MAX_CASCADE_DEPTH};
