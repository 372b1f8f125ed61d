//! Error types for the understanding engine.
//!
//! Errors are strongly typed using thiserror, one enum per failure class:
//! validation (rejected before any mutation), integrity (event log refused a
//! write), generation (external service failure, recorded on the artifact),
//! and evaluation (malformed condition tree, never surfaced to callers).

use thiserror::Error;

use crate::id::{EventId, SubjectId};

/// Validation errors: malformed input rejected before any state change.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Required field '{field}' is missing")]
    MissingField { field: String },

    #[error("Field '{field}' cannot be empty")]
    EmptyField { field: String },

    #[error("Reasoning cannot be empty")]
    EmptyReasoning,

    #[error("Confidence value {value} is out of range [0.0, 1.0]")]
    ConfidenceOutOfRange { value: f32 },

    /// A reference to another entity does not resolve within the aggregate.
    #[error("Dangling reference in '{field}': {id} does not exist")]
    DanglingReference { field: String, id: String },

    #[error("Hypothesis {id} cannot evolve into itself")]
    SelfReference { id: String },

    #[error("Evolving {id} into {successor} would close a lineage cycle")]
    LineageCycle { id: String, successor: String },

    #[error("'evolved_into' is only allowed with resolution kind 'evolved', got '{kind}'")]
    SuccessorRequiresEvolved { kind: String },

    #[error("Hypothesis {id} is already resolved")]
    HypothesisResolved { id: String },

    #[error("Hypothesis {id} cannot start in status '{status}'")]
    InvalidInitialStatus { id: String, status: String },

    #[error("{entity} {id} not found for subject {subject}")]
    NotFound {
        entity: &'static str,
        id: String,
        subject: SubjectId,
    },

    #[error("Duplicate {entity} id: {id}")]
    DuplicateId { entity: &'static str, id: String },

    #[error("Invalid {entity} transition: {from} -> {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("Evidence belongs to subject {found}, expected {expected}")]
    SubjectMismatch {
        expected: SubjectId,
        found: SubjectId,
    },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

/// Integrity errors: the event log refused a write that would violate its
/// append-only or provenance rules.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IntegrityError {
    #[error("Event {event_id} has empty reasoning")]
    EmptyReasoning { event_id: EventId },

    #[error("Event {event_id} targets unknown {entity_type} {entity_id}")]
    UnknownEntity {
        event_id: EventId,
        entity_type: String,
        entity_id: String,
    },

    #[error("Event {event_id} re-creates existing {entity_type} {entity_id}")]
    DuplicateEntity {
        event_id: EventId,
        entity_type: String,
        entity_id: String,
    },

    #[error("Event {event_id} already recorded")]
    DuplicateEvent { event_id: EventId },

    #[error("Event {event_id} is triggered by {parent}, which is not an earlier event of the same subject")]
    UnknownParent { event_id: EventId, parent: EventId },

    #[error("Event {event_id} is older than the latest event of subject {subject}")]
    NonMonotonicTimestamp { event_id: EventId, subject: SubjectId },

    #[error("Event {event_id} cannot be projected: {reason}")]
    CorruptEvent { event_id: EventId, reason: String },
}

/// Failure reported by (or while calling) the external generation service.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenerationError {
    #[error("Generation service failed: {message}")]
    Service { message: String },

    #[error("Generation service panicked: {message}")]
    Panicked { message: String },

    #[error("Generation queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("Generation workers are unavailable")]
    Disconnected,
}

impl GenerationError {
    /// Creates a service failure with the given message.
    #[must_use]
    pub fn service(message: impl Into<String>) -> Self {
        Self::Service {
            message: message.into(),
        }
    }
}

/// Malformed condition trees. The evaluator logs these and fails closed.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("Unknown condition operator")]
    UnknownOperator,

    #[error("Condition path cannot be empty")]
    EmptyPath,

    #[error("Type mismatch at '{path}': expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Invalid pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend refused the write on integrity grounds.
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    /// The input was malformed; nothing was written.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Key already exists.
    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    /// Backend error (poisoned lock, I/O).
    #[error("Storage backend error: {0}")]
    BackendError(String),

    /// Serialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Top-level error type for the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed input; nothing was applied.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Event log refused the write; nothing was applied.
    #[error("Integrity error: {0}")]
    Integrity(#[from] IntegrityError),

    /// Generation service failure.
    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    /// Storage backend failure.
    #[error("Storage error: {0}")]
    Storage(StorageError),

    /// Unexpected internal state.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Integrity(e) => Self::Integrity(e),
            StorageError::Validation(e) => Self::Validation(e),
            other => Self::Storage(other),
        }
    }
}

impl EngineError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an integrity error.
    #[must_use]
    pub const fn is_integrity(&self) -> bool {
        matches!(self, Self::Integrity(_))
    }

    /// Returns true if retrying the same call may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Validation(_) | Self::Integrity(_) | Self::Internal { .. } => false,
            Self::Generation(e) => matches!(e, GenerationError::QueueFull { .. }),
            Self::Storage(e) => matches!(e, StorageError::BackendError(_)),
        }
    }
}

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_confidence() {
        let err = ValidationError::ConfidenceOutOfRange { value: 1.5 };
        let msg = format!("{err}");
        assert!(msg.contains("1.5"));
        assert!(msg.contains("out of range"));
    }

    #[test]
    fn test_dangling_reference_message() {
        let err = ValidationError::DanglingReference {
            field: "evolved_into".to_string(),
            id: "h-2".to_string(),
        };
        assert!(err.to_string().contains("evolved_into"));
        assert!(err.to_string().contains("h-2"));
    }

    #[test]
    fn test_storage_integrity_flattens_into_engine_error() {
        let event_id = EventId::new();
        let storage: StorageError = IntegrityError::EmptyReasoning { event_id }.into();
        let err: EngineError = storage.into();
        assert!(err.is_integrity());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_storage_backend_is_retryable() {
        let err: EngineError = StorageError::BackendError("poisoned".to_string()).into();
        assert!(matches!(err, EngineError::Storage(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_generation_queue_full_is_retryable() {
        let err: EngineError = GenerationError::QueueFull { capacity: 4 }.into();
        assert!(err.is_retryable());

        let err: EngineError = GenerationError::service("model offline").into();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("model offline"));
    }

    #[test]
    fn test_engine_error_internal() {
        let err = EngineError::internal("unexpected state");
        assert!(!err.is_validation());
        assert!(err.to_string().contains("unexpected state"));
    }
}
