//! # Understanding
//!
//! An engine that keeps an evolving, confidence-weighted understanding of a
//! subject built from discrete pieces of evidence, records every change to it
//! as a provenance-carrying event, and unlocks derived work once declared
//! prerequisites over that understanding become true.
//!
//! ## Core Concepts
//!
//! - **Evidence**: an immutable observation about a subject
//! - **Hypothesis**: a theory whose confidence and status move with evidence
//! - **Event**: the immutable record of one belief mutation, replayable
//! - **Moment**: a condition over the subject's context mapped to an effect
//!   (generate an artifact, unlock a capability, expose an affordance)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use understanding::{
//!     Condition, Effect, Engine, EngineConfig, EvidenceEffect, Hypothesis, Moment,
//!     MomentCatalog, Provenance, SubjectId,
//! };
//!
//! let catalog = MomentCatalog::new(vec![Moment::new(
//!     "language_summary",
//!     Condition::greater_than("understanding.domains.language.max_confidence", 0.6),
//!     Effect::ProduceArtifact { kind: "language_summary".into() },
//! )])?;
//! let engine = Engine::new(EngineConfig::default(), catalog, Arc::new(my_generator))?;
//!
//! let child = SubjectId::from("child-1");
//! let prov = Provenance::new("session-1", "parent mentioned new words");
//! let h = engine.form_hypothesis(&child, Hypothesis::draft("vocabulary burst", "language"), &prov)?;
//! engine.apply_evidence(&child, h.id, evidence, EvidenceEffect::Supports, &prov)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod confidence;
pub mod config;
pub mod error;
pub mod event;
pub mod evidence;
pub mod id;
pub mod value;

// Belief state and its log
pub mod belief;
pub mod storage;

// Lifecycle orchestration
pub mod engine;
pub mod lifecycle;
pub mod prerequisite;

// Re-export primary types at crate root for convenience
pub use belief::{
    BeliefStore, EvidenceEffect, Hypothesis, HypothesisStatus, Pattern, PendingInsight,
    Recorded, ResolutionKind, Understanding,
};
pub use confidence::Confidence;
pub use config::{BeliefConfig, EngineConfig, OrchestratorConfig};
pub use engine::Engine;
pub use error::{
    EngineError, EngineResult, EvaluationError, GenerationError, IntegrityError, StorageError,
    ValidationError,
};
pub use event::{EntityType, Event, EventType, FieldChange, Provenance};
pub use evidence::{Evidence, EvidenceSource};
pub use id::{
    ArtifactId, EventId, EvidenceId, HypothesisId, InsightId, MomentId, PatternId, SessionId,
    SubjectId,
};
pub use lifecycle::{
    Artifact, ArtifactStatus, CycleReport, Effect, FiringState, GenerationRequest,
    GenerationService, Moment, MomentCatalog, Orchestrator,
};
pub use prerequisite::{evaluate, Condition, Context};
pub use storage::{EventLog, EvidenceLedger, InMemoryEventLog, InMemoryEvidenceLedger};
pub use value::Value;
