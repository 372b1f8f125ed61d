//! Lifecycle orchestration: moments, artifacts and generation.

mod artifact;
mod context_view;
mod generation;
mod moment;
mod orchestrator;

pub use artifact::{Artifact, ArtifactStatus};
pub use generation::{GenerationRequest, GenerationService};
pub use moment::{Effect, Moment, MomentCatalog};
pub use orchestrator::{CycleReport, FiringState, Orchestrator};
