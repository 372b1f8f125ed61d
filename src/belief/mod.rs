//! Belief state: hypotheses, patterns and pending insights per subject.
//!
//! The [`Understanding`] aggregate is the unit of replay; [`BeliefStore`]
//! owns one per subject and is the only way to mutate them.

pub mod hypothesis;
pub mod insight;
pub mod journey;
pub mod pattern;
pub mod store;
pub mod understanding;

pub use hypothesis::{
    EvidenceEffect, EvidenceOutcome, FormationSource, Hypothesis, HypothesisDraft,
    HypothesisStatus, ResolutionKind,
};
pub use insight::{DisclosurePolicy, Importance, InsightDraft, PendingInsight};
pub use journey::{Journey, JourneyIter};
pub use pattern::{DetectionSource, Pattern, PatternDraft};
pub use store::{BeliefStore, Recorded};
pub use understanding::Understanding;
