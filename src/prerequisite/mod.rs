//! Prerequisite evaluation: condition trees over a nested context.
//!
//! Evaluation is pure and fail-closed. A path that is absent from the
//! context, or holds `null`, reads as `false` in every comparison.

mod condition;
mod context;
mod evaluate;

pub use condition::{Comparison, Condition};
pub use context::{segments, Context, PathLookup};
pub use evaluate::{effective_value, evaluate, try_evaluate, validate};
