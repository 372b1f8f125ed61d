//! Engine configuration.
//!
//! Every field has a default, so a partial JSON document (or none at all)
//! yields a usable configuration.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Confidence arithmetic and staleness settings for the belief store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeliefConfig {
    /// Confidence added by supporting evidence.
    pub support_step: f32,
    /// Confidence removed by contradicting evidence.
    pub contradiction_step: f32,
    /// A forming hypothesis becomes active once confidence exceeds this.
    pub activation_threshold: f32,
    /// A hypothesis starts weakening once confidence drops below this.
    pub weakening_threshold: f32,
    /// Days without new evidence before a live hypothesis counts as stale.
    pub stale_after_days: i64,
}

impl Default for BeliefConfig {
    fn default() -> Self {
        Self {
            support_step: 0.15,
            contradiction_step: 0.20,
            activation_threshold: 0.6,
            weakening_threshold: 0.3,
            stale_after_days: 14,
        }
    }
}

/// Lifecycle orchestrator settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Number of generation worker threads.
    pub generation_workers: usize,
    /// Maximum queued generation jobs before dispatch is refused.
    pub queue_capacity: usize,
    /// Run another evaluation cycle when a generation completes.
    pub reevaluate_on_completion: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            generation_workers: 2,
            queue_capacity: 256,
            reevaluate_on_completion: true,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Confidence steps and thresholds.
    pub beliefs: BeliefConfig,
    /// Generation workers and cycle behaviour.
    pub orchestrator: OrchestratorConfig,
}

impl EngineConfig {
    /// Parses and validates a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` if the document does not parse
    /// or describes an unusable configuration.
    pub fn from_json_str(json: &str) -> Result<Self, ValidationError> {
        let cfg: Self = serde_json::from_str(json).map_err(|e| ValidationError::InvalidConfig {
            reason: format!("unparseable engine config: {e}"),
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Checks value ranges and cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` naming the first violation.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let b = &self.beliefs;
        for (name, step) in [
            ("support_step", b.support_step),
            ("contradiction_step", b.contradiction_step),
        ] {
            if !(step > 0.0 && step <= 1.0) {
                return Err(invalid(format!("{name} must be in (0.0, 1.0], got {step}")));
            }
        }
        for (name, threshold) in [
            ("activation_threshold", b.activation_threshold),
            ("weakening_threshold", b.weakening_threshold),
        ] {
            if !(0.0..=1.0).contains(&threshold) {
                return Err(invalid(format!("{name} must be in [0.0, 1.0], got {threshold}")));
            }
        }
        if b.activation_threshold <= b.weakening_threshold {
            return Err(invalid(
                "activation_threshold must be greater than weakening_threshold".to_string(),
            ));
        }
        if b.stale_after_days < 0 {
            return Err(invalid("stale_after_days cannot be negative".to_string()));
        }

        let o = &self.orchestrator;
        if o.generation_workers == 0 {
            return Err(invalid("generation_workers must be at least 1".to_string()));
        }
        if o.queue_capacity == 0 {
            return Err(invalid("queue_capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn invalid(reason: String) -> ValidationError {
    ValidationError::InvalidConfig { reason }
}
