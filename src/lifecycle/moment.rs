//! Lifecycle moments: declarative rules loaded as configuration.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ValidationError;
use crate::id::MomentId;
use crate::prerequisite::{validate, Condition};

/// What a moment does when its condition holds.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    /// Generate an artifact of `kind` through the generation service.
    ProduceArtifact { kind: String },
    /// Add a capability to the subject.
    UnlockCapability { name: String },
    /// Expose an affordance. Affordances listed in `reveals` become
    /// available while this one is exposed.
    ExposeAffordance {
        id: String,
        #[serde(default)]
        reveals: BTreeSet<String>,
    },
}

impl Effect {
    fn names(&self) -> Vec<(&'static str, &str)> {
        match self {
            Self::ProduceArtifact { kind } => vec![("kind", kind.as_str())],
            Self::UnlockCapability { name } => vec![("name", name.as_str())],
            Self::ExposeAffordance { id, reveals } => std::iter::once(("id", id.as_str()))
                .chain(reveals.iter().map(|r| ("reveals", r.as_str())))
                .collect(),
        }
    }
}

const fn default_fires_once() -> bool {
    true
}

/// A named rule mapping a condition to an effect.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Moment {
    pub id: MomentId,
    pub condition: Condition,
    pub effect: Effect,
    /// A moment that does not fire once re-arms after its condition has been
    /// observed false.
    #[serde(default = "default_fires_once")]
    pub fires_once: bool,
}

impl Moment {
    /// A moment that fires once.
    #[must_use]
    pub fn new(id: impl Into<MomentId>, condition: Condition, effect: Effect) -> Self {
        Self {
            id: id.into(),
            condition,
            effect,
            fires_once: true,
        }
    }

    /// Sets `fires_once`.
    #[must_use]
    pub fn fires_once(mut self, fires_once: bool) -> Self {
        self.fires_once = fires_once;
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    List(Vec<Moment>),
    Wrapped { moments: Vec<Moment> },
}

/// The immutable set of moments an orchestrator runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MomentCatalog {
    moments: Vec<Moment>,
}

impl MomentCatalog {
    /// Builds a catalog, rejecting duplicate ids and unusable names.
    ///
    /// Conditions that are malformed under every context are accepted with a
    /// warning; they simply never fire.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::DuplicateId` for repeated moment ids,
    /// `ValidationError::EmptyField` for blank ids or effect names, and
    /// `ValidationError::InvalidConfig` for names containing `.` or for an
    /// affordance that is both exposed directly and revealed by another.
    pub fn new(moments: Vec<Moment>) -> Result<Self, ValidationError> {
        let mut seen = HashSet::new();
        for moment in &moments {
            if moment.id.as_str().trim().is_empty() {
                return Err(ValidationError::EmptyField {
                    field: "moment.id".to_string(),
                });
            }
            if !seen.insert(moment.id.clone()) {
                return Err(ValidationError::DuplicateId {
                    entity: "moment",
                    id: moment.id.to_string(),
                });
            }
            for (field, name) in moment.effect.names() {
                if name.trim().is_empty() {
                    return Err(ValidationError::EmptyField {
                        field: format!("effect.{field}"),
                    });
                }
                if name.contains('.') {
                    return Err(ValidationError::InvalidConfig {
                        reason: format!("moment {}: effect {field} '{name}' contains '.'", moment.id),
                    });
                }
            }
            if let Err(err) = validate(&moment.condition) {
                warn!(moment = %moment.id, error = %err, "moment condition is malformed and will never fire");
            }
        }

        let exposed: HashSet<&str> = moments
            .iter()
            .filter_map(|m| match &m.effect {
                Effect::ExposeAffordance { id, .. } => Some(id.as_str()),
                _ => None,
            })
            .collect();
        for moment in &moments {
            if let Effect::ExposeAffordance { reveals, .. } = &moment.effect {
                if let Some(both) = reveals.iter().find(|r| exposed.contains(r.as_str())) {
                    return Err(ValidationError::InvalidConfig {
                        reason: format!(
                            "affordance '{both}' is exposed by a moment and revealed by {}",
                            moment.id
                        ),
                    });
                }
            }
        }

        Ok(Self { moments })
    }

    /// Parses a JSON array of moments, or an object with a `moments` array.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidConfig` for unparseable JSON, and
    /// anything [`MomentCatalog::new`] rejects.
    pub fn from_json_str(json: &str) -> Result<Self, ValidationError> {
        let file: CatalogFile =
            serde_json::from_str(json).map_err(|e| ValidationError::InvalidConfig {
                reason: format!("moment catalog: {e}"),
            })?;
        match file {
            CatalogFile::List(moments) | CatalogFile::Wrapped { moments } => Self::new(moments),
        }
    }

    /// Moments in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &Moment> {
        self.moments.iter()
    }

    /// Looks up a moment.
    #[must_use]
    pub fn get(&self, id: &MomentId) -> Option<&Moment> {
        self.moments.iter().find(|m| &m.id == id)
    }

    /// Number of moments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.moments.len()
    }

    /// True when the catalog has no moments.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.moments.is_empty()
    }
}
