//! Nested evaluation context addressed by dotted paths.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::EvaluationError;
use crate::value::Value;

/// Result of a path lookup. Total: every path is either present or absent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathLookup<'a> {
    /// The path resolves to a value (which may itself be `Null`).
    Present(&'a Value),
    /// Some segment of the path does not exist.
    Absent,
}

impl<'a> PathLookup<'a> {
    /// The value, if present.
    #[must_use]
    pub const fn value(self) -> Option<&'a Value> {
        match self {
            Self::Present(v) => Some(v),
            Self::Absent => None,
        }
    }
}

/// Splits a dotted path, rejecting empty paths and empty segments.
///
/// # Errors
///
/// Returns `EvaluationError::EmptyPath` for `""`, `"a..b"`, `".a"` and the like.
pub fn segments(path: &str) -> Result<Vec<&str>, EvaluationError> {
    let parts: Vec<&str> = path.trim().split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(EvaluationError::EmptyPath);
    }
    Ok(parts)
}

/// A tree of values addressed by dotted paths such as
/// `artifacts.summary.exists`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    root: BTreeMap<String, Value>,
}

impl Context {
    /// An empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `path` to `value`, creating intermediate maps. Intermediate
    /// non-map values are replaced.
    ///
    /// # Errors
    ///
    /// Returns `EvaluationError::EmptyPath` for a malformed path.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<(), EvaluationError> {
        let parts = segments(path)?;
        let Some((last, parents)) = parts.split_last() else {
            return Err(EvaluationError::EmptyPath);
        };

        let mut map = &mut self.root;
        for part in parents {
            let slot = map
                .entry((*part).to_string())
                .or_insert_with(|| Value::Map(BTreeMap::new()));
            if !matches!(slot, Value::Map(_)) {
                *slot = Value::Map(BTreeMap::new());
            }
            let Value::Map(next) = slot else {
                return Err(EvaluationError::EmptyPath);
            };
            map = next;
        }
        map.insert((*last).to_string(), value.into());
        Ok(())
    }

    /// Looks up a dotted path. Malformed paths are absent.
    #[must_use]
    pub fn lookup(&self, path: &str) -> PathLookup<'_> {
        let Ok(parts) = segments(path) else {
            return PathLookup::Absent;
        };
        let mut map = &self.root;
        let mut found = None;
        for (idx, part) in parts.iter().enumerate() {
            let Some(value) = map.get(*part) else {
                return PathLookup::Absent;
            };
            if idx + 1 == parts.len() {
                found = Some(value);
            } else if let Value::Map(next) = value {
                map = next;
            } else {
                return PathLookup::Absent;
            }
        }
        found.map_or(PathLookup::Absent, PathLookup::Present)
    }

    /// True when nothing has been set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    /// The context as one map value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        Value::Map(self.root.clone())
    }
}

impl From<BTreeMap<String, Value>> for Context {
    fn from(root: BTreeMap<String, Value>) -> Self {
        Self { root }
    }
}
