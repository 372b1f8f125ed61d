//! Declarative condition trees.
//!
//! Conditions are configuration. On the wire they are tagged by `op`:
//!
//! ```json
//! {"op": "all", "of": [
//!     {"op": "equals", "path": "artifacts.report.exists", "value": false},
//!     {"op": "greater_or_equal", "path": "evidence.total", "value": 3}
//! ]}
//! ```

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// A boolean condition over context paths.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Condition {
    /// True when every child is true. Empty is true.
    All { of: Vec<Condition> },
    /// True when any child is true. Empty is false.
    Any { of: Vec<Condition> },
    Not { condition: Box<Condition> },
    Equals { path: String, value: Value },
    NotEquals { path: String, value: Value },
    GreaterThan { path: String, value: Value },
    GreaterOrEqual { path: String, value: Value },
    LessThan { path: String, value: Value },
    LessOrEqual { path: String, value: Value },
    /// True when the path resolves to a non-null value.
    Exists { path: String },
    /// True when the path holds a string matching `pattern`.
    Matches { path: String, pattern: String },
    /// Any operator this version does not understand. Always malformed.
    #[serde(other)]
    Unknown,
}

/// Numeric comparison operators.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    GreaterThan,
    GreaterOrEqual,
    LessThan,
    LessOrEqual,
}

impl Comparison {
    /// Applies the comparison.
    #[must_use]
    pub fn holds(self, left: f64, right: f64) -> bool {
        match self {
            Self::GreaterThan => left > right,
            Self::GreaterOrEqual => left >= right,
            Self::LessThan => left < right,
            Self::LessOrEqual => left <= right,
        }
    }
}

impl Condition {
    /// True when every sub-condition holds; an empty list holds.
    #[must_use]
    pub fn all(of: impl IntoIterator<Item = Condition>) -> Self {
        Self::All {
            of: of.into_iter().collect(),
        }
    }

    /// True when at least one sub-condition holds.
    #[must_use]
    pub fn any(of: impl IntoIterator<Item = Condition>) -> Self {
        Self::Any {
            of: of.into_iter().collect(),
        }
    }

    /// Negation.
    #[allow(clippy::should_implement_trait)]
    #[must_use]
    pub fn not(condition: Condition) -> Self {
        Self::Not {
            condition: Box::new(condition),
        }
    }

    /// `path == value`.
    #[must_use]
    pub fn equals(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Equals {
            path: path.into(),
            value: value.into(),
        }
    }

    /// `path != value`.
    #[must_use]
    pub fn not_equals(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::NotEquals {
            path: path.into(),
            value: value.into(),
        }
    }

    /// `path >= value`, numbers only.
    #[must_use]
    pub fn greater_or_equal(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::GreaterOrEqual {
            path: path.into(),
            value: value.into(),
        }
    }

    /// `path > value`, numbers only.
    #[must_use]
    pub fn greater_than(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::GreaterThan {
            path: path.into(),
            value: value.into(),
        }
    }

    /// `path < value`, numbers only.
    #[must_use]
    pub fn less_than(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::LessThan {
            path: path.into(),
            value: value.into(),
        }
    }

    /// True when `path` holds a non-null value.
    #[must_use]
    pub fn exists(path: impl Into<String>) -> Self {
        Self::Exists { path: path.into() }
    }

    /// True when the string at `path` matches the regex `pattern`.
    #[must_use]
    pub fn matches(path: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Matches {
            path: path.into(),
            pattern: pattern.into(),
        }
    }

    /// Every path this condition reads, in tree order.
    #[must_use]
    pub fn paths(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_paths(&mut out);
        out
    }

    fn collect_paths<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Self::All { of } | Self::Any { of } => {
                for c in of {
                    c.collect_paths(out);
                }
            }
            Self::Not { condition } => condition.collect_paths(out),
            Self::Equals { path, .. }
            | Self::NotEquals { path, .. }
            | Self::GreaterThan { path, .. }
            | Self::GreaterOrEqual { path, .. }
            | Self::LessThan { path, .. }
            | Self::LessOrEqual { path, .. }
            | Self::Exists { path }
            | Self::Matches { path, .. } => out.push(path),
            Self::Unknown => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_tagged_tree() {
        let json = r#"{"op": "all", "of": [
            {"op": "equals", "path": "artifacts.report.exists", "value": false},
            {"op": "not", "condition": {"op": "exists", "path": "x"}},
            {"op": "greater_or_equal", "path": "evidence.total", "value": 3}
        ]}"#;
        let parsed: Condition = serde_json::from_str(json).unwrap();
        assert_eq!(
            parsed,
            Condition::all([
                Condition::equals("artifacts.report.exists", false),
                Condition::not(Condition::exists("x")),
                Condition::greater_or_equal("evidence.total", 3),
            ])
        );
        assert_eq!(parsed.paths(), vec!["artifacts.report.exists", "x", "evidence.total"]);
    }

    #[test]
    fn unknown_operator_parses_as_unknown() {
        let parsed: Condition = serde_json::from_str(r#"{"op": "roughly", "path": "a"}"#).unwrap();
        assert_eq!(parsed, Condition::Unknown);
    }
}
