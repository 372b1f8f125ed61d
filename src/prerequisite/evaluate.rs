//! The prerequisite evaluator.
//!
//! [`evaluate`] is the public, fail-closed entry point: malformed trees are
//! logged and yield `false`. [`try_evaluate`] exposes the underlying error for
//! configuration checks and tests.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use tracing::warn;

use crate::error::EvaluationError;
use crate::value::Value;

use super::condition::{Comparison, Condition};
use super::context::{segments, Context, PathLookup};

static REGEX_CACHE: OnceLock<RwLock<HashMap<String, regex::Regex>>> = OnceLock::new();
const REGEX_CACHE_MAX: usize = 256;

fn cached_regex(pattern: &str) -> Result<regex::Regex, EvaluationError> {
    let cache = REGEX_CACHE.get_or_init(|| RwLock::new(HashMap::new()));

    if let Ok(guard) = cache.read() {
        if let Some(re) = guard.get(pattern) {
            return Ok(re.clone());
        }
    }

    let compiled = regex::Regex::new(pattern).map_err(|e| EvaluationError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })?;

    // A poisoned cache only costs a recompile.
    if let Ok(mut guard) = cache.write() {
        if guard.len() >= REGEX_CACHE_MAX {
            guard.clear();
        }
        guard
            .entry(pattern.to_string())
            .or_insert_with(|| compiled.clone());
    }
    Ok(compiled)
}

/// The value a comparison sees at a looked-up path.
///
/// An absent path, or one holding `null`, is `false`. Every comparison goes
/// through here; nothing compares raw lookups directly.
#[must_use]
pub fn effective_value(lookup: PathLookup<'_>) -> Cow<'_, Value> {
    match lookup {
        PathLookup::Present(value) if !value.is_null() => Cow::Borrowed(value),
        _ => Cow::Owned(Value::Bool(false)),
    }
}

/// Equality with numeric widening. Literal `null` compares as `false`.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Null, other) | (other, Value::Null) => {
            matches!(other, Value::Null | Value::Bool(false))
        }
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
            Value::Int(*a).as_f64() == Some(*b)
        }
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        (Value::Map(a), Value::Map(b)) => {
            a.len() == b.len()
                && a.iter()
                    .zip(b)
                    .all(|((ka, va), (kb, vb))| ka == kb && values_equal(va, vb))
        }
        _ => left == right,
    }
}

fn compare(
    context: &Context,
    path: &str,
    literal: &Value,
    op: Comparison,
) -> Result<bool, EvaluationError> {
    segments(path)?;
    let Some(right) = literal.as_f64() else {
        return Err(EvaluationError::TypeMismatch {
            path: path.to_string(),
            expected: "number",
            found: literal.type_name(),
        });
    };
    match context.lookup(path) {
        PathLookup::Absent => Ok(false),
        PathLookup::Present(value) if value.is_null() => Ok(false),
        PathLookup::Present(value) => match value.as_f64() {
            Some(left) => Ok(op.holds(left, right)),
            None => Err(EvaluationError::TypeMismatch {
                path: path.to_string(),
                expected: "number",
                found: value.type_name(),
            }),
        },
    }
}

/// Evaluates `condition`, surfacing malformed trees as errors.
///
/// `all`/`any` short-circuit, so an error in a branch that is never reached
/// is not reported.
///
/// # Errors
///
/// Returns an [`EvaluationError`] for unknown operators, empty paths,
/// non-numeric operands of numeric comparisons and invalid patterns.
pub fn try_evaluate(condition: &Condition, context: &Context) -> Result<bool, EvaluationError> {
    match condition {
        Condition::All { of } => {
            for child in of {
                if !try_evaluate(child, context)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        Condition::Any { of } => {
            for child in of {
                if try_evaluate(child, context)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Condition::Not { condition } => Ok(!try_evaluate(condition, context)?),
        Condition::Equals { path, value } => {
            segments(path)?;
            Ok(values_equal(&effective_value(context.lookup(path)), value))
        }
        Condition::NotEquals { path, value } => {
            segments(path)?;
            Ok(!values_equal(&effective_value(context.lookup(path)), value))
        }
        Condition::GreaterThan { path, value } => compare(context, path, value, Comparison::GreaterThan),
        Condition::GreaterOrEqual { path, value } => {
            compare(context, path, value, Comparison::GreaterOrEqual)
        }
        Condition::LessThan { path, value } => compare(context, path, value, Comparison::LessThan),
        Condition::LessOrEqual { path, value } => compare(context, path, value, Comparison::LessOrEqual),
        Condition::Exists { path } => {
            segments(path)?;
            Ok(matches!(context.lookup(path), PathLookup::Present(v) if !v.is_null()))
        }
        Condition::Matches { path, pattern } => {
            segments(path)?;
            let re = cached_regex(pattern)?;
            Ok(context
                .lookup(path)
                .value()
                .and_then(Value::as_str)
                .is_some_and(|s| re.is_match(s)))
        }
        Condition::Unknown => Err(EvaluationError::UnknownOperator),
    }
}

/// Evaluates `condition` against `context`. Never fails: a malformed tree is
/// logged and evaluates to `false`.
///
/// # Examples
///
/// ```
/// use understanding::{evaluate, Condition, Context};
///
/// let ctx = Context::new();
/// // Nothing has been generated yet: the absent flag reads as false.
/// assert!(evaluate(&Condition::equals("artifacts.report.exists", false), &ctx));
/// assert!(!evaluate(&Condition::equals("artifacts.report.exists", true), &ctx));
/// ```
#[must_use]
pub fn evaluate(condition: &Condition, context: &Context) -> bool {
    match try_evaluate(condition, context) {
        Ok(result) => result,
        Err(err) => {
            warn!(error = %err, "malformed condition evaluated as false");
            false
        }
    }
}

/// Checks a condition for problems that make it malformed under every
/// context. Unlike evaluation this visits every branch.
///
/// # Errors
///
/// Returns the first problem found.
pub fn validate(condition: &Condition) -> Result<(), EvaluationError> {
    match condition {
        Condition::All { of } | Condition::Any { of } => of.iter().try_for_each(validate),
        Condition::Not { condition } => validate(condition),
        Condition::Equals { path, .. } | Condition::NotEquals { path, .. } | Condition::Exists { path } => {
            segments(path).map(|_| ())
        }
        Condition::GreaterThan { path, value }
        | Condition::GreaterOrEqual { path, value }
        | Condition::LessThan { path, value }
        | Condition::LessOrEqual { path, value } => {
            segments(path)?;
            if value.is_number() {
                Ok(())
            } else {
                Err(EvaluationError::TypeMismatch {
                    path: path.clone(),
                    expected: "number",
                    found: value.type_name(),
                })
            }
        }
        Condition::Matches { path, pattern } => {
            segments(path)?;
            cached_regex(pattern).map(|_| ())
        }
        Condition::Unknown => Err(EvaluationError::UnknownOperator),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> Context {
        let mut ctx = Context::new();
        ctx.set("artifacts.summary.exists", true).unwrap();
        ctx.set("artifacts.summary.status", "ready").unwrap();
        ctx.set("evidence.total", 4).unwrap();
        ctx.set("understanding.domains.motor.max_confidence", 0.7).unwrap();
        ctx.set("child.name", "Noa").unwrap();
        ctx.set("flags.cleared", Value::Null).unwrap();
        ctx
    }

    #[test]
    fn absent_path_reads_as_false() {
        let ctx = ctx();
        assert!(evaluate(&Condition::equals("artifacts.report.exists", false), &ctx));
        assert!(!evaluate(&Condition::equals("artifacts.report.exists", true), &ctx));
        assert!(!evaluate(&Condition::equals("artifacts.report.status", "ready"), &ctx));
        assert!(!evaluate(&Condition::exists("artifacts.report.exists"), &ctx));
        assert!(evaluate(&Condition::not_equals("artifacts.report.exists", true), &ctx));
    }

    #[test]
    fn explicit_null_reads_as_false() {
        let ctx = ctx();
        assert!(evaluate(&Condition::equals("flags.cleared", false), &ctx));
        assert!(evaluate(&Condition::equals("flags.cleared", Value::Null), &ctx));
        assert!(!evaluate(&Condition::exists("flags.cleared"), &ctx));
    }

    #[test]
    fn equality_widens_numbers() {
        let ctx = ctx();
        assert!(evaluate(&Condition::equals("evidence.total", 4.0), &ctx));
        assert!(evaluate(&Condition::equals("artifacts.summary.status", "ready"), &ctx));
        assert!(!evaluate(&Condition::equals("evidence.total", "4"), &ctx));
    }

    #[test]
    fn numeric_comparisons() {
        let ctx = ctx();
        assert!(evaluate(&Condition::greater_or_equal("evidence.total", 4), &ctx));
        assert!(!evaluate(&Condition::greater_than("evidence.total", 4), &ctx));
        assert!(evaluate(&Condition::greater_than("understanding.domains.motor.max_confidence", 0.6), &ctx));
        assert!(evaluate(&Condition::less_than("evidence.total", 10), &ctx));
        // Absent operands are false without an error.
        assert_eq!(try_evaluate(&Condition::greater_than("missing", 0), &ctx), Ok(false));
    }

    #[test]
    fn type_mismatch_fails_closed() {
        let ctx = ctx();
        let cond = Condition::greater_than("child.name", 3);
        assert!(matches!(
            try_evaluate(&cond, &ctx),
            Err(EvaluationError::TypeMismatch { found: "string", .. })
        ));
        assert!(!evaluate(&cond, &ctx));
        assert!(!evaluate(&Condition::not(cond), &ctx));
    }

    #[test]
    fn malformed_trees_fail_closed() {
        let ctx = ctx();
        assert_eq!(try_evaluate(&Condition::Unknown, &ctx), Err(EvaluationError::UnknownOperator));
        assert_eq!(try_evaluate(&Condition::exists(""), &ctx), Err(EvaluationError::EmptyPath));
        assert!(!evaluate(&Condition::any([Condition::Unknown]), &ctx));
        assert!(!evaluate(&Condition::matches("child.name", "("), &ctx));
    }

    #[test]
    fn combinators_short_circuit() {
        let ctx = ctx();
        assert!(evaluate(&Condition::all([]), &ctx));
        assert!(!evaluate(&Condition::any([]), &ctx));
        assert!(evaluate(
            &Condition::any([Condition::exists("evidence.total"), Condition::Unknown]),
            &ctx
        ));
        assert!(!evaluate(
            &Condition::all([Condition::exists("nope"), Condition::Unknown]),
            &ctx
        ));
    }

    #[test]
    fn regex_leaf() {
        let ctx = ctx();
        assert!(evaluate(&Condition::matches("child.name", "^N"), &ctx));
        assert!(!evaluate(&Condition::matches("child.name", "^X"), &ctx));
        assert!(!evaluate(&Condition::matches("evidence.total", "4"), &ctx));
        assert!(!evaluate(&Condition::matches("missing", ".*"), &ctx));
    }

    #[test]
    fn validate_visits_every_branch() {
        assert!(validate(&Condition::any([Condition::exists("a"), Condition::Unknown])).is_err());
        assert!(validate(&Condition::greater_than("a", "x")).is_err());
        assert!(validate(&Condition::matches("a", "[")).is_err());
        assert!(validate(&Condition::all([Condition::equals("a.b", false)])).is_ok());
    }
}
