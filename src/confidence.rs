//! Confidence: a strength-of-belief scalar in [0.0, 1.0].
//!
//! Construction validates the range; arithmetic saturates at the bounds so a
//! confidence can never leave it.
//!
//! Step arithmetic and threshold checks run on a basis-point grid, so a run
//! of `+0.15`/`-0.20` steps lands exactly on `0.30` instead of drifting to
//! `0.29999995`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Strength of belief in a hypothesis or pattern.
///
/// # Examples
///
/// ```
/// use understanding::Confidence;
///
/// let c = Confidence::new(0.9).unwrap();
/// assert_eq!(c.strengthen(0.15).value(), 1.0);
/// assert!(Confidence::new(1.5).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct Confidence(f32);

impl Confidence {
    /// Minimum valid confidence value.
    pub const MIN_VALUE: f32 = 0.0;

    /// Maximum valid confidence value.
    pub const MAX_VALUE: f32 = 1.0;

    /// Creates a confidence with validation.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::ConfidenceOutOfRange` if the value is NaN or
    /// outside [0.0, 1.0].
    pub fn new(value: f32) -> Result<Self, ValidationError> {
        Self::validate_value(value)?;
        Ok(Self(value))
    }

    /// Complete uncertainty.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0.0)
    }

    /// Complete certainty.
    #[must_use]
    pub const fn one() -> Self {
        Self(1.0)
    }

    /// The raw value.
    #[must_use]
    pub const fn value(self) -> f32 {
        self.0
    }

    /// Adds `step`, capped at 1.0.
    #[must_use]
    pub fn strengthen(self, step: f32) -> Self {
        Self::from_basis_points((self.basis_points() + basis_points(step)).min(SCALE))
    }

    /// Subtracts `step`, floored at 0.0.
    #[must_use]
    pub fn weaken(self, step: f32) -> Self {
        Self::from_basis_points((self.basis_points() - basis_points(step)).max(0))
    }

    /// True when strictly above `threshold`.
    #[must_use]
    pub fn exceeds(self, threshold: f32) -> bool {
        self.basis_points() > basis_points(threshold)
    }

    /// True when strictly below `threshold`.
    #[must_use]
    pub fn below(self, threshold: f32) -> bool {
        self.basis_points() < basis_points(threshold)
    }

    /// The value in ten-thousandths, rounded to the nearest.
    #[must_use]
    pub fn basis_points(self) -> i32 {
        basis_points(self.0)
    }

    #[allow(clippy::cast_possible_truncation)]
    fn from_basis_points(bp: i32) -> Self {
        Self((f64::from(bp) / f64::from(SCALE)) as f32)
    }

    fn validate_value(value: f32) -> Result<(), ValidationError> {
        if value.is_nan() || !(Self::MIN_VALUE..=Self::MAX_VALUE).contains(&value) {
            return Err(ValidationError::ConfidenceOutOfRange { value });
        }
        Ok(())
    }
}

/// Basis points in 1.0.
const SCALE: i32 = 10_000;

// Inputs are validated to [0, 1] or are config steps, so the product fits.
#[allow(clippy::cast_possible_truncation)]
fn basis_points(value: f32) -> i32 {
    (f64::from(value) * f64::from(SCALE)).round() as i32
}

impl Default for Confidence {
    fn default() -> Self {
        Self::zero()
    }
}

impl TryFrom<f32> for Confidence {
    type Error = ValidationError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Confidence> for f32 {
    fn from(c: Confidence) -> Self {
        c.0
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}
