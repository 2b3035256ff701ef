// ========================================================================================
//                             High-Level Data Contracts
// ========================================================================================

// Types used by more than one module. Single-module types stay next to their use.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// The missingness mechanism driving the amputation decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mechanism {
    /// Missing completely at random: the decision ignores the data.
    Mcar,
    /// Missing at random: the decision depends on the variables that stay observed.
    Mar,
    /// Missing not at random: the decision depends on the variables being removed.
    Mnar,
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Mechanism::Mcar => "MCAR",
            Mechanism::Mar => "MAR",
            Mechanism::Mnar => "MNAR",
        };
        f.write_str(label)
    }
}

/// Shape of the candidate function that maps a weighted score to a probability.
/// The functional forms live in `candidate.rs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CandidateShape {
    /// High scores are amputed more often.
    #[default]
    Right,
    /// Low scores are amputed more often.
    Left,
    /// Scores near the center are amputed more often.
    Mid,
    /// Scores at either extreme are amputed more often.
    Tail,
}

impl fmt::Display for CandidateShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CandidateShape::Right => "RIGHT",
            CandidateShape::Left => "LEFT",
            CandidateShape::Mid => "MID",
            CandidateShape::Tail => "TAIL",
        };
        f.write_str(label)
    }
}

/// Hard limits for the offset root-finding in `calibrate.rs`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationLimits {
    /// Accepted absolute gap between the achieved and the requested mean probability.
    pub tolerance: f64,
    /// Number of candidate offsets evaluated before giving up.
    pub max_iterations: usize,
}

impl Default for CalibrationLimits {
    fn default() -> Self {
        Self {
            tolerance: 1e-10,
            max_iterations: 200,
        }
    }
}

/// Everything about a run that is not a matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AmputeSettings {
    /// Requested proportion of missingness, strictly between 0 and 1.
    pub prop: f64,
    pub mechanism: Mechanism,
    /// Center and scale every column before scoring.
    pub standardized: bool,
    /// Score raw values; when false, columns are replaced by mid-rank quantiles.
    pub continuous: bool,
    /// Measure `prop` over rows (true) or over cells (false).
    pub by_cases: bool,
    pub calibration: CalibrationLimits,
}

impl Default for AmputeSettings {
    fn default() -> Self {
        Self {
            prop: 0.5,
            mechanism: Mechanism::Mar,
            standardized: true,
            continuous: true,
            by_cases: true,
            calibration: CalibrationLimits::default(),
        }
    }
}

impl AmputeSettings {
    pub fn new(prop: f64, mechanism: Mechanism) -> Self {
        Self {
            prop,
            mechanism,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(self.prop.is_finite() && self.prop > 0.0 && self.prop < 1.0) {
            return Err(ValidationError::ProportionOutOfRange(self.prop));
        }
        let limits = self.calibration;
        if !(limits.tolerance.is_finite() && limits.tolerance > 0.0) || limits.max_iterations == 0 {
            return Err(ValidationError::InvalidCalibrationLimits {
                tolerance: limits.tolerance,
                max_iterations: limits.max_iterations,
            });
        }
        Ok(())
    }
}

/// Malformed inputs. Raised before any random number is drawn.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("The data matrix must have at least one row and one column, but has shape {rows}x{cols}.")]
    EmptyData { rows: usize, cols: usize },

    #[error("The data matrix must be complete, but cell ({row}, {col}) holds the non-finite value {value}.")]
    NonFiniteData { row: usize, col: usize, value: f64 },

    #[error("At least one pattern over at least one variable is required.")]
    NoPatterns,

    #[error("The {input} matrix has shape {found:?}, but {expected:?} was expected.")]
    DimensionMismatch {
        input: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("The {input} vector has {found} entries, but one per pattern ({expected}) was expected.")]
    LengthMismatch {
        input: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Pattern {pattern} has value {value} for variable {variable}; only 0 (amputed) and 1 (observed) are allowed.")]
    NonBinaryPattern {
        pattern: usize,
        variable: usize,
        value: f64,
    },

    #[error("Pattern {pattern} has frequency {value}; frequencies must be finite and non-negative.")]
    InvalidFrequency { pattern: usize, value: f64 },

    #[error("The pattern frequencies sum to zero, so no pattern can be assigned.")]
    ZeroFrequencySum,

    #[error("Pattern {pattern} has a non-finite weight for variable {variable}.")]
    NonFiniteWeight { pattern: usize, variable: usize },

    #[error("Pattern {pattern} has candidate type code {code}; expected 1 (RIGHT), -1 (LEFT), 0 (MID) or -2 (TAIL).")]
    UnknownShapeCode { pattern: usize, code: f64 },

    #[error("The requested proportion {0} is outside the open interval (0, 1).")]
    ProportionOutOfRange(f64),

    #[error("Calibration needs a positive tolerance and at least one iteration (got tolerance {tolerance}, {max_iterations} iterations).")]
    InvalidCalibrationLimits { tolerance: f64, max_iterations: usize },
}

/// Every way a run can fail. There is no partial output.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AmputeError {
    #[error("Invalid input: {0}")]
    Validation(#[from] ValidationError),

    #[error(
        "The requested proportion {requested} cannot be reached: the assigned patterns allow at most {achievable}."
    )]
    InfeasibleProportion { requested: f64, achievable: f64 },

    #[error(
        "Calibration for pattern {pattern} did not converge within {iterations} iterations (target {target}, last achieved {achieved})."
    )]
    CalibrationNonConvergence {
        pattern: usize,
        iterations: usize,
        target: f64,
        achieved: f64,
    },
}
