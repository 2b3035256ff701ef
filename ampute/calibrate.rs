//! Proportion calibration.
//!
//! For every pattern group the calibrator searches the offset `b` at which the
//! group's mean candidate probability equals the group's target rate. The mean is
//! strictly increasing in `b`, so a bracketing search converges; the step itself
//! is the pure function `next_offset`, independent of how the mean is computed.

use crate::patterns::PatternSpec;
use crate::types::{AmputeError, AmputeSettings, CalibrationLimits, Mechanism};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The interval known to contain the root. Either side may still be infinite
/// while the search is expanding outward.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    pub lower: f64,
    pub upper: f64,
}

impl Bracket {
    pub fn unbounded() -> Self {
        Self {
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
        }
    }

    pub fn is_bounded(&self) -> bool {
        self.lower.is_finite() && self.upper.is_finite()
    }
}

/// One search step. Given the offset just evaluated and the mean probability it
/// achieved, narrows the bracket and proposes the next offset: bisection once both
/// sides are finite, otherwise a step outward that doubles each time.
pub fn next_offset(bracket: Bracket, offset: f64, achieved: f64, target: f64) -> (Bracket, f64) {
    let bracket = if achieved < target {
        Bracket {
            lower: offset,
            ..bracket
        }
    } else {
        Bracket {
            upper: offset,
            ..bracket
        }
    };

    let next = match (bracket.lower.is_finite(), bracket.upper.is_finite()) {
        (true, true) => 0.5 * (bracket.lower + bracket.upper),
        (true, false) => bracket.lower + bracket.lower.abs().max(1.0),
        (false, true) => bracket.upper - bracket.upper.abs().max(1.0),
        (false, false) => offset,
    };
    (bracket, next)
}

/// A converged offset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    pub offset: f64,
    pub achieved: f64,
    pub iterations: usize,
}

#[derive(Error, Debug, Clone, Copy, PartialEq)]
#[error("no offset reached the target {target} within {iterations} iterations (last mean {achieved})")]
pub struct CalibrationFailure {
    pub iterations: usize,
    pub target: f64,
    pub achieved: f64,
}

/// Searches the offset whose mean probability `mean_at(offset)` is within
/// `limits.tolerance` of `target`. The iteration cap is a hard bound.
pub fn solve_offset<F>(
    mean_at: F,
    target: f64,
    limits: &CalibrationLimits,
) -> Result<Calibration, CalibrationFailure>
where
    F: Fn(f64) -> f64,
{
    let mut bracket = Bracket::unbounded();
    let mut offset = 0.0;
    let mut achieved = f64::NAN;

    for iteration in 1..=limits.max_iterations {
        achieved = mean_at(offset);
        if !achieved.is_finite() {
            return Err(CalibrationFailure {
                iterations: iteration,
                target,
                achieved,
            });
        }
        log::debug!(
            "Calibration iteration {iteration}: offset {offset:.6}, mean {achieved:.10}, target {target:.10}"
        );
        if (achieved - target).abs() <= limits.tolerance {
            return Ok(Calibration {
                offset,
                achieved,
                iterations: iteration,
            });
        }
        let (narrowed, next) = next_offset(bracket, offset, achieved, target);
        bracket = narrowed;
        offset = next;
    }

    Err(CalibrationFailure {
        iterations: limits.max_iterations,
        target,
        achieved,
    })
}

/// Target amputation rate of every pattern group, given how many rows each pattern
/// received.
///
/// Row mode asks every pattern that removes something for `prop` of its rows.
/// Cell mode converts `prop` into the row probability `q` that, applied to every
/// amputable cell, removes `prop * N * P` cells in expectation. Patterns that remove
/// nothing always get zero.
pub fn pattern_targets(
    spec: &PatternSpec,
    counts: &[usize],
    settings: &AmputeSettings,
) -> Result<Vec<f64>, AmputeError> {
    let num_rows: usize = counts.iter().sum();
    let amputable: Vec<bool> = (0..spec.num_patterns())
        .map(|k| spec.amputed_count(k) > 0)
        .collect();

    let amputable_rows: usize = counts
        .iter()
        .zip(&amputable)
        .filter(|&(_, &a)| a)
        .map(|(&c, _)| c)
        .sum();
    if amputable_rows == 0 {
        return Err(AmputeError::InfeasibleProportion {
            requested: settings.prop,
            achievable: 0.0,
        });
    }

    let rate = if settings.by_cases {
        if amputable_rows < num_rows {
            let realized = settings.prop * amputable_rows as f64 / num_rows as f64;
            log::warn!(
                "{} of {num_rows} rows use patterns without zeros; the expected row proportion drops from {} to {realized:.4}.",
                num_rows - amputable_rows,
                settings.prop
            );
        }
        settings.prop
    } else {
        let candidate_cells: usize = counts
            .iter()
            .enumerate()
            .map(|(k, &c)| c * spec.amputed_count(k))
            .sum();
        let total_cells = (num_rows * spec.num_variables()) as f64;
        let q = settings.prop * total_cells / candidate_cells as f64;
        // The logistic never reaches one, so only MCAR can ampute every candidate.
        let feasible = match settings.mechanism {
            Mechanism::Mcar => q <= 1.0,
            Mechanism::Mar | Mechanism::Mnar => q < 1.0,
        };
        if !feasible {
            return Err(AmputeError::InfeasibleProportion {
                requested: settings.prop,
                achievable: candidate_cells as f64 / total_cells,
            });
        }
        log::debug!(
            "Cell proportion {} over {candidate_cells} candidate cells needs row rate {q:.6}.",
            settings.prop
        );
        q
    };

    Ok(amputable
        .into_iter()
        .map(|a| if a { rate } else { 0.0 })
        .collect())
}
