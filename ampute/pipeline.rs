// ========================================================================================
//
//                              The Amputation Pipeline
//
// ========================================================================================
//
// One linear pass over the data with a single feedback loop:
//
// 1.  Validation of every input before anything is drawn.
// 2.  Pattern assignment and weighted scoring, run concurrently.
// 3.  Per-pattern calibration of the candidate-function offset.
// 4.  Final draws, the amputed matrix, the mask and the counts.

use crate::amputer::{apply_mask, count_amputed, draw_mask};
use crate::calibrate::{pattern_targets, solve_offset};
use crate::candidate::CandidateGroup;
use crate::patterns::{PatternSpec, assign_patterns, pattern_counts};
use crate::rng::SeedStream;
use crate::score::{ScoringRule, score_matrix, transform_columns};
use crate::types::{
    AmputeError, AmputeSettings, CandidateShape, Mechanism, ValidationError,
};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct Amputation {
    /// The input with every amputed cell replaced by NaN.
    pub amputed: Array2<f64>,
    /// `true` where a cell was amputed. Same shape as the input.
    pub mask: Array2<bool>,
    /// Rows with at least one amputed cell.
    pub amputed_row_count: usize,
    pub amputed_cell_count: usize,
    /// Pattern index assigned to each row.
    pub assignment: Vec<usize>,
    pub report: AmputeReport,
}

/// A serializable account of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmputeReport {
    pub seed: u64,
    pub mechanism: Mechanism,
    pub by_cases: bool,
    pub requested_proportion: f64,
    /// Amputed rows over all rows in row mode, amputed cells over all cells in cell mode.
    pub realized_proportion: f64,
    pub amputed_row_count: usize,
    pub amputed_cell_count: usize,
    pub patterns: Vec<PatternSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternSummary {
    pub pattern: usize,
    pub frequency: f64,
    pub shape: CandidateShape,
    pub assigned_rows: usize,
    /// Mean amputation probability the pattern's rows were calibrated to.
    pub target_rate: f64,
    /// Calibrated offset. Absent for MCAR, for empty groups and for patterns
    /// without zeros.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calibration_iterations: Option<usize>,
    pub amputed_rows: usize,
    pub amputed_cells: usize,
}

/// Ampute `data` according to `spec` and `settings`, drawing from `streams`.
///
/// Either the full result is returned or an error; a run never yields a
/// partially amputed matrix.
pub fn ampute(
    data: ArrayView2<f64>,
    spec: &PatternSpec,
    settings: &AmputeSettings,
    streams: &SeedStream,
) -> Result<Amputation, AmputeError> {
    settings.validate()?;
    validate_data(data, spec)?;

    let (num_rows, num_variables) = data.dim();
    let num_patterns = spec.num_patterns();
    log::info!(
        "Amputing {num_rows}x{num_variables} data with {num_patterns} patterns: {} at proportion {} by {}.",
        settings.mechanism,
        settings.prop,
        if settings.by_cases { "rows" } else { "cells" }
    );

    let rules: Vec<ScoringRule> = (0..num_patterns)
        .map(|k| ScoringRule::for_pattern(spec, k, settings.mechanism))
        .collect();

    let (assignment, scores) = rayon::join(
        || assign_patterns(num_rows, spec.frequencies(), streams),
        || match settings.mechanism {
            Mechanism::Mcar => None,
            Mechanism::Mar | Mechanism::Mnar => {
                let prepared = transform_columns(data, settings.standardized, settings.continuous);
                Some(score_matrix(prepared.view(), &rules))
            }
        },
    );

    let counts = pattern_counts(&assignment, num_patterns);
    let targets = pattern_targets(spec, &counts, settings)?;

    let mut groups: Vec<Vec<usize>> = counts.iter().map(|&c| Vec::with_capacity(c)).collect();
    for (row, &pattern) in assignment.iter().enumerate() {
        groups[pattern].push(row);
    }

    let mut probabilities = vec![0.0; num_rows];
    let mut summaries = Vec::with_capacity(num_patterns);
    for (k, rows) in groups.iter().enumerate() {
        let target = targets[k];
        let mut summary = PatternSummary {
            pattern: k,
            frequency: spec.frequencies()[k],
            shape: spec.shape(k),
            assigned_rows: rows.len(),
            target_rate: target,
            offset: None,
            calibration_iterations: None,
            amputed_rows: 0,
            amputed_cells: 0,
        };

        if !rows.is_empty() && target > 0.0 {
            match &scores {
                None => {
                    for &row in rows {
                        probabilities[row] = target;
                    }
                }
                Some(scores) => {
                    let raw: Vec<f64> = rows.iter().map(|&row| scores[[row, k]]).collect();
                    let group = CandidateGroup::new(spec.shape(k), &raw);
                    let calibration = solve_offset(
                        |offset| group.mean_probability(offset),
                        target,
                        &settings.calibration,
                    )
                    .map_err(|failure| AmputeError::CalibrationNonConvergence {
                        pattern: k,
                        iterations: failure.iterations,
                        target,
                        achieved: failure.achieved,
                    })?;
                    log::debug!(
                        "Pattern {k} ({}, {} rows): offset {:.6} after {} iterations.",
                        spec.shape(k),
                        rows.len(),
                        calibration.offset,
                        calibration.iterations
                    );
                    for (&row, p) in rows.iter().zip(group.probabilities(calibration.offset)) {
                        probabilities[row] = p;
                    }
                    summary.offset = Some(calibration.offset);
                    summary.calibration_iterations = Some(calibration.iterations);
                }
            }
        }
        summaries.push(summary);
    }

    let mask = draw_mask(&assignment, &probabilities, spec, settings.by_cases, streams);
    let amputed = apply_mask(data, mask.view());
    let (amputed_row_count, amputed_cell_count) = count_amputed(mask.view());

    for (row, &pattern) in assignment.iter().enumerate() {
        let cells = mask.row(row).iter().filter(|&&m| m).count();
        if cells > 0 {
            summaries[pattern].amputed_rows += 1;
            summaries[pattern].amputed_cells += cells;
        }
    }

    let realized_proportion = if settings.by_cases {
        amputed_row_count as f64 / num_rows as f64
    } else {
        amputed_cell_count as f64 / (num_rows * num_variables) as f64
    };
    log::info!(
        "Amputed {amputed_row_count} rows and {amputed_cell_count} cells (realized proportion {realized_proportion:.4}, requested {}).",
        settings.prop
    );

    let report = AmputeReport {
        seed: streams.seed(),
        mechanism: settings.mechanism,
        by_cases: settings.by_cases,
        requested_proportion: settings.prop,
        realized_proportion,
        amputed_row_count,
        amputed_cell_count,
        patterns: summaries,
    };

    Ok(Amputation {
        amputed,
        mask,
        amputed_row_count,
        amputed_cell_count,
        assignment,
        report,
    })
}

fn validate_data(data: ArrayView2<f64>, spec: &PatternSpec) -> Result<(), ValidationError> {
    let (rows, cols) = data.dim();
    if rows == 0 || cols == 0 {
        return Err(ValidationError::EmptyData { rows, cols });
    }
    if cols != spec.num_variables() {
        return Err(ValidationError::DimensionMismatch {
            input: "pattern",
            expected: (spec.num_patterns(), cols),
            found: (spec.num_patterns(), spec.num_variables()),
        });
    }
    if let Some(((row, col), &value)) = data.indexed_iter().find(|(_, v)| !v.is_finite()) {
        return Err(ValidationError::NonFiniteData { row, col, value });
    }
    Ok(())
}
