//! Final amputation draws.
//!
//! Every row arrives with its assigned pattern and its amputation probability.
//! Row mode makes one draw per row and removes the whole pattern on success;
//! cell mode makes one draw per amputable cell with the same probability.

use crate::patterns::PatternSpec;
use crate::rng::{SeedStream, StreamDomain, row_blocks, uniform};
use ndarray::{Array2, ArrayView2, Axis, Zip};
use rayon::prelude::*;

/// Draws the missingness mask. `true` marks an amputed cell.
pub fn draw_mask(
    assignment: &[usize],
    probabilities: &[f64],
    spec: &PatternSpec,
    by_cases: bool,
    streams: &SeedStream,
) -> Array2<bool> {
    let num_rows = assignment.len();
    let amputed_variables: Vec<Vec<usize>> = (0..spec.num_patterns())
        .map(|k| spec.amputed_variables(k))
        .collect();

    let cells: Vec<Vec<(usize, usize)>> = row_blocks(num_rows)
        .into_par_iter()
        .enumerate()
        .map(|(block, rows)| {
            let mut rng = streams.substream(StreamDomain::AmputationDraws, block);
            let mut hits = Vec::new();
            for row in rows {
                let variables = &amputed_variables[assignment[row]];
                if variables.is_empty() {
                    continue;
                }
                let p = probabilities[row];
                if by_cases {
                    if uniform(&mut rng) < p {
                        hits.extend(variables.iter().map(|&v| (row, v)));
                    }
                } else {
                    for &v in variables {
                        if uniform(&mut rng) < p {
                            hits.push((row, v));
                        }
                    }
                }
            }
            hits
        })
        .collect();

    let mut mask = Array2::from_elem((num_rows, spec.num_variables()), false);
    for (row, variable) in cells.into_iter().flatten() {
        mask[[row, variable]] = true;
    }
    mask
}

/// Copies `data` and replaces every masked cell with NaN.
pub fn apply_mask(data: ArrayView2<f64>, mask: ArrayView2<bool>) -> Array2<f64> {
    let mut amputed = data.to_owned();
    Zip::from(&mut amputed).and(&mask).for_each(|value, &missing| {
        if missing {
            *value = f64::NAN;
        }
    });
    amputed
}

/// (rows with at least one amputed cell, amputed cells).
pub fn count_amputed(mask: ArrayView2<bool>) -> (usize, usize) {
    let rows = mask
        .axis_iter(Axis(0))
        .filter(|row| row.iter().any(|&m| m))
        .count();
    let cells = mask.iter().filter(|&&m| m).count();
    (rows, cells)
}
