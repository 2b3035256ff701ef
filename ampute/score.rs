//! Weighted scores for the data-dependent mechanisms.
//!
//! Each pattern is dispatched once into a `ScoringRule`. The scorer then fills an
//! N x K matrix with every row's score under every pattern; it never looks at
//! the pattern assignment, so it runs alongside the pattern selector.

use crate::patterns::PatternSpec;
use crate::types::Mechanism;
use ndarray::parallel::prelude::*;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

/// How one pattern turns a row into a score.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoringRule {
    /// MCAR: the row's score is never consulted.
    Uniform,
    /// MAR / MNAR: weighted sum over a subset of the columns.
    Weighted {
        columns: Vec<usize>,
        weights: Vec<f64>,
    },
}

impl ScoringRule {
    /// MAR reads the variables pattern `pattern` keeps, MNAR the ones it removes.
    /// Columns whose weight is zero are dropped from the rule.
    pub fn for_pattern(spec: &PatternSpec, pattern: usize, mechanism: Mechanism) -> Self {
        let reads_amputed = match mechanism {
            Mechanism::Mcar => return ScoringRule::Uniform,
            Mechanism::Mar => false,
            Mechanism::Mnar => true,
        };

        let (columns, weights): (Vec<usize>, Vec<f64>) = (0..spec.num_variables())
            .filter(|&variable| spec.is_amputed(pattern, variable) == reads_amputed)
            .map(|variable| {
                let weight = spec
                    .weights()
                    .map_or(1.0, |weights| weights[[pattern, variable]]);
                (variable, weight)
            })
            .filter(|&(_, weight)| weight != 0.0)
            .unzip();

        ScoringRule::Weighted { columns, weights }
    }

    #[inline]
    pub fn score(&self, row: ArrayView1<f64>) -> f64 {
        match self {
            ScoringRule::Uniform => 0.0,
            ScoringRule::Weighted { columns, weights } => columns
                .iter()
                .zip(weights)
                .map(|(&column, &weight)| weight * row[column])
                .sum(),
        }
    }
}

/// Prepares the columns that enter the scores. With `continuous == false` each
/// column is first replaced by its mid-rank quantiles; with `standardized` each
/// column is then centered and divided by its sample standard deviation.
pub fn transform_columns(data: ArrayView2<f64>, standardized: bool, continuous: bool) -> Array2<f64> {
    let mut prepared = data.to_owned();
    prepared
        .axis_iter_mut(Axis(1))
        .into_par_iter()
        .for_each(|mut column| {
            if !continuous {
                let quantiles = mid_rank_quantiles(column.view());
                column.assign(&quantiles);
            }
            if standardized {
                standardize_in_place(column.view_mut());
            }
        });
    prepared
}

/// Scores every row under every rule. Shape: [n_rows, n_rules].
pub fn score_matrix(prepared: ArrayView2<f64>, rules: &[ScoringRule]) -> Array2<f64> {
    let mut scores = Array2::zeros((prepared.nrows(), rules.len()));
    scores
        .axis_iter_mut(Axis(0))
        .into_par_iter()
        .zip(prepared.axis_iter(Axis(0)))
        .for_each(|(mut out, row)| {
            for (slot, rule) in out.iter_mut().zip(rules) {
                *slot = rule.score(row);
            }
        });
    scores
}

/// `(rank - 0.5) / n` for every value, ties sharing their average rank.
pub fn mid_rank_quantiles(column: ArrayView1<f64>) -> Array1<f64> {
    let n = column.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| column[a].total_cmp(&column[b]));

    let mut quantiles = Array1::zeros(n);
    let mut start = 0;
    while start < n {
        let mut end = start + 1;
        while end < n && column[order[end]] == column[order[start]] {
            end += 1;
        }
        // Positions start..end hold ranks start+1..=end.
        let average_rank = (start + 1 + end) as f64 / 2.0;
        for &index in &order[start..end] {
            quantiles[index] = (average_rank - 0.5) / n as f64;
        }
        start = end;
    }
    quantiles
}

fn standardize_in_place(mut column: ndarray::ArrayViewMut1<f64>) {
    let n = column.len();
    let mean = column.sum() / n as f64;
    column.mapv_inplace(|v| v - mean);
    if n < 2 {
        return;
    }
    let sd = (column.iter().map(|v| v * v).sum::<f64>() / (n - 1) as f64).sqrt();
    if sd > 0.0 {
        column.mapv_inplace(|v| v / sd);
    }
}
