//! Missingness patterns and the assignment of one pattern to every row.

use crate::rng::{SeedStream, StreamDomain, row_blocks, uniform};
use crate::types::{CandidateShape, ValidationError};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rayon::prelude::*;

/// Largest gap between the frequency sum and one that is accepted silently.
pub const FREQUENCY_SUM_TOLERANCE: f64 = 1e-9;

/// `1 / K` for each of `num_patterns` patterns.
pub fn equal_frequencies(num_patterns: usize) -> Array1<f64> {
    Array1::from_elem(num_patterns, 1.0 / num_patterns as f64)
}

/// The validated pattern inputs of a run: which variables each pattern removes,
/// how often it is used, how its score is weighted and which candidate shape it uses.
#[derive(Debug, Clone)]
pub struct PatternSpec {
    /// K x P, 1 = observed, 0 = amputed.
    patterns: Array2<f64>,
    /// Normalized to sum to one.
    frequencies: Array1<f64>,
    weights: Option<Array2<f64>>,
    shapes: Vec<CandidateShape>,
}

impl PatternSpec {
    /// Validates the pattern matrix and the frequency vector. Frequencies that do
    /// not sum to one are renormalized; every pattern starts with the RIGHT shape.
    pub fn new(patterns: Array2<f64>, frequencies: Array1<f64>) -> Result<Self, ValidationError> {
        let (num_patterns, num_variables) = patterns.dim();
        if num_patterns == 0 || num_variables == 0 {
            return Err(ValidationError::NoPatterns);
        }

        for ((pattern, variable), &value) in patterns.indexed_iter() {
            if value != 0.0 && value != 1.0 {
                return Err(ValidationError::NonBinaryPattern {
                    pattern,
                    variable,
                    value,
                });
            }
        }

        if frequencies.len() != num_patterns {
            return Err(ValidationError::LengthMismatch {
                input: "frequency",
                expected: num_patterns,
                found: frequencies.len(),
            });
        }
        for (pattern, &value) in frequencies.iter().enumerate() {
            if !value.is_finite() || value < 0.0 {
                return Err(ValidationError::InvalidFrequency { pattern, value });
            }
        }
        let total = frequencies.sum();
        if total <= 0.0 {
            return Err(ValidationError::ZeroFrequencySum);
        }
        if (total - 1.0).abs() > FREQUENCY_SUM_TOLERANCE {
            log::warn!("Pattern frequencies sum to {total}; renormalizing them to one.");
        }
        let frequencies = frequencies.mapv(|f| f / total);

        Ok(Self {
            patterns,
            frequencies,
            weights: None,
            shapes: vec![CandidateShape::default(); num_patterns],
        })
    }

    /// One pattern per variable, each removing exactly that variable, used with
    /// equal frequency.
    pub fn one_per_variable(num_variables: usize) -> Result<Self, ValidationError> {
        let patterns = Array2::from_shape_fn((num_variables, num_variables), |(k, p)| {
            if k == p { 0.0 } else { 1.0 }
        });
        Self::new(patterns, equal_frequencies(num_variables))
    }

    /// Attaches a K x P weight matrix. Without one, MAR weighs every observed
    /// variable by 1 and MNAR every amputed variable by 1.
    pub fn with_weights(mut self, weights: Array2<f64>) -> Result<Self, ValidationError> {
        if weights.dim() != self.patterns.dim() {
            return Err(ValidationError::DimensionMismatch {
                input: "weight",
                expected: self.patterns.dim(),
                found: weights.dim(),
            });
        }
        if let Some(((pattern, variable), _)) =
            weights.indexed_iter().find(|(_, w)| !w.is_finite())
        {
            return Err(ValidationError::NonFiniteWeight { pattern, variable });
        }
        self.weights = Some(weights);
        Ok(self)
    }

    pub fn with_shapes(mut self, shapes: Vec<CandidateShape>) -> Result<Self, ValidationError> {
        if shapes.len() != self.num_patterns() {
            return Err(ValidationError::LengthMismatch {
                input: "type",
                expected: self.num_patterns(),
                found: shapes.len(),
            });
        }
        self.shapes = shapes;
        Ok(self)
    }

    /// Same as `with_shapes`, from the numeric codes used in type vectors.
    pub fn with_shape_codes(self, codes: ArrayView1<f64>) -> Result<Self, ValidationError> {
        let shapes = codes
            .iter()
            .enumerate()
            .map(|(pattern, &code)| {
                CandidateShape::from_code(code)
                    .ok_or(ValidationError::UnknownShapeCode { pattern, code })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.with_shapes(shapes)
    }

    pub fn num_patterns(&self) -> usize {
        self.patterns.nrows()
    }

    pub fn num_variables(&self) -> usize {
        self.patterns.ncols()
    }

    pub fn patterns(&self) -> ArrayView2<'_, f64> {
        self.patterns.view()
    }

    pub fn frequencies(&self) -> ArrayView1<'_, f64> {
        self.frequencies.view()
    }

    pub fn weights(&self) -> Option<ArrayView2<'_, f64>> {
        self.weights.as_ref().map(|w| w.view())
    }

    pub fn shape(&self, pattern: usize) -> CandidateShape {
        self.shapes[pattern]
    }

    #[inline]
    pub fn is_amputed(&self, pattern: usize, variable: usize) -> bool {
        self.patterns[[pattern, variable]] == 0.0
    }

    /// Indices of the variables pattern `pattern` removes.
    pub fn amputed_variables(&self, pattern: usize) -> Vec<usize> {
        (0..self.num_variables())
            .filter(|&variable| self.is_amputed(pattern, variable))
            .collect()
    }

    pub fn amputed_count(&self, pattern: usize) -> usize {
        self.patterns
            .row(pattern)
            .iter()
            .filter(|&&v| v == 0.0)
            .count()
    }
}

/// Draws one pattern index per row from the categorical distribution given by
/// `frequencies` (assumed normalized). Rows are independent draws; patterns with
/// zero frequency are never chosen.
pub fn assign_patterns(
    num_rows: usize,
    frequencies: ArrayView1<f64>,
    streams: &SeedStream,
) -> Vec<usize> {
    let mut running = 0.0;
    let cumulative: Vec<f64> = frequencies
        .iter()
        .map(|&f| {
            running += f;
            running
        })
        .collect();
    // Guards against the cumulative sum ending a hair below one.
    let last_positive = frequencies
        .iter()
        .rposition(|&f| f > 0.0)
        .unwrap_or(0);

    row_blocks(num_rows)
        .into_par_iter()
        .enumerate()
        .flat_map_iter(|(block, rows)| {
            let mut rng = streams.substream(StreamDomain::PatternAssignment, block);
            let cumulative = &cumulative;
            rows.map(move |_| {
                let u = uniform(&mut rng);
                cumulative.partition_point(|&c| c <= u).min(last_positive)
            })
            .collect::<Vec<_>>()
        })
        .collect()
}

/// Number of rows assigned to each pattern.
pub fn pattern_counts(assignment: &[usize], num_patterns: usize) -> Vec<usize> {
    let mut counts = vec![0usize; num_patterns];
    for &pattern in assignment {
        counts[pattern] += 1;
    }
    counts
}
