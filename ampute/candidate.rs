//! Candidate functions: map a row's weighted score and a calibration offset to
//! the probability that the row is amputed.
//!
//! Within a pattern group the scores are standardized to `z` and `c` is the
//! median of `z`. With the logistic `σ`:
//!
//! - RIGHT: `σ(z + b)`
//! - LEFT:  `σ(-z + b)`
//! - MID:   `σ(-|z - c| + 0.75 + b)`
//! - TAIL:  `σ(|z - c| - 0.75 + b)`
//!
//! Every form is strictly increasing in the offset `b`, which is what lets the
//! calibrator solve for `b` with a bracketing search.

use crate::rng::ROW_BLOCK_SIZE;
use crate::types::CandidateShape;
use rayon::prelude::*;

/// Shift applied to the distance from the center for MID and TAIL, so that at
/// `b = 0` roughly half of a standard normal score distribution sits on each side.
const CENTER_SHIFT: f64 = 0.75;

/// Scores whose spread falls below this are treated as constant.
const MIN_SPREAD: f64 = 1e-12;

impl CandidateShape {
    /// Decodes the numeric type codes: 1 RIGHT, -1 LEFT, 0 MID, -2 TAIL.
    pub fn from_code(code: f64) -> Option<Self> {
        match code {
            c if c == 1.0 => Some(CandidateShape::Right),
            c if c == -1.0 => Some(CandidateShape::Left),
            c if c == 0.0 => Some(CandidateShape::Mid),
            c if c == -2.0 => Some(CandidateShape::Tail),
            _ => None,
        }
    }

    pub fn code(self) -> f64 {
        match self {
            CandidateShape::Right => 1.0,
            CandidateShape::Left => -1.0,
            CandidateShape::Mid => 0.0,
            CandidateShape::Tail => -2.0,
        }
    }

    /// Probability of amputation for a standardized score `z`, group center
    /// `center` and calibration offset `offset`.
    #[inline]
    pub fn probability(self, z: f64, center: f64, offset: f64) -> f64 {
        let t = match self {
            CandidateShape::Right => z,
            CandidateShape::Left => -z,
            CandidateShape::Mid => CENTER_SHIFT - (z - center).abs(),
            CandidateShape::Tail => (z - center).abs() - CENTER_SHIFT,
        };
        sigmoid(t + offset)
    }
}

/// Standard sigmoid function with numerical stability.
#[inline]
pub fn sigmoid(x: f64) -> f64 {
    let x_clamped = x.clamp(-700.0, 700.0);
    1.0 / (1.0 + f64::exp(-x_clamped))
}

/// The rows of one pattern group, ready to be evaluated at any offset.
#[derive(Debug, Clone)]
pub struct CandidateGroup {
    shape: CandidateShape,
    z: Vec<f64>,
    center: f64,
}

impl CandidateGroup {
    /// Standardizes `scores` (sample standard deviation) and records their median.
    /// A constant group maps every row to `z = 0`.
    pub fn new(shape: CandidateShape, scores: &[f64]) -> Self {
        let z = standardize(scores);
        let center = median(&z);
        Self { shape, z, center }
    }

    pub fn len(&self) -> usize {
        self.z.len()
    }

    pub fn is_empty(&self) -> bool {
        self.z.is_empty()
    }

    pub fn center(&self) -> f64 {
        self.center
    }

    /// Mean amputation probability of the group at `offset`.
    pub fn mean_probability(&self, offset: f64) -> f64 {
        if self.z.is_empty() {
            return 0.0;
        }
        // Fixed chunking keeps the summation order, and with it the offset, identical
        // across thread counts.
        let partials: Vec<f64> = self
            .z
            .par_chunks(ROW_BLOCK_SIZE)
            .map(|chunk| {
                chunk
                    .iter()
                    .map(|&z| self.shape.probability(z, self.center, offset))
                    .sum::<f64>()
            })
            .collect();
        partials.iter().sum::<f64>() / self.z.len() as f64
    }

    /// Per-row amputation probabilities at `offset`, in the order the scores were given.
    pub fn probabilities(&self, offset: f64) -> Vec<f64> {
        self.z
            .par_iter()
            .map(|&z| self.shape.probability(z, self.center, offset))
            .collect()
    }
}

fn standardize(scores: &[f64]) -> Vec<f64> {
    let n = scores.len();
    if n < 2 {
        return vec![0.0; n];
    }
    let mean = scores.iter().sum::<f64>() / n as f64;
    let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let sd = variance.sqrt();
    if sd.is_nan() || sd <= MIN_SPREAD {
        return vec![0.0; n];
    }
    scores.iter().map(|s| (s - mean) / sd).collect()
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        0.5 * (sorted[mid - 1] + sorted[mid])
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SHAPES: [CandidateShape; 4] = [
        CandidateShape::Right,
        CandidateShape::Left,
        CandidateShape::Mid,
        CandidateShape::Tail,
    ];

    #[test]
    fn codes_round_trip_and_unknown_codes_are_refused() {
        for shape in SHAPES {
            assert_eq!(CandidateShape::from_code(shape.code()), Some(shape));
        }
        assert_eq!(CandidateShape::from_code(2.0), None);
        assert_eq!(CandidateShape::from_code(0.5), None);
    }

    #[test]
    fn right_and_left_are_mirror_images() {
        for z in [-2.0, -0.3, 0.0, 1.7] {
            let right = CandidateShape::Right.probability(z, 0.0, 0.4);
            let left = CandidateShape::Left.probability(-z, 0.0, 0.4);
            assert_relative_eq!(right, left, epsilon = 1e-15);
        }
        assert!(
            CandidateShape::Right.probability(2.0, 0.0, 0.0)
                > CandidateShape::Right.probability(-2.0, 0.0, 0.0)
        );
    }

    #[test]
    fn mid_peaks_at_the_center_and_tail_at_the_extremes() {
        let center = 0.1;
        let near = center + 0.05;
        let far = center + 3.0;
        assert!(
            CandidateShape::Mid.probability(near, center, 0.0)
                > CandidateShape::Mid.probability(far, center, 0.0)
        );
        assert!(
            CandidateShape::Tail.probability(far, center, 0.0)
                > CandidateShape::Tail.probability(near, center, 0.0)
        );
        // Symmetric around the center.
        assert_relative_eq!(
            CandidateShape::Tail.probability(center - 1.2, center, 0.3),
            CandidateShape::Tail.probability(center + 1.2, center, 0.3),
            epsilon = 1e-15
        );
    }

    #[test]
    fn every_shape_is_bounded_and_increasing_in_the_offset() {
        let scores: Vec<f64> = (0..200).map(|i| ((i * 37) % 101) as f64 / 10.0).collect();
        for shape in SHAPES {
            let group = CandidateGroup::new(shape, &scores);
            let mut previous = 0.0;
            for step in -20..=20 {
                let mean = group.mean_probability(step as f64 * 0.5);
                assert!(mean > previous, "{shape} is not increasing at step {step}");
                assert!((0.0..=1.0).contains(&mean));
                previous = mean;
            }
        }
    }

    #[test]
    fn constant_scores_collapse_to_the_sigmoid_of_the_offset() {
        let group = CandidateGroup::new(CandidateShape::Right, &[3.0; 10]);
        assert_eq!(group.len(), 10);
        assert_relative_eq!(group.mean_probability(0.0), 0.5, epsilon = 1e-15);
        assert_relative_eq!(group.mean_probability(1.0), sigmoid(1.0), epsilon = 1e-15);
    }

    #[test]
    fn standardization_uses_the_sample_deviation() {
        let z = standardize(&[1.0, 2.0, 3.0]);
        assert_relative_eq!(z[0], -1.0, epsilon = 1e-12);
        assert_relative_eq!(z[2], 1.0, epsilon = 1e-12);
        assert_relative_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }
}
