use ampute::{
    AmputeError, AmputeReport, AmputeSettings, Amputation, CandidateShape, Mechanism, PatternSpec,
    SeedStream, ampute,
};
use ampute::patterns::equal_frequencies;
use ndarray::{Array1, Array2, ArrayView1, array};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;

const ROWS: usize = 10_000;
const VARIABLES: usize = 11;

/// Correlated Gaussian columns: a shared factor plus independent noise.
fn correlated_data(rows: usize, cols: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).unwrap();
    let mut data = Array2::zeros((rows, cols));
    for mut row in data.rows_mut() {
        let shared: f64 = rng.sample(normal);
        for value in row.iter_mut() {
            let noise: f64 = rng.sample(normal);
            *value = 0.6 * shared + 0.8 * noise;
        }
    }
    data
}

/// Eleven patterns shaped like an X: pattern `i` removes variables `i` and
/// `P - 1 - i`, so the middle pattern removes a single variable.
fn x_pattern_spec(seed: u64) -> PatternSpec {
    let patterns = Array2::from_shape_fn((VARIABLES, VARIABLES), |(i, j)| {
        if i == j || i + j == VARIABLES - 1 { 0.0 } else { 1.0 }
    });
    let mut rng = StdRng::seed_from_u64(seed);
    let weights = Array2::from_shape_fn((VARIABLES, VARIABLES), |_| rng.gen_range(-1.0..=1.0));
    let codes = Array1::from_shape_fn(VARIABLES, |k| [-2.0, 1.0, 0.0, -1.0][k % 4]);

    PatternSpec::new(patterns, equal_frequencies(VARIABLES))
        .and_then(|spec| spec.with_weights(weights))
        .and_then(|spec| spec.with_shape_codes(codes.view()))
        .unwrap()
}

fn assert_mask_follows_patterns(result: &Amputation, spec: &PatternSpec) {
    for (row, &pattern) in result.assignment.iter().enumerate() {
        for variable in 0..spec.num_variables() {
            let missing = result.mask[[row, variable]];
            assert_eq!(missing, result.amputed[[row, variable]].is_nan());
            if missing {
                assert!(
                    spec.is_amputed(pattern, variable),
                    "row {row} lost variable {variable}, which pattern {pattern} keeps"
                );
            }
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    sum / count as f64
}

/// Mean of `column` over amputed rows minus its mean over kept rows.
fn amputed_minus_kept(column: ArrayView1<f64>, result: &Amputation) -> f64 {
    let amputed_rows = |row: usize| result.mask.row(row).iter().any(|&m| m);
    let amputed = mean((0..column.len()).filter(|&r| amputed_rows(r)).map(|r| column[r]));
    let kept = mean((0..column.len()).filter(|&r| !amputed_rows(r)).map(|r| column[r]));
    amputed - kept
}

#[test]
fn x_patterns_ampute_half_the_rows_under_every_mechanism() {
    let data = correlated_data(ROWS, VARIABLES, 1);
    let spec = x_pattern_spec(2);

    for mechanism in [Mechanism::Mcar, Mechanism::Mar, Mechanism::Mnar] {
        let settings = AmputeSettings::new(0.5, mechanism);
        let result = ampute(data.view(), &spec, &settings, &SeedStream::new(3)).unwrap();

        assert_eq!(result.amputed.dim(), data.dim());
        assert_eq!(result.mask.dim(), data.dim());
        assert!(
            result.amputed_row_count.abs_diff(5000) <= 150,
            "{mechanism}: {} rows amputed",
            result.amputed_row_count
        );
        assert_mask_follows_patterns(&result, &spec);
        assert_eq!(
            result.report.realized_proportion,
            result.amputed_row_count as f64 / ROWS as f64
        );
    }
}

#[test]
fn scoring_flags_do_not_move_the_row_proportion() {
    let data = correlated_data(ROWS, VARIABLES, 4);
    let spec = x_pattern_spec(5);

    for (standardized, continuous) in [(false, true), (true, false), (false, false)] {
        let mut settings = AmputeSettings::new(0.5, Mechanism::Mar);
        settings.standardized = standardized;
        settings.continuous = continuous;
        let result = ampute(data.view(), &spec, &settings, &SeedStream::new(6)).unwrap();
        assert!(
            result.amputed_row_count.abs_diff(5000) <= 150,
            "standardized={standardized} continuous={continuous}: {} rows",
            result.amputed_row_count
        );
    }
}

#[test]
fn cell_mode_hits_the_requested_share_of_cells() {
    let data = correlated_data(ROWS, VARIABLES, 7);
    let spec = x_pattern_spec(8);
    let prop = 0.5 / VARIABLES as f64;

    for mechanism in [Mechanism::Mcar, Mechanism::Mar, Mechanism::Mnar] {
        let mut settings = AmputeSettings::new(prop, mechanism);
        settings.by_cases = false;
        let result = ampute(data.view(), &spec, &settings, &SeedStream::new(9)).unwrap();

        assert!(
            result.amputed_cell_count.abs_diff(5000) <= 300,
            "{mechanism}: {} cells amputed",
            result.amputed_cell_count
        );
        assert_mask_follows_patterns(&result, &spec);
        assert!((result.report.realized_proportion - prop).abs() < 0.003);
    }
}

#[test]
fn cell_mode_reports_an_unreachable_proportion() {
    let data = correlated_data(2000, VARIABLES, 10);
    let spec = x_pattern_spec(11);
    let mut settings = AmputeSettings::new(0.5, Mechanism::Mar);
    settings.by_cases = false;

    match ampute(data.view(), &spec, &settings, &SeedStream::new(12)) {
        Err(AmputeError::InfeasibleProportion {
            requested,
            achievable,
        }) => {
            assert_eq!(requested, 0.5);
            assert!((achievable - 21.0 / 121.0).abs() < 0.01, "achievable {achievable}");
        }
        other => panic!("expected an infeasible proportion, got {other:?}"),
    }
}

#[test]
fn default_patterns_remove_exactly_the_assigned_variable() {
    let data = correlated_data(3000, 4, 13);
    let spec = PatternSpec::one_per_variable(4).unwrap();
    let result = ampute(
        data.view(),
        &spec,
        &AmputeSettings::new(0.4, Mechanism::Mar),
        &SeedStream::new(14),
    )
    .unwrap();

    for (row, &pattern) in result.assignment.iter().enumerate() {
        let missing: Vec<usize> = (0..4).filter(|&v| result.mask[[row, v]]).collect();
        assert!(missing.is_empty() || missing == vec![pattern]);
    }
    assert_eq!(result.amputed_row_count, result.amputed_cell_count);
    assert!(result.amputed_row_count.abs_diff(1200) <= 120);
}

#[test]
fn patterns_without_zeros_leave_their_rows_untouched() {
    let data = correlated_data(4000, 3, 15);
    let spec = PatternSpec::new(
        array![[1.0, 1.0, 1.0], [0.0, 1.0, 1.0]],
        array![0.5, 0.5],
    )
    .unwrap();
    let result = ampute(
        data.view(),
        &spec,
        &AmputeSettings::new(0.5, Mechanism::Mnar),
        &SeedStream::new(16),
    )
    .unwrap();

    let full_rows = result.assignment.iter().filter(|&&k| k == 0).count();
    for (row, &pattern) in result.assignment.iter().enumerate() {
        if pattern == 0 {
            assert!(result.mask.row(row).iter().all(|&m| !m));
        }
    }
    let expected = 0.5 * (4000 - full_rows) as f64;
    assert!((result.amputed_row_count as f64 - expected).abs() <= 150.0);
    assert_eq!(result.report.patterns[0].amputed_rows, 0);
    assert_eq!(result.report.patterns[0].target_rate, 0.0);
}

#[test]
fn a_fixed_seed_reproduces_the_run() {
    let data = correlated_data(5000, 6, 17);
    let spec = PatternSpec::one_per_variable(6).unwrap();
    let settings = AmputeSettings::new(0.3, Mechanism::Mnar);

    let first = ampute(data.view(), &spec, &settings, &SeedStream::new(18)).unwrap();
    let second = ampute(data.view(), &spec, &settings, &SeedStream::new(18)).unwrap();
    let other = ampute(data.view(), &spec, &settings, &SeedStream::new(19)).unwrap();

    assert_eq!(first.assignment, second.assignment);
    assert_eq!(first.mask, second.mask);
    assert_eq!(first.report, second.report);
    assert_ne!(first.mask, other.mask);
}

#[test]
fn right_and_left_shapes_push_missingness_to_opposite_ends() {
    let data = correlated_data(5000, 2, 20);
    let patterns = array![[1.0, 0.0]];
    let settings = AmputeSettings::new(0.5, Mechanism::Mar);

    let right = PatternSpec::new(patterns, array![1.0]).unwrap();
    let result = ampute(data.view(), &right, &settings, &SeedStream::new(21)).unwrap();
    assert!(amputed_minus_kept(data.column(0), &result) > 0.5);

    let left = right.with_shapes(vec![CandidateShape::Left]).unwrap();
    let result = ampute(data.view(), &left, &settings, &SeedStream::new(21)).unwrap();
    assert!(amputed_minus_kept(data.column(0), &result) < -0.5);
}

#[test]
fn mnar_depends_on_the_values_it_removes() {
    let mut rng = StdRng::seed_from_u64(22);
    let normal = Normal::new(0.0, 1.0).unwrap();
    let data = Array2::from_shape_fn((5000, 2), |_| rng.sample(normal));
    let spec = PatternSpec::new(array![[1.0, 0.0]], array![1.0]).unwrap();

    let result = ampute(
        data.view(),
        &spec,
        &AmputeSettings::new(0.5, Mechanism::Mnar),
        &SeedStream::new(23),
    )
    .unwrap();

    assert!(amputed_minus_kept(data.column(1), &result) > 0.5);
    // The kept column is independent of the removed one.
    assert!(amputed_minus_kept(data.column(0), &result).abs() < 0.15);
}

#[test]
fn mid_and_tail_shapes_split_on_distance_from_the_center() {
    let mut rng = StdRng::seed_from_u64(24);
    let normal = Normal::new(0.0, 1.0).unwrap();
    let data = Array2::from_shape_fn((5000, 2), |_| rng.sample(normal));
    let distance = data.column(0).mapv(f64::abs);
    let settings = AmputeSettings::new(0.5, Mechanism::Mar);

    let mid = PatternSpec::new(array![[1.0, 0.0]], array![1.0])
        .and_then(|spec| spec.with_shapes(vec![CandidateShape::Mid]))
        .unwrap();
    let result = ampute(data.view(), &mid, &settings, &SeedStream::new(25)).unwrap();
    assert!(amputed_minus_kept(distance.view(), &result) < -0.15);

    let tail = mid.with_shapes(vec![CandidateShape::Tail]).unwrap();
    let result = ampute(data.view(), &tail, &settings, &SeedStream::new(25)).unwrap();
    assert!(amputed_minus_kept(distance.view(), &result) > 0.15);
}

#[test]
fn report_serializes_to_toml() {
    let data = correlated_data(1000, 3, 26);
    let spec = PatternSpec::one_per_variable(3).unwrap();
    let result = ampute(
        data.view(),
        &spec,
        &AmputeSettings::new(0.25, Mechanism::Mar),
        &SeedStream::new(27),
    )
    .unwrap();

    let text = toml::to_string_pretty(&result.report).unwrap();
    assert!(text.contains("mechanism = \"MAR\""));
    let back: AmputeReport = toml::from_str(&text).unwrap();
    assert_eq!(back.amputed_row_count, result.amputed_row_count);
    assert_eq!(back.patterns.len(), 3);
}
