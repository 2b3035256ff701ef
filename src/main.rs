// ========================================================================================
//
//                          Command-Line Front End for Amputation
//
// ========================================================================================
//
// Reads a complete data matrix and the pattern inputs from delimited text files,
// runs the amputation pipeline once, and writes three files into the output
// directory: the amputed data, the 0/1 missingness mask and a TOML run summary.
//
// Settings are resolved in order: built-in defaults, then the optional TOML
// configuration, then command-line flags.

use ampute::config::RunConfig;
use ampute::io::{read_matrix, read_vector, write_mask, write_matrix, write_text};
use ampute::patterns::equal_frequencies;
use ampute::{Mechanism, PatternSpec, SeedStream, ampute};
use clap::{Parser, ValueEnum};
use std::fs;
use std::path::PathBuf;
use std::process;
use std::time::Instant;

#[derive(Clone, Copy, Debug, ValueEnum)]
enum MechanismCli {
    Mcar,
    Mar,
    Mnar,
}

impl From<MechanismCli> for Mechanism {
    fn from(value: MechanismCli) -> Self {
        match value {
            MechanismCli::Mcar => Mechanism::Mcar,
            MechanismCli::Mar => Mechanism::Mar,
            MechanismCli::Mnar => Mechanism::Mnar,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "ampute",
    version,
    about = "Introduce missing values into a complete numeric dataset under MCAR, MAR or MNAR."
)]
struct Args {
    /// Complete data matrix (comma-separated, or tab-separated for .tsv), no header.
    #[arg(long)]
    data: PathBuf,

    /// K x P pattern matrix; 1 keeps a variable, 0 amputes it. Defaults to one
    /// pattern per variable.
    #[arg(long)]
    patterns: Option<PathBuf>,

    /// K relative pattern frequencies. Defaults to equal frequencies.
    #[arg(long)]
    freq: Option<PathBuf>,

    /// K x P weight matrix for MAR / MNAR scores.
    #[arg(long)]
    weights: Option<PathBuf>,

    /// K candidate type codes: 1 RIGHT, -1 LEFT, 0 MID, -2 TAIL.
    #[arg(long)]
    types: Option<PathBuf>,

    /// TOML run configuration.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Target proportion of missingness, strictly between 0 and 1.
    #[arg(long)]
    prop: Option<f64>,

    #[arg(long, value_enum)]
    mechanism: Option<MechanismCli>,

    /// Run seed. Capped at i64::MAX so it fits in the TOML summary.
    #[arg(long, value_parser = clap::value_parser!(u64).range(..=i64::MAX as u64))]
    seed: Option<u64>,

    /// Measure the proportion over cells instead of rows.
    #[arg(long)]
    by_cells: bool,

    /// Score the raw columns instead of standardized ones.
    #[arg(long)]
    no_standardize: bool,

    /// Score mid-rank quantiles instead of raw values.
    #[arg(long)]
    discrete: bool,

    /// Directory receiving amputed_data, nan_mask and summary.toml.
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Err(e) = run(args) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let start_time = Instant::now();

    // --- Phase 1: Settings ---
    let mut config = match &args.config {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    if let Some(prop) = args.prop {
        config.ampute.prop = prop;
    }
    if let Some(mechanism) = args.mechanism {
        config.ampute.mechanism = mechanism.into();
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if args.by_cells {
        config.ampute.by_cases = false;
    }
    if args.no_standardize {
        config.ampute.standardized = false;
    }
    if args.discrete {
        config.ampute.continuous = false;
    }

    // --- Phase 2: Inputs ---
    let data = read_matrix(&args.data)?;
    eprintln!(
        "> Loaded {} rows x {} columns from {}",
        data.nrows(),
        data.ncols(),
        args.data.display()
    );

    let mut spec = match &args.patterns {
        Some(path) => {
            let patterns = read_matrix(path)?;
            let frequencies = match &args.freq {
                Some(freq_path) => read_vector(freq_path)?,
                None => equal_frequencies(patterns.nrows()),
            };
            PatternSpec::new(patterns, frequencies)?
        }
        None => match &args.freq {
            Some(freq_path) => {
                let defaults = PatternSpec::one_per_variable(data.ncols())?;
                PatternSpec::new(defaults.patterns().to_owned(), read_vector(freq_path)?)?
            }
            None => PatternSpec::one_per_variable(data.ncols())?,
        },
    };
    if let Some(path) = &args.weights {
        spec = spec.with_weights(read_matrix(path)?)?;
    }
    if let Some(path) = &args.types {
        spec = spec.with_shape_codes(read_vector(path)?.view())?;
    } else if let Some(shapes) = config.shapes.clone() {
        spec = spec.with_shapes(shapes)?;
    }

    // --- Phase 3: Amputation ---
    let result = ampute(
        data.view(),
        &spec,
        &config.ampute,
        &SeedStream::new(config.seed),
    )?;

    // --- Phase 4: Outputs ---
    // The summary is rendered before any file is written, so a failure leaves nothing behind.
    let summary = toml::to_string_pretty(&result.report)?;
    fs::create_dir_all(&args.out_dir)?;
    let extension = match args.data.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => "tsv",
        _ => "csv",
    };
    let data_path = args.out_dir.join(format!("amputed_data.{extension}"));
    let mask_path = args.out_dir.join(format!("nan_mask.{extension}"));
    let summary_path = args.out_dir.join("summary.toml");

    write_matrix(&data_path, result.amputed.view())?;
    write_mask(&mask_path, result.mask.view())?;
    write_text(&summary_path, &summary)?;

    eprintln!(
        "> Amputed {} rows and {} cells; outputs written to {} in {:.2?}",
        result.amputed_row_count,
        result.amputed_cell_count,
        args.out_dir.display(),
        start_time.elapsed()
    );
    Ok(())
}
