//! Run configuration, stored as TOML.
//!
//! ```toml
//! seed = 42
//! shapes = ["RIGHT", "MID", -2]
//!
//! [ampute]
//! prop = 0.5
//! mechanism = "MAR"
//! by_cases = true
//!
//! [ampute.calibration]
//! max_iterations = 200
//! ```

use crate::types::{AmputeSettings, CandidateShape, ValidationError};
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;
use thiserror::Error;

/// Seed used when a configuration does not name one.
pub const DEFAULT_SEED: u64 = 42;

fn default_seed() -> u64 {
    DEFAULT_SEED
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// One candidate shape per pattern, by name or by numeric code; RIGHT for
    /// every pattern when absent.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "shapes_from_names_or_codes"
    )]
    pub shapes: Option<Vec<CandidateShape>>,
    #[serde(default)]
    pub ampute: AmputeSettings,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            shapes: None,
            ampute: AmputeSettings::default(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ShapeEntry {
    Name(CandidateShape),
    Code(f64),
}

fn shapes_from_names_or_codes<'de, D>(
    deserializer: D,
) -> Result<Option<Vec<CandidateShape>>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries: Option<Vec<ShapeEntry>> = Option::deserialize(deserializer)?;
    entries
        .map(|entries| {
            entries
                .into_iter()
                .enumerate()
                .map(|(pattern, entry)| match entry {
                    ShapeEntry::Name(shape) => Ok(shape),
                    ShapeEntry::Code(code) => CandidateShape::from_code(code).ok_or_else(|| {
                        de::Error::custom(ValidationError::UnknownShapeCode { pattern, code })
                    }),
                })
                .collect::<Result<Vec<_>, D::Error>>()
        })
        .transpose()
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read or write configuration file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML configuration: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize configuration to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
    #[error("Configuration is invalid: {0}")]
    Invalid(#[from] ValidationError),
}

impl RunConfig {
    /// Parses and validates a configuration.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: RunConfig = toml::from_str(text)?;
        config.ampute.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}
