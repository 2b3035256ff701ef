#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]

//! Synthetic missing data for evaluating imputation.
//!
//! Given a complete N x P matrix, `ampute` removes values following a chosen
//! mechanism (MCAR, MAR or MNAR), a set of missingness patterns with relative
//! frequencies, and a target proportion measured over rows or over cells.

pub mod amputer;
pub mod calibrate;
pub mod candidate;
pub mod config;
pub mod io;
pub mod patterns;
pub mod pipeline;
pub mod rng;
pub mod score;
pub mod types;

pub use patterns::PatternSpec;
pub use pipeline::{AmputeReport, Amputation, PatternSummary, ampute};
pub use rng::SeedStream;
pub use types::{AmputeError, AmputeSettings, CalibrationLimits, CandidateShape, Mechanism, ValidationError};
