//! Error types for the scoring pipeline

use std::path::PathBuf;
use thiserror::Error;

use crate::weights::WeightError;

/// Errors that abort a pipeline run
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Weight(#[from] WeightError),

    #[error("{step} failed: {source}")]
    Collaborator {
        step: String,
        #[source]
        source: mopst_core::Error,
    },

    #[error("cannot read input {path}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: mopst_core::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot write {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: mopst_core::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("no factor rasters given")]
    NoFactors,

    #[error("accumulator {scenario}/{quantity} folded {folded} factor(s), expected {expected}")]
    IncompleteAccumulation {
        scenario: String,
        quantity: String,
        folded: usize,
        expected: usize,
    },
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Why a stage stopped early.
///
/// Cancellation is carried alongside real failures so `?` unwinds both;
/// [`Pipeline::run`](crate::Pipeline::run) turns it back into a status.
#[derive(Error, Debug)]
pub enum Interrupt {
    #[error("cancelled")]
    Cancelled,
    #[error(transparent)]
    Failed(#[from] Error),
}

impl From<WeightError> for Interrupt {
    fn from(e: WeightError) -> Self {
        Interrupt::Failed(e.into())
    }
}
