//! # MOPST Core
//!
//! Core types, traits and I/O shared by the MOPST crates.
//!
//! This crate provides:
//! - `Raster<T>`: generic georeferenced grid
//! - `GeoTransform`: affine pixel/world mapping
//! - `FeatureCollection`: attribute tables with optional geometry
//! - GeoTIFF and GeoJSON readers/writers

pub mod error;
pub mod io;
pub mod raster;
pub mod vector;

pub use error::{Error, Result};
pub use raster::{GeoTransform, Raster, RasterElement};
pub use vector::{AttributeValue, Feature, FeatureCollection};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, Raster, RasterElement};
    pub use crate::vector::{AttributeValue, Feature, FeatureCollection};
    pub use crate::Algorithm;
}

/// Common shape of the processing engines in `mopst-algorithms`.
///
/// Engines are pure functions from an input and parameters to an output.
pub trait Algorithm {
    /// Input type for the algorithm
    type Input;
    /// Output type for the algorithm
    type Output;
    /// Parameters controlling algorithm behavior
    type Params;
    /// Error type for algorithm execution
    type Error: std::error::Error;

    /// Returns the algorithm name
    fn name(&self) -> &'static str;

    /// Returns a description of what the algorithm does
    fn description(&self) -> &'static str;

    /// Execute the algorithm
    fn execute(&self, input: Self::Input, params: Self::Params) -> std::result::Result<Self::Output, Self::Error>;
}
