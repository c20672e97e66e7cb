//! # MOPST Engine
//!
//! Weighted raster accumulation for pressure and opportunity scoring.
//!
//! A run scores landcover sensitivity per season, weights it once per
//! factor raster, scales the weighted layers per scenario and sums the
//! contributions of all factors into four rasters per scenario:
//! pressure-summer, opportunity-summer, pressure-winter and
//! opportunity-winter. The unscaled baseline is always produced.
//!
//! ## Example
//!
//! ```ignore
//! use mopst_engine::{Feedback, NativeToolbox, Pipeline, RunConfig, RunStatus};
//!
//! let inputs = RunConfig::load("run.yaml")?.load_inputs()?;
//! let mut feedback = Feedback::new();
//! match Pipeline::new(&NativeToolbox, &mut feedback).run(&inputs)? {
//!     RunStatus::Completed(result) => println!("{} rasters", result.layers.len()),
//!     RunStatus::Cancelled => println!("cancelled"),
//! }
//! ```

pub mod config;
pub mod error;
pub mod factor;
pub mod feedback;
pub mod pipeline;
pub mod publish;
pub mod scenario;
pub mod sensitivity;
pub mod toolbox;
pub mod weights;

pub use config::RunConfig;
pub use error::{Error, Interrupt, Result};
pub use factor::{FactorAccumulator, FactorPlan};
pub use feedback::{CancelToken, Feedback};
pub use pipeline::{plan_factors, step_count, Pipeline, PipelineInputs, RunStatus};
pub use publish::{LayerGroup, OutputLayout, ResultPublisher, RunResult};
pub use scenario::{
    Quantity, QuantityLayers, ScenarioAccumulator, ScenarioName, ScenarioOutput, ScenarioSet,
    BASELINE,
};
pub use sensitivity::{FieldNames, SensitivityInputs, SensitivityLayers, SensitivityScorer};
pub use toolbox::{NativeToolbox, Toolbox};
pub use weights::{Coefficients, FactorWeight, ScenarioWeight, WeightError, WeightTable};
