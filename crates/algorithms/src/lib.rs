//! # MOPST Algorithms
//!
//! Native processing engines used by the MOPST scoring pipeline.
//!
//! ## Categories
//!
//! - **table**: attribute join, field calculator, text-to-float
//! - **conversion**: polygon rasterization onto a template grid
//! - **algebra**: formula-driven raster calculator
//! - **expression**: the arithmetic formula language shared by the above

pub mod algebra;
pub mod conversion;
pub mod expression;
pub mod table;

mod maybe_rayon;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::algebra::{raster_calculator, RasterCalculator, RasterCalculatorParams};
    pub use crate::conversion::{rasterize, Rasterize, RasterizeParams};
    pub use crate::expression::Expression;
    pub use crate::table::{
        field_calculator, join_attributes, text_to_float, FieldCalculator, FieldCalculatorParams,
        JoinAttributes, JoinOutput, JoinParams,
    };
    pub use mopst_core::prelude::*;
}
