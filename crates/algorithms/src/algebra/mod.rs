//! Raster algebra
//!
//! Per-cell arithmetic over one or more aligned rasters, with operands
//! bound to the letters `A`, `B`, ... in the order they are supplied.

mod raster_calculator;

pub use raster_calculator::{operand_name, raster_calculator, RasterCalculator, RasterCalculatorParams};
