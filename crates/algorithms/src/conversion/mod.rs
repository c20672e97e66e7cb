//! Vector to raster conversion

mod rasterize;

pub use rasterize::{rasterize, Rasterize, RasterizeParams};
