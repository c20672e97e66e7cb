//! I/O for the raster and vector formats the pipeline reads and writes

mod geojson_io;
mod geotiff;

pub use geojson_io::{read_geojson, read_geojson_from_str};
pub use geotiff::{read_geotiff, read_geotiff_from_buffer, write_geotiff, write_geotiff_to_buffer};
