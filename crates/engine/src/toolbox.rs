//! Processing engines the pipeline delegates to
//!
//! The scoring pipeline never touches attribute tables or cell values
//! itself; every transformation goes through a [`Toolbox`].

use mopst_algorithms::prelude::*;

pub use mopst_algorithms::table::{JoinOutput, JoinParams};

/// Join, field-calculation, rasterization and raster-algebra engines
pub trait Toolbox {
    /// Convert a textual attribute to float; unparsable values become null
    fn convert_to_numeric(&self, table: &FeatureCollection, field: &str) -> Result<FeatureCollection>;

    /// Join `right` onto `left` by key
    fn join_by_key(
        &self,
        left: &FeatureCollection,
        right: &FeatureCollection,
        params: &JoinParams,
    ) -> Result<JoinOutput>;

    /// Add a float field computed from `formula`
    fn add_computed_field(
        &self,
        table: &FeatureCollection,
        field_name: &str,
        formula: &str,
    ) -> Result<FeatureCollection>;

    /// Burn `field` into a grid matching `template`
    fn rasterize_field(
        &self,
        table: &FeatureCollection,
        field: &str,
        template: &Raster<f64>,
    ) -> Result<Raster<f64>>;

    /// Evaluate a per-cell expression with operands bound to `A`, `B`, ...
    fn raster_algebra(&self, expression: &str, operands: &[&Raster<f64>]) -> Result<Raster<f64>>;
}

/// [`Toolbox`] backed by `mopst-algorithms`
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeToolbox;

impl Toolbox for NativeToolbox {
    fn convert_to_numeric(&self, table: &FeatureCollection, field: &str) -> Result<FeatureCollection> {
        text_to_float(table, field)
    }

    fn join_by_key(
        &self,
        left: &FeatureCollection,
        right: &FeatureCollection,
        params: &JoinParams,
    ) -> Result<JoinOutput> {
        join_attributes(left, right, params)
    }

    fn add_computed_field(
        &self,
        table: &FeatureCollection,
        field_name: &str,
        formula: &str,
    ) -> Result<FeatureCollection> {
        let params = FieldCalculatorParams {
            field_name: field_name.to_string(),
            formula: formula.to_string(),
        };
        field_calculator(table, &params)
    }

    fn rasterize_field(
        &self,
        table: &FeatureCollection,
        field: &str,
        template: &Raster<f64>,
    ) -> Result<Raster<f64>> {
        rasterize(table, template, &RasterizeParams::new(field))
    }

    fn raster_algebra(&self, expression: &str, operands: &[&Raster<f64>]) -> Result<Raster<f64>> {
        raster_calculator(expression, operands)
    }
}
