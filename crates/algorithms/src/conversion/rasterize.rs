//! Burn a numeric attribute of polygon features into a grid
//!
//! The output grid copies the template raster's transform and shape. A
//! cell takes a feature's value when the cell centre lies strictly inside
//! the feature's polygon(s); features are burned in table order, so later
//! features overwrite earlier ones where they overlap. Cells touched by no
//! feature keep `init_value`. Features whose value is null, and features
//! without areal geometry, are skipped.

use crate::maybe_rayon::*;
use geo::{BoundingRect, Contains, Geometry, MultiPolygon, Point, Polygon};
use mopst_core::raster::Raster;
use mopst_core::vector::FeatureCollection;
use mopst_core::{Algorithm, Error, GeoTransform, Result};

/// Parameters for [`rasterize`]
#[derive(Debug, Clone)]
pub struct RasterizeParams {
    /// Attribute to burn
    pub field: String,
    /// Value of cells no feature covers
    pub init_value: f64,
}

impl RasterizeParams {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            init_value: 0.0,
        }
    }
}

/// Rasterize algorithm; input is the feature table and the template grid
#[derive(Debug, Clone, Default)]
pub struct Rasterize;

impl Algorithm for Rasterize {
    type Input = (FeatureCollection, Raster<f64>);
    type Output = Raster<f64>;
    type Params = RasterizeParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Rasterize"
    }

    fn description(&self) -> &'static str {
        "Burn a numeric attribute of polygon features into a template grid"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        rasterize(&input.0, &input.1, &params)
    }
}

fn collect_polygons(geom: &Geometry<f64>, out: &mut Vec<Polygon<f64>>) {
    match geom {
        Geometry::Polygon(p) => out.push(p.clone()),
        Geometry::MultiPolygon(mp) => out.extend(mp.0.iter().cloned()),
        Geometry::Rect(r) => out.push(r.to_polygon()),
        Geometry::Triangle(t) => out.push(t.to_polygon()),
        Geometry::GeometryCollection(gc) => {
            for member in gc.0.iter() {
                collect_polygons(member, out);
            }
        }
        _ => {}
    }
}

/// Row/column window covering a bounding box, clamped to the grid.
/// Rotated grids get the whole extent.
fn pixel_window(
    gt: &GeoTransform,
    rows: usize,
    cols: usize,
    (min_x, min_y, max_x, max_y): (f64, f64, f64, f64),
) -> (std::ops::Range<usize>, std::ops::Range<usize>) {
    if gt.row_rotation != 0.0 || gt.col_rotation != 0.0 {
        return (0..rows, 0..cols);
    }

    let to_col = |x: f64| (x - gt.origin_x) / gt.pixel_width;
    let to_row = |y: f64| (y - gt.origin_y) / gt.pixel_height;

    let (c0, c1) = (to_col(min_x), to_col(max_x));
    let (r0, r1) = (to_row(min_y), to_row(max_y));

    let clamp = |lo: f64, hi: f64, n: usize| {
        let start = lo.min(hi).floor().max(0.0) as usize;
        let end = (lo.max(hi).ceil().max(0.0) as usize).min(n);
        start.min(end)..end
    };

    (clamp(r0, r1, rows), clamp(c0, c1, cols))
}

/// Burn `params.field` of `table` into a grid shaped like `template`.
///
/// # Errors
/// - template has a zero pixel size
/// - the non-empty table lacks the field
pub fn rasterize(
    table: &FeatureCollection,
    template: &Raster<f64>,
    params: &RasterizeParams,
) -> Result<Raster<f64>> {
    let gt = *template.transform();
    if gt.pixel_width == 0.0 || gt.pixel_height == 0.0 {
        return Err(Error::InvalidParameter {
            name: "template",
            value: format!("{:?}", template.pixel_size()),
            reason: "pixel size must be non-zero".into(),
        });
    }
    if !table.is_empty() && !table.has_field(&params.field) {
        return Err(Error::FieldNotFound {
            field: params.field.clone(),
            available: table.fields().to_vec(),
        });
    }

    let (rows, cols) = template.shape();
    let mut output = template.with_same_meta::<f64>(rows, cols);
    output.data_mut().fill(params.init_value);

    let mut skipped = 0usize;
    for feature in table.iter() {
        let value = feature
            .get_property(&params.field)
            .and_then(|v| v.to_real());
        let mut polygons = Vec::new();
        if let Some(geom) = &feature.geometry {
            collect_polygons(geom, &mut polygons);
        }

        let (Some(value), false) = (value, polygons.is_empty()) else {
            skipped += 1;
            continue;
        };

        let shape = MultiPolygon::new(polygons);
        let Some(rect) = shape.bounding_rect() else {
            continue;
        };
        let (row_range, col_range) = pixel_window(
            &gt,
            rows,
            cols,
            (rect.min().x, rect.min().y, rect.max().x, rect.max().y),
        );

        let hits: Vec<(usize, usize)> = row_range
            .into_par_iter()
            .flat_map(|row| {
                col_range
                    .clone()
                    .filter(|&col| {
                        let (x, y) = gt.pixel_to_geo(col, row);
                        shape.contains(&Point::new(x, y))
                    })
                    .map(|col| (row, col))
                    .collect::<Vec<_>>()
            })
            .collect();

        let data = output.data_mut();
        for (row, col) in hits {
            data[(row, col)] = value;
        }
    }

    if skipped > 0 {
        tracing::debug!(field = %params.field, skipped, "features without value or areal geometry");
    }

    Ok(output)
}
