//! Formula-driven raster calculator
//!
//! Evaluates an arithmetic formula such as `"A*0.75"` or `"A+B"` cell by
//! cell. Cells where a referenced operand is NaN or no-data, or where the
//! formula divides by zero, come out as NaN.

use crate::expression::Expression;
use crate::maybe_rayon::*;
use mopst_core::raster::Raster;
use mopst_core::{Algorithm, Error, Result};
use ndarray::Array2;

const MAX_OPERANDS: usize = 26;

/// Letter bound to the operand at `index` (0 → `A`)
pub fn operand_name(index: usize) -> Option<char> {
    (index < MAX_OPERANDS).then(|| (b'A' + index as u8) as char)
}

/// Parameters for [`RasterCalculator`]
#[derive(Debug, Clone)]
pub struct RasterCalculatorParams {
    pub formula: String,
}

/// Raster calculator algorithm
#[derive(Debug, Clone, Default)]
pub struct RasterCalculator;

impl Algorithm for RasterCalculator {
    type Input = Vec<Raster<f64>>;
    type Output = Raster<f64>;
    type Params = RasterCalculatorParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "RasterCalculator"
    }

    fn description(&self) -> &'static str {
        "Evaluate a per-cell arithmetic formula over operands A, B, ..."
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        let operands: Vec<&Raster<f64>> = input.iter().collect();
        raster_calculator(&params.formula, &operands)
    }
}

/// Evaluate `formula` over `operands`, bound to `A`, `B`, ... in order.
///
/// The output takes the first operand's grid and has NaN as no-data.
///
/// # Errors
/// - no operands, or more than 26
/// - formula fails to parse or names an operand that was not supplied
/// - operands differ in shape or geotransform
pub fn raster_calculator(formula: &str, operands: &[&Raster<f64>]) -> Result<Raster<f64>> {
    let first = *operands
        .first()
        .ok_or_else(|| Error::Algorithm("raster calculator needs at least one operand".into()))?;
    if operands.len() > MAX_OPERANDS {
        return Err(Error::InvalidParameter {
            name: "operands",
            value: operands.len().to_string(),
            reason: format!("at most {} operands are supported", MAX_OPERANDS),
        });
    }

    let expr = Expression::parse(formula)?;

    // slot -> operand index
    let bindings: Vec<usize> = expr
        .variables()
        .iter()
        .map(|name| {
            (0..operands.len())
                .find(|&i| operand_name(i).is_some_and(|c| name.len() == 1 && name.starts_with(c)))
                .ok_or_else(|| {
                    Error::Expression(format!(
                        "operand '{}' in '{}' was not supplied ({} operand(s) given)",
                        name,
                        formula,
                        operands.len()
                    ))
                })
        })
        .collect::<Result<_>>()?;

    for (index, raster) in operands.iter().enumerate().skip(1) {
        first.ensure_same_shape(raster)?;
        if !first.same_grid(raster) {
            return Err(Error::GridMismatch { index });
        }
    }

    let (rows, cols) = first.shape();

    let data: Vec<f64> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut slots = vec![None; bindings.len()];
            let mut row_data = vec![f64::NAN; cols];

            for (col, out) in row_data.iter_mut().enumerate() {
                for (slot, &operand) in slots.iter_mut().zip(&bindings) {
                    let raster = operands[operand];
                    let v = unsafe { raster.get_unchecked(row, col) };
                    *slot = (!raster.is_nodata(v)).then_some(v);
                }
                if let Some(v) = expr.evaluate(&slots) {
                    *out = v;
                }
            }
            row_data
        })
        .collect();

    let mut output = first.with_same_meta::<f64>(rows, cols);
    output.set_nodata(Some(f64::NAN));
    *output.data_mut() =
        Array2::from_shape_vec((rows, cols), data).map_err(|e| Error::Other(e.to_string()))?;

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mopst_core::GeoTransform;

    fn make_band(value: f64) -> Raster<f64> {
        let mut r = Raster::filled(4, 5, value);
        r.set_transform(GeoTransform::new(0.0, 4.0, 1.0, -1.0));
        r
    }

    #[test]
    fn test_scalar_multiply() {
        let a = make_band(10.0);
        let result = raster_calculator("A*2", &[&a]).unwrap();
        assert!((result.get(2, 3).unwrap() - 20.0).abs() < 1e-12);
        assert!(result.same_grid(&a));
    }

    #[test]
    fn test_sum_of_two_operands() {
        let a = make_band(3.0);
        let b = make_band(7.5);
        let result = raster_calculator("A+B", &[&a, &b]).unwrap();
        assert!((result.get(0, 0).unwrap() - 10.5).abs() < 1e-12);
    }

    #[test]
    fn test_nan_and_nodata_propagate() {
        let mut a = make_band(1.0);
        a.set(0, 0, f64::NAN).unwrap();
        let mut b = make_band(2.0);
        b.set_nodata(Some(-9999.0));
        b.set(1, 1, -9999.0).unwrap();

        let result = raster_calculator("A+B", &[&a, &b]).unwrap();
        assert!(result.get(0, 0).unwrap().is_nan());
        assert!(result.get(1, 1).unwrap().is_nan());
        assert!((result.get(2, 2).unwrap() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_unreferenced_operand_nodata_is_ignored() {
        let a = make_band(5.0);
        let mut b = make_band(1.0);
        b.set(0, 0, f64::NAN).unwrap();

        let result = raster_calculator("A*3", &[&a, &b]).unwrap();
        assert!((result.get(0, 0).unwrap() - 15.0).abs() < 1e-12);
    }

    #[test]
    fn test_missing_operand_error() {
        let a = make_band(1.0);
        assert!(raster_calculator("A+B", &[&a]).is_err());
        assert!(raster_calculator("A+NIR", &[&a]).is_err());
    }

    #[test]
    fn test_shape_mismatch_error() {
        let a = make_band(1.0);
        let b = Raster::filled(2, 2, 1.0);
        assert!(matches!(
            raster_calculator("A+B", &[&a, &b]),
            Err(Error::SizeMismatch { .. })
        ));
    }

    #[test]
    fn test_shifted_grid_error() {
        let a = make_band(1.0);
        let mut b = make_band(1.0);
        b.set_transform(GeoTransform::new(100.0, 4.0, 1.0, -1.0));
        assert!(matches!(
            raster_calculator("A+B", &[&a, &b]),
            Err(Error::GridMismatch { index: 1 })
        ));
        // the check applies even when B is not referenced
        assert!(raster_calculator("A*2", &[&a, &b]).is_err());
    }

    #[test]
    fn test_no_operands_error() {
        assert!(raster_calculator("1+1", &[]).is_err());
    }

    #[test]
    fn test_algorithm_trait() {
        let calc = RasterCalculator;
        let result = calc
            .execute(
                vec![make_band(2.0), make_band(4.0)],
                RasterCalculatorParams { formula: "(A+B)/2".into() },
            )
            .unwrap();
        assert!((result.get(1, 1).unwrap() - 3.0).abs() < 1e-12);
        assert_eq!(calc.name(), "RasterCalculator");
    }

    #[test]
    fn test_operand_names() {
        assert_eq!(operand_name(0), Some('A'));
        assert_eq!(operand_name(1), Some('B'));
        assert_eq!(operand_name(26), None);
    }
}
