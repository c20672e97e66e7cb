//! Field calculator and text-to-float conversion
//!
//! Both produce a new table; the input is never modified.

use crate::expression::Expression;
use mopst_core::vector::{AttributeValue, FeatureCollection};
use mopst_core::{Algorithm, Error, Result};

/// Parameters for [`field_calculator`]
#[derive(Debug, Clone)]
pub struct FieldCalculatorParams {
    /// Name of the field to create (or overwrite)
    pub field_name: String,
    /// Formula over existing fields, e.g. `"score" * to_real("Summer")`
    pub formula: String,
}

/// Field calculator algorithm
#[derive(Debug, Clone, Default)]
pub struct FieldCalculator;

impl Algorithm for FieldCalculator {
    type Input = FeatureCollection;
    type Output = FeatureCollection;
    type Params = FieldCalculatorParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "FieldCalculator"
    }

    fn description(&self) -> &'static str {
        "Add a float field computed from a formula over existing fields"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        field_calculator(&input, &params)
    }
}

/// Add a float field computed per feature from `params.formula`.
///
/// Field values are read leniently: numbers as-is, text parsed as a
/// number. Null or unparsable operands, and division by zero, produce a
/// `Null` result for that feature.
///
/// # Errors
/// Formula syntax errors, or a formula naming a field the table lacks.
pub fn field_calculator(
    table: &FeatureCollection,
    params: &FieldCalculatorParams,
) -> Result<FeatureCollection> {
    let expr = Expression::parse(&params.formula)?;

    if !table.is_empty() {
        if let Some(missing) = expr.variables().iter().find(|v| !table.has_field(v)) {
            return Err(Error::FieldNotFound {
                field: missing.clone(),
                available: table.fields().to_vec(),
            });
        }
    }

    let mut output = table.clone();
    output.add_field(params.field_name.clone());

    let mut values = vec![None; expr.variables().len()];
    for feature in output.iter_mut() {
        for (slot, name) in values.iter_mut().zip(expr.variables()) {
            *slot = feature.get_property(name).and_then(AttributeValue::to_real);
        }
        let result = expr.evaluate(&values).filter(|v| v.is_finite());
        feature.set_property(params.field_name.clone(), AttributeValue::from(result));
    }

    Ok(output)
}

/// Convert a textual field to float in place (on a copy of the table).
///
/// Unparsable and empty values become `Null`.
///
/// # Errors
/// The table is non-empty and lacks `field`.
pub fn text_to_float(table: &FeatureCollection, field: &str) -> Result<FeatureCollection> {
    if !table.is_empty() && !table.has_field(field) {
        return Err(Error::FieldNotFound {
            field: field.to_string(),
            available: table.fields().to_vec(),
        });
    }

    let mut output = table.clone();
    let mut failed = 0usize;
    for feature in output.iter_mut() {
        let original = feature.get_property(field).cloned().unwrap_or(AttributeValue::Null);
        let converted = original.to_real();
        if converted.is_none() && !original.is_null() {
            failed += 1;
        }
        feature.set_property(field, AttributeValue::from(converted));
    }

    if failed > 0 {
        tracing::debug!(field, failed, "values could not be converted to float");
    }

    Ok(output)
}
