//! Attribute table operations
//!
//! - Join: copy attributes from a lookup table by matching key values
//! - Field calculator: derive a numeric field from a formula
//! - Text to float: convert a textual field to numbers in place

mod field_calculator;
mod join;

pub use field_calculator::{field_calculator, text_to_float, FieldCalculator, FieldCalculatorParams};
pub use join::{join_attributes, JoinAttributes, JoinOutput, JoinParams};
