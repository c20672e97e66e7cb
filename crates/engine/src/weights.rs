//! Factor and scenario weight tables
//!
//! Two immutable tables loaded once per run:
//! - factor weights: `(factor file, pressure weight, opportunity weight)`
//! - scenario weights: `(scenario, factor file, opportunity multiplier, pressure multiplier)`
//!
//! Rows are validated on construction (unique keys, finite numbers,
//! usable scenario names), so lookups are the only thing that can fail
//! afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::scenario::{ScenarioName, ScenarioSet, BASELINE};

/// Weight table errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WeightError {
    #[error("Could not find pressure and opportunity weights for factor file {factor}.")]
    MissingFactorWeight { factor: String },

    #[error("Could not find pressure and opportunity multipliers for scenario {scenario} and factor file {factor}.")]
    MissingScenarioMultiplier { scenario: String, factor: String },

    #[error("factor file {factor} has more than one weight row")]
    DuplicateFactorWeight { factor: String },

    #[error("scenario {scenario} has more than one multiplier row for factor file {factor}")]
    DuplicateScenarioWeight { scenario: String, factor: String },

    #[error("{table} matrix has {cells} cells, not a multiple of {columns} columns")]
    MalformedMatrix {
        table: &'static str,
        columns: usize,
        cells: usize,
    },

    #[error("{table} row {row}, column {column}: '{value}' is not a number")]
    InvalidNumber {
        table: &'static str,
        row: usize,
        column: usize,
        value: String,
    },

    #[error("{table} row for {key}: {value} is not a finite number")]
    NonFiniteWeight {
        table: &'static str,
        key: String,
        value: f64,
    },

    #[error("scenario name BASELINE is reserved for the unscaled baseline")]
    ReservedScenarioName,

    #[error("scenario name '{0}' cannot be used as an output directory name")]
    InvalidScenarioName(String),
}

/// Pressure and opportunity coefficients: the weights of a factor, or the
/// multipliers a scenario applies on top of them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    pub pressure: f64,
    pub opportunity: f64,
}

impl Coefficients {
    /// Multipliers of the unscaled baseline
    pub const IDENTITY: Coefficients = Coefficients {
        pressure: 1.0,
        opportunity: 1.0,
    };

    pub fn new(pressure: f64, opportunity: f64) -> Self {
        Self {
            pressure,
            opportunity,
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

/// One factor-weight row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorWeight {
    pub factor: String,
    pub pressure: f64,
    pub opportunity: f64,
}

/// One scenario-weight row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioWeight {
    pub scenario: String,
    pub factor: String,
    pub opportunity: f64,
    pub pressure: f64,
}

/// Lookup view over the two weight tables
#[derive(Debug, Clone, Default)]
pub struct WeightTable {
    factors: HashMap<String, Coefficients>,
    multipliers: HashMap<(String, String), Coefficients>,
    scenario_order: Vec<String>,
}

fn check_finite(table: &'static str, key: &str, values: [f64; 2]) -> Result<(), WeightError> {
    match values.into_iter().find(|v| !v.is_finite()) {
        Some(value) => Err(WeightError::NonFiniteWeight {
            table,
            key: key.to_string(),
            value,
        }),
        None => Ok(()),
    }
}

fn check_scenario_name(name: &str) -> Result<(), WeightError> {
    if name == BASELINE {
        return Err(WeightError::ReservedScenarioName);
    }
    let unusable = name.trim().is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if unusable {
        return Err(WeightError::InvalidScenarioName(name.to_string()));
    }
    Ok(())
}

impl WeightTable {
    /// Build from structured rows. Names are trimmed of surrounding
    /// whitespace.
    pub fn from_rows(
        factor_rows: &[FactorWeight],
        scenario_rows: &[ScenarioWeight],
    ) -> Result<Self, WeightError> {
        let mut table = WeightTable::default();

        for row in factor_rows {
            let factor = row.factor.trim();
            check_finite("factor weights", factor, [row.pressure, row.opportunity])?;
            let previous = table.factors.insert(
                factor.to_string(),
                Coefficients::new(row.pressure, row.opportunity),
            );
            if previous.is_some() {
                return Err(WeightError::DuplicateFactorWeight {
                    factor: factor.to_string(),
                });
            }
        }

        for row in scenario_rows {
            let (scenario, factor) = (row.scenario.trim(), row.factor.trim());
            check_scenario_name(scenario)?;
            let key = format!("{}/{}", scenario, factor);
            check_finite("scenario weights", &key, [row.pressure, row.opportunity])?;

            let previous = table.multipliers.insert(
                (scenario.to_string(), factor.to_string()),
                Coefficients::new(row.pressure, row.opportunity),
            );
            if previous.is_some() {
                return Err(WeightError::DuplicateScenarioWeight {
                    scenario: scenario.to_string(),
                    factor: factor.to_string(),
                });
            }
            if !table.scenario_order.iter().any(|s| s == scenario) {
                table.scenario_order.push(scenario.to_string());
            }
        }

        Ok(table)
    }

    /// Build from flat row-major cell lists as a host matrix widget
    /// delivers them: 3 columns `(factor, pressure, opportunity)` and
    /// 4 columns `(scenario, factor, opportunity, pressure)`.
    pub fn from_matrices<S: AsRef<str>>(
        factor_cells: &[S],
        scenario_cells: &[S],
    ) -> Result<Self, WeightError> {
        const FACTORS: &str = "factor weights";
        const SCENARIOS: &str = "scenario weights";

        let factor_rows = chunk_rows(FACTORS, factor_cells, 3)?
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                Ok(FactorWeight {
                    factor: row[0].to_string(),
                    pressure: parse_cell(FACTORS, i, 1, row[1])?,
                    opportunity: parse_cell(FACTORS, i, 2, row[2])?,
                })
            })
            .collect::<Result<Vec<_>, WeightError>>()?;

        let scenario_rows = chunk_rows(SCENARIOS, scenario_cells, 4)?
            .into_iter()
            .enumerate()
            .map(|(i, row)| {
                Ok(ScenarioWeight {
                    scenario: row[0].to_string(),
                    factor: row[1].to_string(),
                    opportunity: parse_cell(SCENARIOS, i, 2, row[2])?,
                    pressure: parse_cell(SCENARIOS, i, 3, row[3])?,
                })
            })
            .collect::<Result<Vec<_>, WeightError>>()?;

        Self::from_rows(&factor_rows, &scenario_rows)
    }

    /// `(pressure weight, opportunity weight)` of a factor file
    pub fn lookup_factor_weights(&self, factor: &str) -> Result<Coefficients, WeightError> {
        self.factors
            .get(factor)
            .copied()
            .ok_or_else(|| WeightError::MissingFactorWeight {
                factor: factor.to_string(),
            })
    }

    /// `(pressure multiplier, opportunity multiplier)` of a scenario for a factor file
    pub fn lookup_scenario_multipliers(
        &self,
        scenario: &str,
        factor: &str,
    ) -> Result<Coefficients, WeightError> {
        self.multipliers
            .get(&(scenario.to_string(), factor.to_string()))
            .copied()
            .ok_or_else(|| WeightError::MissingScenarioMultiplier {
                scenario: scenario.to_string(),
                factor: factor.to_string(),
            })
    }

    /// Multipliers for any scenario entry; the baseline is always identity
    pub fn multipliers_for(
        &self,
        scenario: &ScenarioName,
        factor: &str,
    ) -> Result<Coefficients, WeightError> {
        match scenario {
            ScenarioName::Baseline => Ok(Coefficients::IDENTITY),
            ScenarioName::Named(name) => self.lookup_scenario_multipliers(name, factor),
        }
    }

    /// Scenario names in order of first appearance in the scenario rows
    pub fn distinct_scenario_names(&self) -> &[String] {
        &self.scenario_order
    }

    /// Named scenarios followed by the baseline
    pub fn scenario_set(&self) -> ScenarioSet {
        ScenarioSet::new(self.scenario_order.iter().cloned())
    }

    pub fn factor_count(&self) -> usize {
        self.factors.len()
    }
}

fn chunk_rows<'a, S: AsRef<str>>(
    table: &'static str,
    cells: &'a [S],
    columns: usize,
) -> Result<Vec<Vec<&'a str>>, WeightError> {
    if cells.len() % columns != 0 {
        return Err(WeightError::MalformedMatrix {
            table,
            columns,
            cells: cells.len(),
        });
    }
    Ok(cells
        .chunks(columns)
        .map(|row| row.iter().map(AsRef::as_ref).collect())
        .collect())
}

fn parse_cell(table: &'static str, row: usize, column: usize, value: &str) -> Result<f64, WeightError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| WeightError::InvalidNumber {
            table,
            row,
            column,
            value: value.to_string(),
        })
}
