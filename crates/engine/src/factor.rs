//! Per-factor weighted and scenario-scaled layers
//!
//! A factor contributes four layers to every scenario. The weighted
//! layers are the seasonal sensitivity rasters multiplied by the factor's
//! pressure/opportunity weights; each scenario entry multiplies those
//! again by its own multipliers, which are identity for BASELINE. Factor
//! rasters select which weights apply; their cell values are not read.

use std::path::{Path, PathBuf};

use mopst_core::Raster;

use crate::error::Interrupt;
use crate::feedback::Feedback;
use crate::scenario::{Quantity, QuantityLayers, ScenarioId, ScenarioName, ScenarioSet};
use crate::sensitivity::SensitivityLayers;
use crate::toolbox::Toolbox;
use crate::weights::{Coefficients, WeightError, WeightTable};

/// Name under which a factor file is looked up in the weight tables
pub fn factor_file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// A factor with every coefficient it needs, resolved ahead of the run
#[derive(Debug, Clone)]
pub struct FactorPlan {
    pub path: PathBuf,
    pub file_name: String,
    pub weights: Coefficients,
    /// Multipliers per scenario entry, in scenario-set order; identity for
    /// the baseline
    pub multipliers: Vec<(ScenarioId, Coefficients)>,
}

impl FactorPlan {
    /// Resolve the weights of `path` and its multipliers for every scenario.
    ///
    /// # Errors
    /// The factor weight row or any `(scenario, factor)` multiplier row is
    /// missing.
    pub fn resolve(path: &Path, table: &WeightTable, set: &ScenarioSet) -> Result<Self, WeightError> {
        let file_name = factor_file_name(path);
        let weights = table.lookup_factor_weights(&file_name)?;
        let multipliers = set
            .iter()
            .map(|(id, name)| Ok((id, table.multipliers_for(name, &file_name)?)))
            .collect::<Result<Vec<_>, WeightError>>()?;

        Ok(Self {
            path: path.to_path_buf(),
            file_name,
            weights,
            multipliers,
        })
    }
}

/// `A*<scalar>` as the raster calculator reads it
fn scale_formula(scalar: f64) -> String {
    format!("A*{}", scalar)
}

/// Computes one factor's contributions through a [`Toolbox`]
pub struct FactorAccumulator<'t, T: Toolbox + ?Sized> {
    toolbox: &'t T,
}

impl<'t, T: Toolbox + ?Sized> FactorAccumulator<'t, T> {
    pub fn new(toolbox: &'t T) -> Self {
        Self { toolbox }
    }

    /// Seasonal sensitivity times the factor weights. Four steps.
    pub fn weighted(
        &self,
        plan: &FactorPlan,
        sensitivity: &SensitivityLayers,
        feedback: &mut Feedback,
    ) -> Result<QuantityLayers<Raster<f64>>, Interrupt> {
        QuantityLayers::try_from_fn(|quantity| {
            let weight = quantity.kind().pick(&plan.weights);
            let source = sensitivity.seasonal(quantity.season());
            let formula = scale_formula(weight);
            feedback.step(&format!("{} {}", plan.file_name, quantity), || {
                self.toolbox.raster_algebra(&formula, &[source])
            })
        })
    }

    /// A scenario's contribution: the weighted layers times its
    /// multipliers. Four steps for every scenario entry, BASELINE included
    /// with identity multipliers.
    pub fn scaled(
        &self,
        plan: &FactorPlan,
        scenario: &ScenarioName,
        multipliers: Coefficients,
        weighted: &QuantityLayers<Raster<f64>>,
        feedback: &mut Feedback,
    ) -> Result<QuantityLayers<Raster<f64>>, Interrupt> {
        QuantityLayers::try_from_fn(|quantity: Quantity| {
            let formula = scale_formula(quantity.kind().pick(&multipliers));
            let layer = weighted.get(quantity);
            feedback.step(
                &format!("{} {} {}", scenario, plan.file_name, quantity),
                || self.toolbox.raster_algebra(&formula, &[layer]),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolbox::NativeToolbox;
    use crate::weights::{FactorWeight, ScenarioWeight};
    use approx::assert_relative_eq;

    fn make_band(value: f64) -> Raster<f64> {
        Raster::filled(3, 3, value)
    }

    fn sensitivity() -> SensitivityLayers {
        SensitivityLayers {
            base: make_band(1.0),
            summer: make_band(10.0),
            winter: make_band(4.0),
        }
    }

    fn table() -> WeightTable {
        WeightTable::from_rows(
            &[FactorWeight {
                factor: "trails.tif".into(),
                pressure: 2.0,
                opportunity: 1.0,
            }],
            &[ScenarioWeight {
                scenario: "S1".into(),
                factor: "trails.tif".into(),
                opportunity: 0.5,
                pressure: 2.0,
            }],
        )
        .unwrap()
    }

    #[test]
    fn test_resolve_plan() {
        let table = table();
        let set = table.scenario_set();
        let plan = FactorPlan::resolve(Path::new("/data/factors/trails.tif"), &table, &set).unwrap();

        assert_eq!(plan.file_name, "trails.tif");
        assert_eq!(plan.weights, Coefficients::new(2.0, 1.0));
        assert_eq!(plan.multipliers.len(), 2);
        assert_eq!(plan.multipliers[0].1, Coefficients::new(2.0, 0.5));
        assert!(plan.multipliers[1].1.is_identity());
    }

    #[test]
    fn test_resolve_missing_weights() {
        let table = table();
        let set = table.scenario_set();
        let err = FactorPlan::resolve(Path::new("roads.tif"), &table, &set).unwrap_err();
        assert_eq!(
            err,
            WeightError::MissingFactorWeight {
                factor: "roads.tif".into()
            }
        );
    }

    #[test]
    fn test_weighted_and_scaled_layers() {
        let table = table();
        let set = table.scenario_set();
        let plan = FactorPlan::resolve(Path::new("trails.tif"), &table, &set).unwrap();
        let acc = FactorAccumulator::new(&NativeToolbox);
        let mut feedback = Feedback::new();

        let weighted = acc.weighted(&plan, &sensitivity(), &mut feedback).unwrap();
        assert_relative_eq!(weighted[Quantity::PressureSummer].get(0, 0).unwrap(), 20.0);
        assert_relative_eq!(weighted[Quantity::OpportunitySummer].get(0, 0).unwrap(), 10.0);
        assert_relative_eq!(weighted[Quantity::PressureWinter].get(0, 0).unwrap(), 8.0);
        assert_relative_eq!(weighted[Quantity::OpportunityWinter].get(0, 0).unwrap(), 4.0);
        assert_eq!(feedback.current_step(), 4);

        let (_, s1) = set.iter().next().unwrap();
        let scaled = acc
            .scaled(&plan, s1, plan.multipliers[0].1, &weighted, &mut feedback)
            .unwrap();
        assert_relative_eq!(scaled[Quantity::PressureSummer].get(1, 1).unwrap(), 40.0);
        assert_relative_eq!(scaled[Quantity::OpportunityWinter].get(1, 1).unwrap(), 2.0);
        assert_eq!(feedback.current_step(), 8);
    }

    #[test]
    fn test_baseline_scales_by_identity() {
        let table = table();
        let set = table.scenario_set();
        let plan = FactorPlan::resolve(Path::new("trails.tif"), &table, &set).unwrap();
        let acc = FactorAccumulator::new(&NativeToolbox);
        let mut feedback = Feedback::new();

        let weighted = acc.weighted(&plan, &sensitivity(), &mut feedback).unwrap();
        let baseline = acc
            .scaled(&plan, &ScenarioName::Baseline, Coefficients::IDENTITY, &weighted, &mut feedback)
            .unwrap();
        for q in Quantity::ALL {
            assert_eq!(baseline[q].data(), weighted[q].data());
        }
        assert_eq!(feedback.current_step(), 8);
    }
}
