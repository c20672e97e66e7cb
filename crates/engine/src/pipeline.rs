//! The scoring run
//!
//! 1. Resolve every weight and multiplier (no I/O before this succeeds)
//! 2. Create the output directories
//! 3. Score seasonal sensitivity (8 steps)
//! 4. For each factor, in order: weight it, scale it per scenario entry
//!    (BASELINE with identity multipliers), fold the layers into the
//!    scenario sums
//! 5. Write the rasters and the execution log

use std::path::PathBuf;

use mopst_core::{FeatureCollection, Raster};

use crate::error::{Error, Interrupt, Result};
use crate::factor::{FactorAccumulator, FactorPlan};
use crate::feedback::Feedback;
use crate::publish::{OutputLayout, ResultPublisher, RunResult};
use crate::scenario::{ScenarioAccumulator, ScenarioSet};
use crate::sensitivity::{FieldNames, SensitivityInputs, SensitivityScorer, SENSITIVITY_STEPS};
use crate::toolbox::Toolbox;
use crate::weights::WeightTable;

/// Cell-wise sum used to fold a layer into its accumulator
const FOLD_FORMULA: &str = "A+B";

/// Everything a run reads
#[derive(Debug, Clone)]
pub struct PipelineInputs {
    /// Landcover polygons carrying the habitat key
    pub landcover: FeatureCollection,
    /// Per-habitat sensitivity scores
    pub landcover_sensitivity: FeatureCollection,
    /// Per-habitat summer/winter factors
    pub seasonality: FeatureCollection,
    /// Textual score attribute of `landcover_sensitivity`
    pub sensitivity_score_field: String,
    pub fields: FieldNames,
    /// Template grid for every rasterized output
    pub pressure_areas: Raster<f64>,
    /// Accepted for completeness; no output depends on it
    pub opportunity_areas: Option<PathBuf>,
    /// Factor rasters, identified by file name, in processing order
    pub factors: Vec<PathBuf>,
    pub weights: WeightTable,
    pub output_dir: PathBuf,
}

/// How a run ended
#[derive(Debug, Clone, PartialEq)]
pub enum RunStatus {
    Completed(RunResult),
    /// Stopped between steps; files already written are left in place
    Cancelled,
}

impl RunStatus {
    pub fn completed(self) -> Option<RunResult> {
        match self {
            RunStatus::Completed(result) => Some(result),
            RunStatus::Cancelled => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunStatus::Cancelled)
    }
}

/// Collaborator steps of a run with `factors` factors and `scenarios`
/// named scenarios
pub fn step_count(factors: usize, scenarios: usize) -> usize {
    if factors == 0 {
        return SENSITIVITY_STEPS;
    }
    let weighting = 4 * factors;
    let per_scenario = 4 * factors + 4 * (factors - 1);
    SENSITIVITY_STEPS + weighting + per_scenario * (1 + scenarios)
}

/// Resolve every factor against the weight tables, in input order
pub fn plan_factors(
    factors: &[PathBuf],
    weights: &WeightTable,
    set: &ScenarioSet,
) -> Result<Vec<FactorPlan>> {
    if factors.is_empty() {
        return Err(Error::NoFactors);
    }
    factors
        .iter()
        .map(|path| FactorPlan::resolve(path, weights, set).map_err(Error::from))
        .collect()
}

/// Drives one run through a [`Toolbox`], reporting to a [`Feedback`]
pub struct Pipeline<'a, T: Toolbox + ?Sized> {
    toolbox: &'a T,
    feedback: &'a mut Feedback,
}

impl<'a, T: Toolbox + ?Sized> Pipeline<'a, T> {
    pub fn new(toolbox: &'a T, feedback: &'a mut Feedback) -> Self {
        Self { toolbox, feedback }
    }

    /// Run the whole computation.
    ///
    /// # Errors
    /// Missing weights (before anything is written), collaborator failures
    /// and write failures. Cancellation is reported as
    /// [`RunStatus::Cancelled`].
    pub fn run(&mut self, inputs: &PipelineInputs) -> Result<RunStatus> {
        match self.execute(inputs) {
            Ok(result) => Ok(RunStatus::Completed(result)),
            Err(Interrupt::Cancelled) => Ok(RunStatus::Cancelled),
            Err(Interrupt::Failed(e)) => Err(e),
        }
    }

    fn execute(&mut self, inputs: &PipelineInputs) -> std::result::Result<RunResult, Interrupt> {
        let set = inputs.weights.scenario_set();
        let plans = plan_factors(&inputs.factors, &inputs.weights, &set)?;

        let total = step_count(plans.len(), set.named_count());
        self.feedback.set_total_steps(total);
        tracing::debug!(
            factors = plans.len(),
            scenarios = set.named_count(),
            steps = total,
            "weights resolved"
        );

        let layout = OutputLayout::new(inputs.output_dir.clone());
        layout.prepare(&set)?;

        if let Some(path) = &inputs.opportunity_areas {
            self.feedback.push_warning(format!(
                "Opportunity area raster {} is not used by the scoring formulas",
                path.display()
            ));
        }

        let sensitivity_inputs = SensitivityInputs {
            landcover: &inputs.landcover,
            sensitivity: &inputs.landcover_sensitivity,
            seasonality: &inputs.seasonality,
            score_field: &inputs.sensitivity_score_field,
        };
        let sensitivity = SensitivityScorer::new(self.toolbox, &inputs.fields).score(
            &sensitivity_inputs,
            &inputs.pressure_areas,
            self.feedback,
        )?;

        let factors = FactorAccumulator::new(self.toolbox);
        let mut sums = ScenarioAccumulator::new();
        let toolbox = self.toolbox;

        for plan in &plans {
            self.feedback
                .push_info(format!("Process factor file {}.", plan.path.display()));
            let weighted = factors.weighted(plan, &sensitivity, self.feedback)?;

            for &(id, multipliers) in &plan.multipliers {
                let Some(scenario) = set.name(id) else {
                    continue;
                };
                if !scenario.is_baseline() {
                    self.feedback
                        .push_info(format!("Process scenario '{}'.", scenario));
                }
                let layers = factors.scaled(plan, scenario, multipliers, &weighted, self.feedback)?;

                for (quantity, layer) in layers {
                    let feedback = &mut *self.feedback;
                    sums.fold(id, quantity, layer, |acc, layer| {
                        feedback.step(&format!("Sum {} {}", scenario, quantity), || {
                            toolbox.raster_algebra(FOLD_FORMULA, &[acc, layer])
                        })
                    })?;
                }
            }
        }

        let outputs = sums.finish(&set, plans.len())?;

        self.feedback.push_info("Write results.");
        let publisher = ResultPublisher::new(&layout);
        let (layers, groups) = publisher.publish_rasters(&sensitivity, &outputs)?;
        self.feedback.push_info(format!(
            "Wrote {} rasters to {}.",
            layers.len(),
            layout.root().display()
        ));
        let log_path = publisher.publish_log(&self.feedback.text_log())?;

        Ok(RunResult {
            output_dir: layout.root().to_path_buf(),
            layers,
            groups,
            log_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_count() {
        // one factor, no scenario: sensitivity, weighting, identity scaling
        assert_eq!(step_count(1, 0), 16);
        // two factors, one scenario: 8 weighting, then (8 + 4) per entry
        assert_eq!(step_count(2, 1), 8 + 8 + 12 * 2);
        assert_eq!(step_count(3, 2), 8 + 12 + 20 * 3);
        assert_eq!(step_count(0, 4), 8);
    }
}
