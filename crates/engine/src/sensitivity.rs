//! Seasonal landcover sensitivity
//!
//! Joins the landcover polygons to the sensitivity and seasonality tables,
//! derives summer and winter scores, and rasterizes the base, summer and
//! winter scores onto the pressure-area grid. Eight collaborator steps.

use mopst_core::{FeatureCollection, Raster};
use serde::{Deserialize, Serialize};

use crate::error::Interrupt;
use crate::feedback::Feedback;
use crate::scenario::Season;
use crate::toolbox::{JoinParams, Toolbox};

/// Collaborator steps taken by [`SensitivityScorer::score`]
pub const SENSITIVITY_STEPS: usize = 8;

/// Attribute names read from, and written to, the landcover tables
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FieldNames {
    /// Habitat key on the landcover polygons
    pub landcover_key: String,
    /// Habitat key on the sensitivity and seasonality tables
    pub table_key: String,
    /// Summer seasonality factor
    pub summer: String,
    /// Winter seasonality factor
    pub winter: String,
    /// Derived summer score
    pub summer_score: String,
    /// Derived winter score
    pub winter_score: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            landcover_key: "Main_habit".into(),
            table_key: "Habitat_environment_type".into(),
            summer: "Summer".into(),
            winter: "Winter".into(),
            summer_score: "summer_score".into(),
            winter_score: "winter_score".into(),
        }
    }
}

impl FieldNames {
    fn seasonal(&self, season: Season) -> (&str, &str) {
        match season {
            Season::Summer => (&self.summer, &self.summer_score),
            Season::Winter => (&self.winter, &self.winter_score),
        }
    }
}

/// Vector inputs of the scorer
#[derive(Debug, Clone)]
pub struct SensitivityInputs<'a> {
    pub landcover: &'a FeatureCollection,
    pub sensitivity: &'a FeatureCollection,
    pub seasonality: &'a FeatureCollection,
    /// Textual sensitivity score attribute of `sensitivity`
    pub score_field: &'a str,
}

/// The three baseline landcover rasters
#[derive(Debug, Clone)]
pub struct SensitivityLayers {
    pub base: Raster<f64>,
    pub summer: Raster<f64>,
    pub winter: Raster<f64>,
}

impl SensitivityLayers {
    pub fn seasonal(&self, season: Season) -> &Raster<f64> {
        match season {
            Season::Summer => &self.summer,
            Season::Winter => &self.winter,
        }
    }
}

/// Produces [`SensitivityLayers`] through a [`Toolbox`]
pub struct SensitivityScorer<'t, T: Toolbox + ?Sized> {
    toolbox: &'t T,
    fields: &'t FieldNames,
}

impl<'t, T: Toolbox + ?Sized> SensitivityScorer<'t, T> {
    pub fn new(toolbox: &'t T, fields: &'t FieldNames) -> Self {
        Self { toolbox, fields }
    }

    /// Run the eight scoring steps, rasterizing onto `template`'s grid
    pub fn score(
        &self,
        inputs: &SensitivityInputs<'_>,
        template: &Raster<f64>,
        feedback: &mut Feedback,
    ) -> Result<SensitivityLayers, Interrupt> {
        let tb = self.toolbox;
        let f = self.fields;
        let join = JoinParams::new(f.landcover_key.as_str(), f.table_key.as_str());

        feedback.push_info("Convert sensitivity score field to float.");
        let scores = feedback.step("Convert sensitivity score to float", || {
            tb.convert_to_numeric(inputs.sensitivity, inputs.score_field)
        })?;

        feedback.push_info("Join landcover sensitivity table.");
        let joined = feedback.step("Join landcover sensitivity table", || {
            tb.join_by_key(inputs.landcover, &scores, &join)
        })?;
        report_unmatched(feedback, "sensitivity", joined.unmatched, inputs.landcover.len());

        feedback.push_info("Join seasonality table.");
        let joined = feedback.step("Join seasonality table", || {
            tb.join_by_key(&joined.joined, inputs.seasonality, &join)
        })?;
        report_unmatched(feedback, "seasonality", joined.unmatched, inputs.landcover.len());

        let mut table = joined.joined;
        for season in [Season::Summer, Season::Winter] {
            let (factor, score) = f.seasonal(season);
            let formula = format!(r#""{}" * to_real("{}")"#, inputs.score_field, factor);
            feedback.push_info(format!("Calculate {} sensitivity score.", season_label(season)));
            table = feedback.step(&format!("Calculate {}", score), || {
                tb.add_computed_field(&table, score, &formula)
            })?;
        }

        feedback.push_info("Rasterize base landcover.");
        let base = feedback.step("Rasterize base landcover", || {
            tb.rasterize_field(&table, inputs.score_field, template)
        })?;
        feedback.push_info("Rasterize summer landcover.");
        let summer = feedback.step("Rasterize summer landcover", || {
            tb.rasterize_field(&table, &f.summer_score, template)
        })?;
        feedback.push_info("Rasterize winter landcover.");
        let winter = feedback.step("Rasterize winter landcover", || {
            tb.rasterize_field(&table, &f.winter_score, template)
        })?;

        Ok(SensitivityLayers { base, summer, winter })
    }
}

fn season_label(season: Season) -> &'static str {
    match season {
        Season::Summer => "summer",
        Season::Winter => "winter",
    }
}

fn report_unmatched(feedback: &mut Feedback, table: &str, unmatched: usize, total: usize) {
    if unmatched > 0 {
        feedback.push_warning(format!(
            "{} of {} landcover polygons found no {} row; their scores stay empty",
            unmatched, total, table
        ));
    }
}
