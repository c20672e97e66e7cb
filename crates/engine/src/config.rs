//! Run configuration
//!
//! A run is described in YAML:
//!
//! ```yaml
//! landcover: landcover.geojson
//! landcover_sensitivity: sensitivity.geojson
//! sensitivity_score_field: Sensitivity
//! seasonality: seasonality.geojson
//! pressure_areas: pressure.tif
//! opportunity_areas: opportunity.tif
//! factors:
//!   - factors/trails.tif
//!   - factors/roads.tif
//! factor_weights:
//!   - { factor: trails.tif, pressure: 2, opportunity: 1 }
//!   - { factor: roads.tif, pressure: 1, opportunity: 3 }
//! scenario_weights:
//!   - { scenario: S1, factor: trails.tif, opportunity: 0.5, pressure: 2 }
//!   - { scenario: S1, factor: roads.tif, opportunity: 0.5, pressure: 2 }
//! output: results
//! ```
//!
//! Relative paths resolve against the directory of the configuration file.

use std::io;
use std::path::{Path, PathBuf};

use mopst_core::io::{read_geojson, read_geotiff};
use mopst_core::FeatureCollection;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::pipeline::PipelineInputs;
use crate::sensitivity::FieldNames;
use crate::weights::{FactorWeight, ScenarioWeight, WeightTable};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub landcover: PathBuf,
    pub landcover_sensitivity: PathBuf,
    pub sensitivity_score_field: String,
    pub seasonality: PathBuf,
    pub pressure_areas: PathBuf,
    #[serde(default)]
    pub opportunity_areas: Option<PathBuf>,
    pub factors: Vec<PathBuf>,
    pub factor_weights: Vec<FactorWeight>,
    #[serde(default)]
    pub scenario_weights: Vec<ScenarioWeight>,
    pub output: PathBuf,
    #[serde(default)]
    pub fields: FieldNames,
}

impl RunConfig {
    /// Parse YAML text. Paths are kept as written.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_saphyr::from_str(yaml).map_err(|e| Error::Config(e.to_string()))
    }

    /// Read a configuration file and resolve its relative paths
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_saphyr::from_str(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Ok(config.resolve_paths(base))
    }

    /// Make every relative path relative to `base`
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.landcover);
        resolve(&mut self.landcover_sensitivity);
        resolve(&mut self.seasonality);
        resolve(&mut self.pressure_areas);
        if let Some(p) = self.opportunity_areas.as_mut() {
            resolve(p);
        }
        self.factors.iter_mut().for_each(resolve);
        resolve(&mut self.output);
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = output.into();
        self
    }

    /// Validated weight tables
    pub fn weight_table(&self) -> Result<WeightTable> {
        Ok(WeightTable::from_rows(&self.factor_weights, &self.scenario_weights)?)
    }

    /// Read every input the run needs.
    ///
    /// Factor rasters and the opportunity-area raster are only checked for
    /// existence; their cells are never read.
    pub fn load_inputs(&self) -> Result<PipelineInputs> {
        let weights = self.weight_table()?;

        let pressure_areas = read_geotiff::<f64, _>(&self.pressure_areas).map_err(|source| {
            Error::Input {
                path: self.pressure_areas.clone(),
                source,
            }
        })?;

        if let Some(path) = &self.opportunity_areas {
            require_file(path)?;
        }
        for path in &self.factors {
            require_file(path)?;
        }

        Ok(PipelineInputs {
            landcover: read_table(&self.landcover)?,
            landcover_sensitivity: read_table(&self.landcover_sensitivity)?,
            seasonality: read_table(&self.seasonality)?,
            sensitivity_score_field: self.sensitivity_score_field.clone(),
            fields: self.fields.clone(),
            pressure_areas,
            opportunity_areas: self.opportunity_areas.clone(),
            factors: self.factors.clone(),
            weights,
            output_dir: self.output.clone(),
        })
    }
}

fn read_table(path: &Path) -> Result<FeatureCollection> {
    read_geojson(path).map_err(|source| Error::Input {
        path: path.to_path_buf(),
        source,
    })
}

fn require_file(path: &Path) -> Result<()> {
    if path.is_file() {
        return Ok(());
    }
    Err(Error::Input {
        path: path.to_path_buf(),
        source: io::Error::new(io::ErrorKind::NotFound, "file does not exist").into(),
    })
}
