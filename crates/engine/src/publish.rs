//! Output directory layout and result publishing
//!
//! ```text
//! <output>/
//!   base_landcover.tif  summer_landcover.tif  winter_landcover.tif
//!   pressure-summer.tif  opportunity-summer.tif  pressure-winter.tif  opportunity-winter.tif
//!   execution-log.txt
//!   scenario-<name>/
//!     pressure-summer.tif  opportunity-summer.tif  pressure-winter.tif  opportunity-winter.tif
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use mopst_core::io::write_geotiff;
use mopst_core::Raster;

use crate::error::{Error, Result};
use crate::scenario::{Quantity, ScenarioName, ScenarioOutput, ScenarioSet};
use crate::sensitivity::SensitivityLayers;

/// File name of the execution log in the output root
pub const LOG_FILE_NAME: &str = "execution-log.txt";

/// File names of the three baseline landcover rasters
pub const LANDCOVER_FILE_NAMES: [&str; 3] = [
    "base_landcover.tif",
    "summer_landcover.tif",
    "winter_landcover.tif",
];

/// Where each output of a run goes
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Baseline outputs live in the root, named scenarios in `scenario-<name>`
    pub fn scenario_dir(&self, scenario: &ScenarioName) -> PathBuf {
        match scenario {
            ScenarioName::Baseline => self.root.clone(),
            ScenarioName::Named(name) => self.root.join(format!("scenario-{}", name)),
        }
    }

    pub fn raster_path(&self, scenario: &ScenarioName, quantity: Quantity) -> PathBuf {
        self.scenario_dir(scenario)
            .join(format!("{}.tif", quantity.file_stem()))
    }

    pub fn landcover_paths(&self) -> [PathBuf; 3] {
        LANDCOVER_FILE_NAMES.map(|name| self.root.join(name))
    }

    pub fn log_path(&self) -> PathBuf {
        self.root.join(LOG_FILE_NAME)
    }

    /// Create the root and every scenario directory. Idempotent.
    pub fn prepare(&self, set: &ScenarioSet) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        for name in set.named() {
            fs::create_dir_all(self.scenario_dir(name))?;
        }
        Ok(())
    }
}

/// Rasters written for one scenario, for display grouping
#[derive(Debug, Clone, PartialEq)]
pub struct LayerGroup {
    pub scenario: ScenarioName,
    pub layers: Vec<PathBuf>,
}

/// What a completed run produced
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    pub output_dir: PathBuf,
    /// Every written raster, in writing order
    pub layers: Vec<PathBuf>,
    /// Written rasters per scenario; the baseline group also holds the
    /// landcover rasters
    pub groups: Vec<LayerGroup>,
    pub log_path: PathBuf,
}

impl RunResult {
    pub fn group(&self, scenario: &str) -> Option<&LayerGroup> {
        self.groups.iter().find(|g| g.scenario.as_str() == scenario)
    }
}

/// Writes final rasters and the execution log
#[derive(Debug)]
pub struct ResultPublisher<'a> {
    layout: &'a OutputLayout,
}

fn write_raster(raster: &Raster<f64>, path: &Path) -> Result<()> {
    write_geotiff(raster, path).map_err(|source| Error::Output {
        path: path.to_path_buf(),
        source,
    })
}

impl<'a> ResultPublisher<'a> {
    pub fn new(layout: &'a OutputLayout) -> Self {
        Self { layout }
    }

    /// Write the landcover rasters and every scenario's four rasters.
    ///
    /// Groups follow scenario order, so the baseline group comes last and
    /// starts with the landcover rasters.
    pub fn publish_rasters(
        &self,
        sensitivity: &SensitivityLayers,
        outputs: &[ScenarioOutput],
    ) -> Result<(Vec<PathBuf>, Vec<LayerGroup>)> {
        let mut layers = Vec::new();

        let landcover = [&sensitivity.base, &sensitivity.summer, &sensitivity.winter];
        let mut landcover_paths = Vec::with_capacity(3);
        for (raster, path) in landcover.into_iter().zip(self.layout.landcover_paths()) {
            write_raster(raster, &path)?;
            tracing::debug!(path = %path.display(), "wrote landcover raster");
            landcover_paths.push(path);
        }
        layers.extend(landcover_paths.iter().cloned());

        let mut groups = Vec::with_capacity(outputs.len());
        for output in outputs {
            let mut group = LayerGroup {
                scenario: output.scenario.clone(),
                layers: Vec::new(),
            };
            if output.scenario.is_baseline() {
                group.layers.extend(landcover_paths.iter().cloned());
            }
            for (quantity, raster) in output.layers.iter() {
                let path = self.layout.raster_path(&output.scenario, quantity);
                write_raster(raster, &path)?;
                tracing::debug!(scenario = %output.scenario, path = %path.display(), "wrote output raster");
                layers.push(path.clone());
                group.layers.push(path);
            }
            groups.push(group);
        }

        Ok((layers, groups))
    }

    /// Write the execution log to the output root
    pub fn publish_log(&self, text: &str) -> Result<PathBuf> {
        let path = self.layout.log_path();
        fs::write(&path, text)?;
        Ok(path)
    }
}
