//! End-to-end runs of the scoring pipeline on small synthetic inputs.
//!
//! The study area is a 4x4 grid of unit cells covered by a single heath
//! polygon with sensitivity 10, summer factor 1 and winter factor 0.5, so
//! the summer sensitivity raster is 10 everywhere and the winter one 5.

use std::cell::RefCell;
use std::path::{Path, PathBuf};

use approx::assert_relative_eq;
use geo_types::{Geometry, Rect};
use mopst_core::io::{read_geotiff, write_geotiff};
use mopst_core::{Feature, FeatureCollection, GeoTransform, Raster};
use mopst_engine::toolbox::{JoinOutput, JoinParams};
use mopst_engine::{
    step_count, Error, FactorWeight, Feedback, FieldNames, NativeToolbox, Pipeline,
    PipelineInputs, RunConfig, RunResult, RunStatus, ScenarioWeight, Toolbox, WeightError,
    WeightTable,
};

// ── Fixtures ──────────────────────────────────────────────────────────

fn template() -> Raster<f64> {
    let mut r = Raster::new(4, 4);
    r.set_transform(GeoTransform::new(0.0, 4.0, 1.0, -1.0));
    r
}

fn landcover() -> FeatureCollection {
    let mut t = FeatureCollection::new();
    t.push(
        Feature::new(Geometry::Rect(Rect::new((0.0, 0.0), (4.0, 4.0))))
            .with_property("Main_habit", "Heath"),
    );
    t
}

fn sensitivity_table() -> FeatureCollection {
    let mut t = FeatureCollection::new();
    t.push(
        Feature::empty()
            .with_property("Habitat_environment_type", "Heath")
            .with_property("Sensitivity", "10"),
    );
    t
}

fn seasonality_table() -> FeatureCollection {
    let mut t = FeatureCollection::new();
    t.push(
        Feature::empty()
            .with_property("Habitat_environment_type", "Heath")
            .with_property("Summer", 1.0)
            .with_property("Winter", 0.5),
    );
    t
}

fn fw(factor: &str, pressure: f64, opportunity: f64) -> FactorWeight {
    FactorWeight {
        factor: factor.into(),
        pressure,
        opportunity,
    }
}

fn sw(scenario: &str, factor: &str, opportunity: f64, pressure: f64) -> ScenarioWeight {
    ScenarioWeight {
        scenario: scenario.into(),
        factor: factor.into(),
        opportunity,
        pressure,
    }
}

fn inputs(
    output_dir: &Path,
    factors: &[&str],
    factor_rows: &[FactorWeight],
    scenario_rows: &[ScenarioWeight],
) -> PipelineInputs {
    PipelineInputs {
        landcover: landcover(),
        landcover_sensitivity: sensitivity_table(),
        seasonality: seasonality_table(),
        sensitivity_score_field: "Sensitivity".into(),
        fields: FieldNames::default(),
        pressure_areas: template(),
        opportunity_areas: None,
        factors: factors.iter().map(|f| PathBuf::from("factors").join(f)).collect(),
        weights: WeightTable::from_rows(factor_rows, scenario_rows).unwrap(),
        output_dir: output_dir.to_path_buf(),
    }
}

/// Two factors and one scenario
fn two_factor_inputs(output_dir: &Path) -> PipelineInputs {
    inputs(
        output_dir,
        &["F1.tif", "F2.tif"],
        &[fw("F1.tif", 2.0, 1.0), fw("F2.tif", 1.0, 3.0)],
        &[sw("S1", "F1.tif", 0.5, 2.0), sw("S1", "F2.tif", 0.5, 2.0)],
    )
}

fn run_with<T: Toolbox>(toolbox: &T, inputs: &PipelineInputs) -> mopst_engine::Result<RunStatus> {
    let mut feedback = Feedback::new();
    Pipeline::new(toolbox, &mut feedback).run(inputs)
}

fn completed(status: RunStatus) -> RunResult {
    match status {
        RunStatus::Completed(result) => result,
        RunStatus::Cancelled => panic!("run was cancelled"),
    }
}

fn read(path: impl AsRef<Path>) -> Raster<f64> {
    read_geotiff::<f64, _>(path).unwrap()
}

fn assert_uniform(raster: &Raster<f64>, expected: f64) {
    for &v in raster.data().iter() {
        assert_relative_eq!(v, expected, max_relative = 1e-6);
    }
}

// ── Recording / failing toolboxes ─────────────────────────────────────

/// Native toolbox that records every call
#[derive(Default)]
struct RecordingToolbox {
    calls: RefCell<Vec<String>>,
}

impl RecordingToolbox {
    fn count(&self, prefix: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

impl Toolbox for RecordingToolbox {
    fn convert_to_numeric(
        &self,
        table: &FeatureCollection,
        field: &str,
    ) -> mopst_core::Result<FeatureCollection> {
        self.calls.borrow_mut().push(format!("convert {}", field));
        NativeToolbox.convert_to_numeric(table, field)
    }

    fn join_by_key(
        &self,
        left: &FeatureCollection,
        right: &FeatureCollection,
        params: &JoinParams,
    ) -> mopst_core::Result<JoinOutput> {
        self.calls.borrow_mut().push("join".into());
        NativeToolbox.join_by_key(left, right, params)
    }

    fn add_computed_field(
        &self,
        table: &FeatureCollection,
        field_name: &str,
        formula: &str,
    ) -> mopst_core::Result<FeatureCollection> {
        self.calls.borrow_mut().push(format!("calc {}", field_name));
        NativeToolbox.add_computed_field(table, field_name, formula)
    }

    fn rasterize_field(
        &self,
        table: &FeatureCollection,
        field: &str,
        template: &Raster<f64>,
    ) -> mopst_core::Result<Raster<f64>> {
        self.calls.borrow_mut().push(format!("rasterize {}", field));
        NativeToolbox.rasterize_field(table, field, template)
    }

    fn raster_algebra(
        &self,
        expression: &str,
        operands: &[&Raster<f64>],
    ) -> mopst_core::Result<Raster<f64>> {
        self.calls.borrow_mut().push(format!("algebra {}", expression));
        NativeToolbox.raster_algebra(expression, operands)
    }
}

/// Fails every cell-wise sum
struct FailingSum;

impl Toolbox for FailingSum {
    fn convert_to_numeric(
        &self,
        table: &FeatureCollection,
        field: &str,
    ) -> mopst_core::Result<FeatureCollection> {
        NativeToolbox.convert_to_numeric(table, field)
    }

    fn join_by_key(
        &self,
        left: &FeatureCollection,
        right: &FeatureCollection,
        params: &JoinParams,
    ) -> mopst_core::Result<JoinOutput> {
        NativeToolbox.join_by_key(left, right, params)
    }

    fn add_computed_field(
        &self,
        table: &FeatureCollection,
        field_name: &str,
        formula: &str,
    ) -> mopst_core::Result<FeatureCollection> {
        NativeToolbox.add_computed_field(table, field_name, formula)
    }

    fn rasterize_field(
        &self,
        table: &FeatureCollection,
        field: &str,
        template: &Raster<f64>,
    ) -> mopst_core::Result<Raster<f64>> {
        NativeToolbox.rasterize_field(table, field, template)
    }

    fn raster_algebra(
        &self,
        expression: &str,
        operands: &[&Raster<f64>],
    ) -> mopst_core::Result<Raster<f64>> {
        if expression == "A+B" {
            return Err(mopst_core::Error::Algorithm("grids are incompatible".into()));
        }
        NativeToolbox.raster_algebra(expression, operands)
    }
}

// ── Results ───────────────────────────────────────────────────────────

#[test]
fn baseline_and_scenario_sums() {
    let dir = tempfile::tempdir().unwrap();
    let result = completed(run_with(&NativeToolbox, &two_factor_inputs(dir.path())).unwrap());
    let root = dir.path();

    // baseline: 10*2 + 10*1
    assert_uniform(&read(root.join("pressure-summer.tif")), 30.0);
    assert_uniform(&read(root.join("opportunity-summer.tif")), 40.0);
    assert_uniform(&read(root.join("pressure-winter.tif")), 15.0);
    assert_uniform(&read(root.join("opportunity-winter.tif")), 20.0);

    // S1 multiplies each weighted layer: (10*2*2) + (10*1*2)
    let s1 = root.join("scenario-S1");
    assert_uniform(&read(s1.join("pressure-summer.tif")), 60.0);
    assert_uniform(&read(s1.join("opportunity-summer.tif")), 20.0);
    assert_uniform(&read(s1.join("pressure-winter.tif")), 30.0);
    assert_uniform(&read(s1.join("opportunity-winter.tif")), 10.0);

    assert_uniform(&read(root.join("base_landcover.tif")), 10.0);
    assert_uniform(&read(root.join("summer_landcover.tif")), 10.0);
    assert_uniform(&read(root.join("winter_landcover.tif")), 5.0);

    assert_eq!(result.output_dir, root);
    assert_eq!(result.layers.len(), 3 + 4 * 2);
}

#[test]
fn outputs_keep_the_template_grid() {
    let dir = tempfile::tempdir().unwrap();
    completed(run_with(&NativeToolbox, &two_factor_inputs(dir.path())).unwrap());

    let out = read(dir.path().join("scenario-S1/opportunity-winter.tif"));
    assert_eq!(out.shape(), (4, 4));
    assert!(out.transform().approx_eq(template().transform()));
}

#[test]
fn single_factor_is_not_summed() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = inputs(
        dir.path(),
        &["F1.tif"],
        &[fw("F1.tif", 2.0, 1.0)],
        &[sw("S1", "F1.tif", 0.5, 2.0)],
    );
    let toolbox = RecordingToolbox::default();
    completed(run_with(&toolbox, &inputs).unwrap());

    assert_eq!(toolbox.count("algebra A+B"), 0);
    assert_uniform(&read(dir.path().join("pressure-summer.tif")), 20.0);
    assert_uniform(&read(dir.path().join("scenario-S1/pressure-summer.tif")), 40.0);
}

#[test]
fn baseline_is_scaled_like_a_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = inputs(
        dir.path(),
        &["F1.tif"],
        &[fw("F1.tif", 2.0, 3.0)],
        &[sw("S1", "F1.tif", 0.5, 4.0)],
    );
    let toolbox = RecordingToolbox::default();
    completed(run_with(&toolbox, &inputs).unwrap());

    // identity multipliers for BASELINE, one call per quantity
    assert_eq!(toolbox.count("algebra A*1"), 4);
    assert_eq!(toolbox.count("algebra A*4"), 2);
    assert_eq!(toolbox.count("algebra A*0.5"), 2);
    assert_uniform(&read(dir.path().join("pressure-summer.tif")), 20.0);
    assert_uniform(&read(dir.path().join("opportunity-summer.tif")), 30.0);
}

#[test]
fn factor_order_does_not_change_sums() {
    let factor_rows = [
        fw("a.tif", 0.1, 0.7),
        fw("b.tif", 1.3, 0.2),
        fw("c.tif", 0.05, 2.9),
    ];
    let scenario_rows = [
        sw("S1", "a.tif", 0.3, 1.7),
        sw("S1", "b.tif", 1.1, 0.9),
        sw("S1", "c.tif", 2.0, 0.4),
    ];

    let forward = tempfile::tempdir().unwrap();
    let backward = tempfile::tempdir().unwrap();
    completed(
        run_with(
            &NativeToolbox,
            &inputs(forward.path(), &["a.tif", "b.tif", "c.tif"], &factor_rows, &scenario_rows),
        )
        .unwrap(),
    );
    completed(
        run_with(
            &NativeToolbox,
            &inputs(backward.path(), &["c.tif", "b.tif", "a.tif"], &factor_rows, &scenario_rows),
        )
        .unwrap(),
    );

    for rel in ["pressure-summer.tif", "opportunity-winter.tif", "scenario-S1/pressure-winter.tif"] {
        let a = read(forward.path().join(rel));
        let b = read(backward.path().join(rel));
        for (x, y) in a.data().iter().zip(b.data().iter()) {
            assert_relative_eq!(*x, *y, max_relative = 1e-6);
        }
    }
}

// ── Georeferenced template ────────────────────────────────────────

const PROJECTED_LANDCOVER: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    { "type": "Feature",
      "properties": { "Main_habit": "Heath" },
      "geometry": { "type": "Polygon", "coordinates": [[
        [500000,6200000],[500020,6200000],[500020,6200030],[500000,6200030],[500000,6200000]
      ]] } }
  ]
}"#;

const PROJECTED_SENSITIVITY: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    { "type": "Feature", "geometry": null,
      "properties": { "Habitat_environment_type": "Heath", "Sensitivity": "10" } }
  ]
}"#;

const PROJECTED_SEASONALITY: &str = r#"{
  "type": "FeatureCollection",
  "features": [
    { "type": "Feature", "geometry": null,
      "properties": { "Habitat_environment_type": "Heath", "Summer": 1, "Winter": 0.5 } }
  ]
}"#;

const PROJECTED_CONFIG: &str = r#"
landcover: landcover.geojson
landcover_sensitivity: sensitivity.geojson
sensitivity_score_field: Sensitivity
seasonality: seasonality.geojson
pressure_areas: pressure.tif
factors: [F1.tif]
factor_weights:
  - { factor: F1.tif, pressure: 2, opportunity: 1 }
scenario_weights:
  - { scenario: S1, factor: F1.tif, opportunity: 1, pressure: 2 }
output: out
"#;

#[test]
fn projected_template_read_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    std::fs::write(root.join("landcover.geojson"), PROJECTED_LANDCOVER).unwrap();
    std::fs::write(root.join("sensitivity.geojson"), PROJECTED_SENSITIVITY).unwrap();
    std::fs::write(root.join("seasonality.geojson"), PROJECTED_SEASONALITY).unwrap();
    std::fs::write(root.join("run.yaml"), PROJECTED_CONFIG).unwrap();

    // 3 rows x 4 cols of 10 m cells; the heath polygon covers cols 0-1
    let transform = GeoTransform::new(500_000.0, 6_200_030.0, 10.0, -10.0);
    let mut grid: Raster<f64> = Raster::new(3, 4);
    grid.set_transform(transform);
    write_geotiff(&grid, root.join("pressure.tif")).unwrap();
    write_geotiff(&grid, root.join("F1.tif")).unwrap();

    let inputs = RunConfig::load(root.join("run.yaml"))
        .unwrap()
        .load_inputs()
        .unwrap();
    assert!(inputs.pressure_areas.transform().approx_eq(&transform));

    let result = completed(run_with(&NativeToolbox, &inputs).unwrap());

    let baseline = read(result.output_dir.join("pressure-summer.tif"));
    assert!(baseline.transform().approx_eq(&transform));
    assert_relative_eq!(baseline.get(1, 0).unwrap(), 20.0);
    assert_relative_eq!(baseline.get(2, 1).unwrap(), 20.0);

    let s1 = read(result.output_dir.join("scenario-S1/pressure-summer.tif"));
    assert!(s1.transform().approx_eq(&transform));
    assert_relative_eq!(s1.get(0, 0).unwrap(), 40.0);
}

// ── Layout ────────────────────────────────────────────────────────────

#[test]
fn directory_layout_for_two_scenarios() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = inputs(
        dir.path(),
        &["F1.tif"],
        &[fw("F1.tif", 1.0, 1.0)],
        &[sw("S1", "F1.tif", 1.0, 1.0), sw("S2", "F1.tif", 2.0, 2.0)],
    );
    let result = completed(run_with(&NativeToolbox, &inputs).unwrap());

    let mut expected = vec![
        "opportunity-summer.tif",
        "opportunity-winter.tif",
        "pressure-summer.tif",
        "pressure-winter.tif",
    ];
    expected.sort();
    for scenario in ["S1", "S2"] {
        let sub = dir.path().join(format!("scenario-{}", scenario));
        let mut names: Vec<String> = std::fs::read_dir(&sub)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, expected);
    }

    for name in ["base_landcover.tif", "summer_landcover.tif", "winter_landcover.tif"] {
        assert!(dir.path().join(name).is_file());
    }
    let log = std::fs::read_to_string(dir.path().join("execution-log.txt")).unwrap();
    assert!(!log.trim().is_empty());
    assert!(log.contains("Process scenario 'S2'."));
    assert_eq!(result.log_path, dir.path().join("execution-log.txt"));
}

#[test]
fn layers_are_grouped_by_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let result = completed(run_with(&NativeToolbox, &two_factor_inputs(dir.path())).unwrap());

    let names: Vec<_> = result.groups.iter().map(|g| g.scenario.to_string()).collect();
    assert_eq!(names, ["S1", "BASELINE"]);

    let s1 = result.group("S1").unwrap();
    assert_eq!(s1.layers.len(), 4);
    assert!(s1.layers.iter().all(|p| p.starts_with(dir.path().join("scenario-S1"))));

    let baseline = result.group("BASELINE").unwrap();
    assert_eq!(baseline.layers.len(), 7);
    assert!(baseline.layers[0].ends_with("base_landcover.tif"));
}

// ── Errors ────────────────────────────────────────────────────────────

#[test]
fn missing_factor_weight_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("run");
    let inputs = inputs(
        &out,
        &["F1.tif", "F3.tif"],
        &[fw("F1.tif", 1.0, 1.0)],
        &[sw("S1", "F1.tif", 1.0, 1.0)],
    );

    let err = run_with(&NativeToolbox, &inputs).unwrap_err();
    assert!(matches!(
        err,
        Error::Weight(WeightError::MissingFactorWeight { ref factor }) if factor == "F3.tif"
    ));
    assert!(err.to_string().contains("F3.tif"));
    assert!(!out.exists());
}

#[test]
fn missing_scenario_multiplier_names_pair() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = inputs(
        &dir.path().join("run"),
        &["F1.tif", "F2.tif"],
        &[fw("F1.tif", 1.0, 1.0), fw("F2.tif", 1.0, 1.0)],
        &[sw("S1", "F1.tif", 1.0, 1.0)],
    );

    let err = run_with(&NativeToolbox, &inputs).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Could not find pressure and opportunity multipliers for scenario S1 and factor file F2.tif."
    );
}

#[test]
fn no_factors_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let inputs = inputs(dir.path(), &[], &[], &[]);
    assert!(matches!(run_with(&NativeToolbox, &inputs), Err(Error::NoFactors)));
}

#[test]
fn collaborator_failure_propagates_with_step() {
    let dir = tempfile::tempdir().unwrap();
    let err = run_with(&FailingSum, &two_factor_inputs(dir.path())).unwrap_err();
    match err {
        Error::Collaborator { step, source } => {
            assert!(step.starts_with("Sum"));
            assert!(matches!(source, mopst_core::Error::Algorithm(_)));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(!dir.path().join("execution-log.txt").exists());
}

// ── Steps and cancellation ────────────────────────────────────────────

#[test]
fn collaborator_calls_match_step_count() {
    let dir = tempfile::tempdir().unwrap();
    let toolbox = RecordingToolbox::default();
    let inputs = two_factor_inputs(dir.path());
    let mut feedback = Feedback::new();
    completed(Pipeline::new(&toolbox, &mut feedback).run(&inputs).unwrap());

    assert_eq!(toolbox.count("convert"), 1);
    assert_eq!(toolbox.count("join"), 2);
    assert_eq!(toolbox.count("calc"), 2);
    assert_eq!(toolbox.count("rasterize"), 3);
    // per factor: 4 weighted, then 4 scaled for S1 and 4 for BASELINE;
    // 4 sums per scenario for the 2nd factor
    assert_eq!(toolbox.count("algebra A*"), 24);
    assert_eq!(toolbox.count("algebra A+B"), 8);

    assert_eq!(toolbox.calls.borrow().len(), step_count(2, 1));
    assert_eq!(feedback.current_step(), feedback.total_steps());
}

#[test]
fn cancellation_stops_between_steps() {
    let dir = tempfile::tempdir().unwrap();
    let toolbox = RecordingToolbox::default();
    let inputs = two_factor_inputs(dir.path());

    let feedback = Feedback::new();
    let token = feedback.cancel_token();
    let mut feedback = feedback.with_progress(move |current, _| {
        if current == 10 {
            token.cancel();
        }
    });

    let status = Pipeline::new(&toolbox, &mut feedback).run(&inputs).unwrap();
    assert!(status.is_cancelled());
    assert_eq!(toolbox.calls.borrow().len(), 10);
    assert!(!dir.path().join("pressure-summer.tif").exists());
    assert!(!dir.path().join("execution-log.txt").exists());
}

#[test]
fn token_cancelled_from_another_thread() {
    let dir = tempfile::tempdir().unwrap();
    let toolbox = RecordingToolbox::default();
    let inputs = two_factor_inputs(dir.path());

    let mut feedback = Feedback::new();
    let token = feedback.cancel_token();
    std::thread::spawn(move || token.cancel()).join().unwrap();
    assert!(feedback.is_cancelled());

    let status = Pipeline::new(&toolbox, &mut feedback).run(&inputs).unwrap();
    assert!(status.is_cancelled());
    // the flag is checked after the step in flight
    assert_eq!(toolbox.calls.borrow().len(), 1);
    assert!(!dir.path().join("execution-log.txt").exists());
}

#[test]
fn unused_opportunity_raster_is_logged() {
    let dir = tempfile::tempdir().unwrap();
    let mut inputs = two_factor_inputs(dir.path());
    inputs.opportunity_areas = Some(PathBuf::from("opportunity.tif"));

    let result = completed(run_with(&NativeToolbox, &inputs).unwrap());
    let log = std::fs::read_to_string(result.log_path).unwrap();
    assert!(log.contains("opportunity.tif"));
    assert!(log.contains("not used"));
}
