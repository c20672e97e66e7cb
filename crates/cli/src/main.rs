//! MOPST CLI - pressure and opportunity mapping for baseline and scenarios

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use mopst_core::io::read_geotiff;
use mopst_engine::{
    plan_factors, step_count, CancelToken, Feedback, NativeToolbox, Pipeline, RunConfig,
    RunStatus,
};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "mopst")]
#[command(author, version, about = "Pressure and opportunity mapping for baseline and scenarios", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a configured scoring job
    Run {
        /// YAML run configuration
        config: PathBuf,
        /// Output directory (overrides `output` in the configuration)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Validate a configuration and its weight tables without running
    Check {
        /// YAML run configuration
        config: PathBuf,
    },
    /// Show information about a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;
    Ok(())
}

fn progress_bar() -> Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} steps")
            .context("invalid progress template")?,
    );
    Ok(pb)
}

/// Cancel `token` on Ctrl+C; the run stops after its current step
fn cancel_on_ctrl_c(token: CancelToken) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start signal handler")?;
    std::thread::spawn(move || {
        runtime.block_on(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping after the current step...");
                token.cancel();
            }
        });
    });
    Ok(())
}

fn load_config(path: &Path) -> Result<RunConfig> {
    RunConfig::load(path).with_context(|| format!("Failed to load configuration {}", path.display()))
}

// ─── Commands ───────────────────────────────────────────────────────────

fn run(config: &Path, output: Option<PathBuf>) -> Result<()> {
    let start = Instant::now();
    let mut config = load_config(config)?;
    if let Some(output) = output {
        config = config.with_output(output);
    }
    let inputs = config.load_inputs().context("Failed to read inputs")?;

    let feedback = Feedback::new();
    cancel_on_ctrl_c(feedback.cancel_token())?;

    let pb = progress_bar()?;
    let bar = pb.clone();
    let mut feedback = feedback.with_progress(move |current, total| {
        bar.set_length(total as u64);
        bar.set_position(current as u64);
    });

    let status = Pipeline::new(&NativeToolbox, &mut feedback)
        .run(&inputs)
        .context("Scoring run failed")?;
    pb.finish_and_clear();

    match status {
        RunStatus::Completed(result) => {
            for group in &result.groups {
                println!("{}:", group.scenario);
                for layer in &group.layers {
                    println!("  {}", layer.display());
                }
            }
            println!("Results saved to: {}", result.output_dir.display());
            println!("Execution log: {}", result.log_path.display());
            println!("  Processing time: {:.2?}", start.elapsed());
            Ok(())
        }
        RunStatus::Cancelled => bail!("run cancelled; files already written remain in place"),
    }
}

fn check(config: &Path) -> Result<()> {
    let config = load_config(config)?;
    let table = config.weight_table().context("Invalid weight tables")?;
    let set = table.scenario_set();
    let plans = plan_factors(&config.factors, &table, &set).context("Weights do not cover the factors")?;

    println!("Factors:");
    for plan in &plans {
        println!(
            "  {}  pressure {}  opportunity {}",
            plan.file_name, plan.weights.pressure, plan.weights.opportunity
        );
    }
    println!("Scenarios:");
    for (_, name) in set.iter() {
        println!("  {}", name);
    }
    println!("Steps: {}", step_count(plans.len(), set.named_count()));
    println!("Output: {}", config.output.display());
    info!("configuration is valid");
    Ok(())
}

fn raster_info(input: &Path) -> Result<()> {
    let raster: mopst_core::Raster<f64> = read_geotiff(input).context("Failed to read raster")?;
    let (rows, cols) = raster.shape();
    let (pw, ph) = raster.pixel_size();
    let bounds = raster.bounds();
    let stats = raster.statistics();

    println!("File: {}", input.display());
    println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
    println!("Pixel size: {} x {}", pw, ph);
    println!(
        "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
        bounds.0, bounds.1, bounds.2, bounds.3
    );
    if let Some(nodata) = raster.nodata() {
        println!("NoData: {}", nodata);
    }
    println!("\nStatistics:");
    if let Some(min) = stats.min {
        println!("  Min: {:.4}", min);
    }
    if let Some(max) = stats.max {
        println!("  Max: {:.4}", max);
    }
    if let Some(mean) = stats.mean {
        println!("  Mean: {:.4}", mean);
    }
    if !raster.is_empty() {
        println!(
            "  Valid cells: {} ({:.1}%)",
            stats.valid_count,
            100.0 * stats.valid_count as f64 / raster.len() as f64
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Run { config, output } => run(&config, output),
        Commands::Check { config } => check(&config),
        Commands::Info { input } => raster_info(&input),
    }
}
