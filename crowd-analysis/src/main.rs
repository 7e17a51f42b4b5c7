use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crowd_common::{PrimarySlot, StaticRecord, TraceLayout, Trajectory};
use env_logger::Builder;
use log::{info, warn, LevelFilter};
use serde::Serialize;
use std::path::{Path, PathBuf};

mod aggregate;
mod metrics;
mod plot;
mod results;

use aggregate::{group_for, group_runs, MetricGroup};
use metrics::{cumulative_distance, MetricKind, RunMetrics};

/// Post-processing for simulator traces: per-run metrics and their
/// aggregation across heuristic parameter values.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compute the metrics of one run and append them to the results store
    Compute {
        #[command(flatten)]
        trace: TraceArgs,

        /// Heuristic parameter value the run was simulated with
        #[arg(short, long, allow_negative_numbers = true)]
        param: f64,

        /// Results store to append to
        #[arg(short, long, default_value = "results.txt")]
        results: PathBuf,
    },

    /// Plot the mean ± stdev of one metric against the heuristic parameter
    Plot {
        /// Metric to plot
        #[arg(short, long, value_enum)]
        metric: MetricKind,

        /// Results store to read
        #[arg(short, long, default_value = "results.txt")]
        results: PathBuf,

        /// Output image path (.png); defaults to `<metric>_vs_param.png`
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Caption for the heuristic parameter axis
        #[arg(long, default_value = "Heuristic parameter")]
        param_label: String,

        /// Image width in pixels
        #[arg(long, default_value_t = 1024)]
        width: u32,

        /// Image height in pixels
        #[arg(long, default_value_t = 768)]
        height: u32,
    },

    /// Print aggregated statistics for every metric
    Summary {
        /// Results store to read
        #[arg(short, long, default_value = "results.txt")]
        results: PathBuf,

        /// Only report runs recorded under this parameter value
        #[arg(short, long, allow_negative_numbers = true)]
        param: Option<f64>,

        /// Also write the summary as CSV
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Also write the summary as JSON
        #[arg(long)]
        json: Option<PathBuf>,
    },

    /// Plot the cumulative distance travelled by the primary agent over time
    DistanceCurve {
        #[command(flatten)]
        trace: TraceArgs,

        /// Output image path (.png)
        #[arg(short, long, default_value = "distance_curve.png")]
        output: PathBuf,

        /// Image width in pixels
        #[arg(long, default_value_t = 1024)]
        width: u32,

        /// Image height in pixels
        #[arg(long, default_value_t = 768)]
        height: u32,
    },
}

/// Where to find a run's trace and the static configuration describing it.
#[derive(clap::Args, Debug)]
struct TraceArgs {
    /// Simulator trace file
    #[arg(short, long, default_value = "output.txt")]
    trace: PathBuf,

    /// Static configuration file the run was generated with
    #[arg(short = 's', long, default_value = "static.txt")]
    static_file: PathBuf,

    /// Position of the primary agent in the agent ordering (first, last)
    #[arg(long, default_value_t = PrimarySlot::First)]
    primary: PrimarySlot,
}

impl TraceArgs {
    /// Loads the trace, checking its arity against the static configuration.
    /// Returns the trajectory together with every agent's radius.
    fn load(&self) -> Result<(Trajectory, Vec<f64>)> {
        let record = StaticRecord::load(&self.static_file)
            .with_context(|| format!("Failed to read static configuration '{}'", self.static_file.display()))?;
        let radii = record.radii();
        info!("Static configuration declares {} agents", radii.len());

        let layout = TraceLayout { agent_count: Some(radii.len()), primary: self.primary };
        let trajectory = Trajectory::load(&self.trace, layout)
            .with_context(|| format!("Failed to extract trajectories from '{}'", self.trace.display()))?;
        info!(
            "Trace holds {} time steps for {} agents (primary agent {})",
            trajectory.times.len(),
            trajectory.agent_count(),
            trajectory.primary
        );
        Ok((trajectory, radii))
    }
}

/// One line of the aggregated summary.
#[derive(Debug, Clone, Serialize, PartialEq)]
struct SummaryRow {
    heuristic_param: f64,
    metric: &'static str,
    runs: usize,
    mean: f64,
    stdev: f64,
}

fn summary_rows(groups: &[MetricGroup]) -> Vec<SummaryRow> {
    groups
        .iter()
        .flat_map(|group| {
            MetricKind::ALL.into_iter().map(move |kind| {
                let stat = group.stat(kind);
                SummaryRow {
                    heuristic_param: stat.heuristic_param,
                    metric: kind.key(),
                    runs: group.runs.len(),
                    mean: stat.mean,
                    stdev: stat.stdev,
                }
            })
        })
        .collect()
}

fn compute_command(trace: &TraceArgs, param: f64, results_path: &Path) -> Result<RunMetrics> {
    let (trajectory, radii) = trace.load()?;
    let run = RunMetrics::compute(&trajectory, &radii, param).context("Failed to compute run metrics")?;

    info!("The time taken to reach the goal was {}", run.elapsed_time);
    info!("The distance travelled by the particle was {}", run.distance_travelled);
    info!("The mean speed of the particle was {}", run.mean_speed);
    info!("The particle collided {} times", run.collision_count);

    results::append_run(results_path, &run)
        .with_context(|| format!("Failed to append to results store '{}'", results_path.display()))?;
    info!("Run with parameter {} appended to {}", param, results_path.display());
    Ok(run)
}

fn load_store(path: &Path) -> Result<Vec<RunMetrics>> {
    let runs = results::load_runs(path)
        .with_context(|| format!("Failed to read results store '{}'", path.display()))?;
    if runs.is_empty() {
        warn!("Results store '{}' holds no runs", path.display());
    } else {
        info!("Loaded {} runs from {}", runs.len(), path.display());
    }
    Ok(runs)
}

fn summary_command(
    results_path: &Path,
    param: Option<f64>,
    csv_path: Option<&Path>,
    json_path: Option<&Path>,
) -> Result<Vec<SummaryRow>> {
    let runs = load_store(results_path)?;
    let groups = match param {
        Some(p) => vec![group_for(&runs, p)?],
        None => group_runs(&runs),
    };
    let rows = summary_rows(&groups);

    println!("{:>12} {:>6} {:>5} {:>14} {:>14}", "param", "metric", "runs", "mean", "stdev");
    for row in &rows {
        println!(
            "{:>12} {:>6} {:>5} {:>14.6} {:>14.6}",
            row.heuristic_param, row.metric, row.runs, row.mean, row.stdev
        );
    }

    if let Some(path) = csv_path {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create CSV file '{}'", path.display()))?;
        for row in &rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        info!("Summary saved to {}", path.display());
    }
    if let Some(path) = json_path {
        let json_string = serde_json::to_string_pretty(&rows)?;
        std::fs::write(path, json_string)
            .with_context(|| format!("Failed to write JSON file '{}'", path.display()))?;
        info!("Summary saved to {}", path.display());
    }
    Ok(rows)
}

fn run_with_args(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Compute { trace, param, results } => {
            compute_command(&trace, param, &results)?;
        }
        Command::Plot { metric, results, output, param_label, width, height } => {
            let runs = load_store(&results)?;
            let stats = aggregate::aggregate(&runs, metric);
            let output = output.unwrap_or_else(|| PathBuf::from(format!("{}_vs_param.png", metric.key())));
            plot::plot_aggregate(&stats, metric, &param_label, &output, (width, height))?;
        }
        Command::Summary { results, param, csv, json } => {
            summary_command(&results, param, csv.as_deref(), json.as_deref())?;
        }
        Command::DistanceCurve { trace, output, width, height } => {
            let (trajectory, _) = trace.load()?;
            let cumulative = cumulative_distance(&trajectory.primary_series().positions);
            plot::plot_distance_curve(&trajectory.times, &cumulative, &output, (width, height))?;
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    // Initialize logger
    Builder::from_default_env()
        .filter(None, LevelFilter::Info)
        .init();

    info!("Starting crowd trace analysis...");
    run_with_args(Cli::parse())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crowd_common::CrowdError;

    const STATIC: &str = "10 10\n0.5 0.3\n1.3 0.5 2\n0.5 70\n0.5 70\n";
    const TRACE: &str = "0\n0 0 0 0\n0.5 0 0 0\n1\n3 0 3 0\n9 9 0 0\n2\n3 4 0 4\n9 9 0 0\n";

    fn write_inputs(dir: &Path) -> TraceArgs {
        let static_file = dir.join("static.txt");
        let trace = dir.join("output.txt");
        std::fs::write(&static_file, STATIC).unwrap();
        std::fs::write(&trace, TRACE).unwrap();
        TraceArgs { trace, static_file, primary: PrimarySlot::First }
    }

    #[test]
    fn compute_appends_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let trace = write_inputs(dir.path());
        let store = dir.path().join("results.txt");

        let run = compute_command(&trace, 0.5, &store).unwrap();
        assert_eq!(run.elapsed_time, 2.0);
        assert_eq!(run.distance_travelled, 7.0);
        assert_eq!(run.mean_speed, 3.5);
        assert_eq!(run.collision_count, 1);

        compute_command(&trace, 1.0, &store).unwrap();
        let runs = results::load_runs(&store).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0], run);
        assert_eq!(runs[1].heuristic_param, 1.0);
    }

    #[test]
    fn trace_with_fewer_agents_than_static_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut trace = write_inputs(dir.path());
        let static_file = dir.path().join("three.txt");
        std::fs::write(&static_file, "10 10\n3\n0.5\n0.5\n0.5\n").unwrap();
        trace.static_file = static_file;

        let err = trace.load().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CrowdError>(),
            Some(CrowdError::MissingAgentData { expected: 3, found: 2, .. })
        ));
    }

    #[test]
    fn summary_exports_csv_and_json() {
        let dir = tempfile::tempdir().unwrap();
        let trace = write_inputs(dir.path());
        let store = dir.path().join("results.txt");
        compute_command(&trace, 2.0, &store).unwrap();
        compute_command(&trace, 2.0, &store).unwrap();
        compute_command(&trace, 1.0, &store).unwrap();

        let csv_path = dir.path().join("summary.csv");
        let json_path = dir.path().join("summary.json");
        let rows = summary_command(&store, None, Some(&csv_path), Some(&json_path)).unwrap();
        assert_eq!(rows.len(), 8);
        assert_eq!(rows[0].heuristic_param, 1.0);
        assert_eq!(rows[4].runs, 2);
        assert_eq!(rows[5].metric, "d");
        assert_eq!(rows[5].stdev, 0.0);

        let csv_text = std::fs::read_to_string(&csv_path).unwrap();
        assert_eq!(csv_text.lines().next(), Some("heuristic_param,metric,runs,mean,stdev"));
        assert_eq!(csv_text.lines().count(), 9);

        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
        assert_eq!(json.as_array().map(|a| a.len()), Some(8));
    }

    #[test]
    fn summary_for_unknown_param_is_an_empty_group() {
        let dir = tempfile::tempdir().unwrap();
        let trace = write_inputs(dir.path());
        let store = dir.path().join("results.txt");
        compute_command(&trace, 2.0, &store).unwrap();

        let err = summary_command(&store, Some(3.0), None, None).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CrowdError>(),
            Some(CrowdError::EmptyMetricGroup { .. })
        ));
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::parse_from(["crowd-analysis", "compute", "-t", "run.txt", "-p", "0.25", "--primary", "last"]);
        match cli.command {
            Command::Compute { trace, param, results } => {
                assert_eq!(trace.trace, PathBuf::from("run.txt"));
                assert_eq!(trace.static_file, PathBuf::from("static.txt"));
                assert_eq!(trace.primary, PrimarySlot::Last);
                assert_eq!(param, 0.25);
                assert_eq!(results, PathBuf::from("results.txt"));
            }
            other => panic!("unexpected command {:?}", other),
        }

        let cli = Cli::parse_from(["crowd-analysis", "plot", "--metric", "v"]);
        assert!(matches!(cli.command, Command::Plot { metric: MetricKind::MeanSpeed, .. }));
    }
}
