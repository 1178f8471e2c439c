//! Batch orchestration of VIO algorithms over recorded sequences.
//!
//! A batch is planned once ([`generate_plan`]), then executed run by run
//! ([`BatchExecutor`]). The only state that survives a batch is the set of
//! canonical trajectory files under the output root; rerunning a batch skips
//! every run whose file already exists.

pub mod algorithm;
pub mod config;
pub mod dataset;
pub mod error;
pub mod executor;
pub mod normalize;
pub mod output;
pub mod plan;
pub mod process;
pub mod sequence;

pub use algorithm::{Algorithm, Invocation, Variant};
pub use config::{BenchConfig, Timing};
pub use dataset::{Dataset, DatasetSelector};
pub use error::{BenchError, Result};
pub use executor::{BatchExecutor, BatchReport, MissingArtifactPolicy};
pub use normalize::{normalize_trajectory, RawSchema, CANONICAL_COLUMNS, POSE_DIM};
pub use output::{is_complete, OutputLayout};
pub use plan::{generate_plan, BatchPlan, PlanRequest, RunDescriptor};
pub use process::{CommandLine, ManagedProcess, ProcessLauncher, SystemLauncher};
pub use sequence::SequenceRegistry;

use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone)]
pub struct PlanSummary {
    pub algorithm: Algorithm,
    pub datasets: Vec<Dataset>,
    pub output_root: PathBuf,
    pub total_runs: usize,
    pub pending_runs: usize,
    pub plan: BatchPlan,
}

pub struct RunSummary {
    pub plan: PlanSummary,
    pub report: BatchReport,
}

/// Builds the plan for `request` without running anything.
pub fn describe_benchmark(config_path: Option<&Path>, request: &PlanRequest) -> Result<PlanSummary> {
    let config = BenchConfig::load_or_default(config_path)?;
    describe_with_config(&config, request)
}

pub fn describe_with_config(config: &BenchConfig, request: &PlanRequest) -> Result<PlanSummary> {
    let registry = SequenceRegistry::new(config.sequence_abbrevs.clone());
    let plan = generate_plan(config, &registry, request)?;
    let pending_runs = plan
        .runs()
        .iter()
        .filter(|r| !is_complete(&r.output_path))
        .count();
    Ok(PlanSummary {
        algorithm: request.algorithm,
        datasets: request.selector.datasets(),
        output_root: config.output_root.clone(),
        total_runs: plan.len(),
        pending_runs,
        plan,
    })
}

pub fn run_benchmark(
    config_path: Option<&Path>,
    request: &PlanRequest,
    policy: MissingArtifactPolicy,
) -> Result<RunSummary> {
    let config = BenchConfig::load_or_default(config_path)?;
    run_benchmark_with_launcher(&config, request, policy, &SystemLauncher)
}

/// Checks base directories, plans, and executes. Configuration problems are
/// reported before any process is launched.
pub fn run_benchmark_with_launcher(
    config: &BenchConfig,
    request: &PlanRequest,
    policy: MissingArtifactPolicy,
    launcher: &dyn ProcessLauncher,
) -> Result<RunSummary> {
    config.check_base_paths(request.algorithm.needs_config_dir())?;
    let summary = describe_with_config(config, request)?;
    info!(
        algorithm = %summary.algorithm,
        total = summary.total_runs,
        pending = summary.pending_runs,
        "starting batch"
    );
    let broker = CommandLine::from_argv(&config.broker_command)?;
    let report = BatchExecutor::new(launcher, broker, &config.output_root, config.timing)
        .with_policy(policy)
        .execute(&summary.plan)?;
    Ok(RunSummary {
        plan: summary,
        report,
    })
}

/// Normalizes one raw output file by hand, e.g. after fixing a run manually.
pub fn normalize_raw_output(algorithm: Algorithm, raw_path: &Path, output_path: &Path) -> Result<usize> {
    if output::is_complete(output_path) {
        return Err(BenchError::config(format!(
            "refusing to overwrite existing trajectory {}",
            output_path.display()
        )));
    }
    normalize_trajectory(raw_path, output_path, &algorithm.raw_schema())
}
