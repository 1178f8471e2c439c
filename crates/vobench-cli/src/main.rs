use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vobench_runner::{BenchError, DatasetSelector, PlanRequest};

#[derive(Parser)]
#[command(name = "vobench", version = "0.3.0", about = "VIO benchmark batch runner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AlgorithmArg {
    #[value(name = "rovioli")]
    Rovioli,
    #[value(name = "vinsfusion")]
    VinsFusion,
}

impl From<AlgorithmArg> for vobench_runner::Algorithm {
    fn from(value: AlgorithmArg) -> Self {
        match value {
            AlgorithmArg::Rovioli => vobench_runner::Algorithm::Rovioli,
            AlgorithmArg::VinsFusion => vobench_runner::Algorithm::VinsFusion,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OnMissingArg {
    #[value(name = "abort")]
    Abort,
    #[value(name = "continue")]
    Continue,
}

impl From<OnMissingArg> for vobench_runner::MissingArtifactPolicy {
    fn from(value: OnMissingArg) -> Self {
        match value {
            OnMissingArg::Abort => vobench_runner::MissingArtifactPolicy::Abort,
            OnMissingArg::Continue => vobench_runner::MissingArtifactPolicy::Continue,
        }
    }
}

#[derive(Args, Debug)]
struct Selection {
    #[arg(long, value_enum)]
    algorithm: AlgorithmArg,
    /// all | euroc | tumvi
    #[arg(short = 'd', long, default_value = "all")]
    dataset: String,
    /// Runs per (sequence, variant)
    #[arg(short = 't', long, default_value_t = 5)]
    num_repetitions: usize,
    /// Index into the sorted sequence list, -1 means all
    #[arg(short = 's', long, default_value_t = -1, allow_negative_numbers = true)]
    sequence_index: i64,
    /// YAML file overriding paths, timing and sequence abbreviations
    #[arg(long)]
    config: Option<PathBuf>,
}

impl Selection {
    fn to_request(&self) -> Result<PlanRequest, BenchError> {
        let sequence_index = match self.sequence_index {
            -1 => None,
            i if i >= 0 => Some(i as usize),
            i => {
                return Err(BenchError::config(format!(
                    "invalid sequence index {}: use -1 for all sequences",
                    i
                )))
            }
        };
        Ok(PlanRequest {
            algorithm: self.algorithm.into(),
            selector: DatasetSelector::parse(&self.dataset)?,
            num_repetitions: self.num_repetitions,
            sequence_index,
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Execute every run of the plan that has no output yet
    Run {
        #[command(flatten)]
        selection: Selection,
        #[arg(long, value_enum, default_value = "abort")]
        on_missing: OnMissingArg,
        #[arg(long)]
        json: bool,
    },
    /// Print the plan without launching anything
    Plan {
        #[command(flatten)]
        selection: Selection,
        #[arg(long)]
        json: bool,
    },
    /// Convert one raw algorithm output into the canonical trajectory format
    Normalize {
        #[arg(long, value_enum)]
        algorithm: AlgorithmArg,
        #[arg(long)]
        raw: PathBuf,
        #[arg(long)]
        out: PathBuf,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("vobench=info,vobench_runner=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json_mode = command_json_mode(&cli.command);
    let result = run_command(cli.command);
    match result {
        Ok(Some(payload)) => {
            emit_json(&payload);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(err) => {
            if json_mode {
                emit_json(&json_error(error_code(&err), err.to_string(), json!({})));
                std::process::exit(1);
            }
            Err(err)
        }
    }
}

fn run_command(command: Commands) -> Result<Option<Value>> {
    match command {
        Commands::Run {
            selection,
            on_missing,
            json,
        } => {
            let request = selection.to_request()?;
            let result = vobench_runner::run_benchmark(
                selection.config.as_deref(),
                &request,
                on_missing.into(),
            )?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "run",
                    "summary": summary_to_json(&result.plan),
                    "report": result.report,
                    "on_missing": vobench_runner::MissingArtifactPolicy::from(on_missing),
                })));
            }
            print_summary(&result.plan);
            println!("planned: {}", result.report.planned);
            println!("skipped: {}", result.report.skipped);
            println!("executed: {}", result.report.executed);
            if result.report.failed > 0 {
                println!("failed: {}", result.report.failed);
            }
        }
        Commands::Plan { selection, json } => {
            let request = selection.to_request()?;
            let summary =
                vobench_runner::describe_benchmark(selection.config.as_deref(), &request)?;
            if json {
                let runs: Vec<Value> = summary.plan.runs().iter().map(|r| r.to_json()).collect();
                return Ok(Some(json!({
                    "ok": true,
                    "command": "plan",
                    "summary": summary_to_json(&summary),
                    "runs": runs,
                })));
            }
            print_summary(&summary);
            for (idx, run) in summary.plan.runs().iter().enumerate() {
                let state = if vobench_runner::is_complete(&run.output_path) {
                    "done"
                } else {
                    "pending"
                };
                println!(
                    "[{}/{}] {} {} -> {}",
                    idx + 1,
                    summary.total_runs,
                    state,
                    run.invocation,
                    run.output_path.display()
                );
            }
        }
        Commands::Normalize {
            algorithm,
            raw,
            out,
            json,
        } => {
            let rows = vobench_runner::normalize_raw_output(algorithm.into(), &raw, &out)?;
            if json {
                return Ok(Some(json!({
                    "ok": true,
                    "command": "normalize",
                    "rows": rows,
                    "output": out.display().to_string(),
                })));
            }
            println!("rows: {}", rows);
            println!("output: {}", out.display());
        }
    }
    Ok(None)
}

fn emit_json(value: &Value) {
    match serde_json::to_string(value) {
        Ok(s) => println!("{}", s),
        Err(_) => println!(
            "{{\"ok\":false,\"error\":{{\"code\":\"serialization_error\",\"message\":\"failed to serialize JSON payload\",\"details\":{{}}}}}}"
        ),
    }
}

fn json_error(code: &str, message: String, details: Value) -> Value {
    json!({
        "ok": false,
        "error": {
            "code": code,
            "message": message,
            "details": details
        }
    })
}

fn error_code(err: &anyhow::Error) -> &'static str {
    err.downcast_ref::<BenchError>()
        .map(BenchError::code)
        .unwrap_or("command_failed")
}

fn command_json_mode(command: &Commands) -> bool {
    match command {
        Commands::Run { json, .. } | Commands::Plan { json, .. } | Commands::Normalize { json, .. } => {
            *json
        }
    }
}

fn summary_to_json(summary: &vobench_runner::PlanSummary) -> Value {
    json!({
        "algorithm": summary.algorithm,
        "datasets": summary.datasets,
        "output_root": summary.output_root.display().to_string(),
        "total_runs": summary.total_runs,
        "pending_runs": summary.pending_runs,
    })
}

fn print_summary(summary: &vobench_runner::PlanSummary) {
    println!("algorithm: {}", summary.algorithm);
    let datasets: Vec<&str> = summary.datasets.iter().map(|d| d.dir_name()).collect();
    println!("datasets: {}", datasets.join(", "));
    println!("output_root: {}", summary.output_root.display());
    println!("total_runs: {}", summary.total_runs);
    println!("pending_runs: {}", summary.pending_runs);
}
