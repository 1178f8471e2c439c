use crate::algorithm::{Algorithm, Invocation, Variant};
use crate::config::BenchConfig;
use crate::dataset::{list_recordings, Dataset, DatasetSelector};
use crate::error::{BenchError, Result};
use crate::normalize::RawSchema;
use crate::output::OutputLayout;
use crate::sequence::SequenceRegistry;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct PlanRequest {
    pub algorithm: Algorithm,
    pub selector: DatasetSelector,
    pub num_repetitions: usize,
    /// Index into the sorted recording list; `None` means every sequence.
    pub sequence_index: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct RunDescriptor {
    pub algorithm: Algorithm,
    pub dataset: Dataset,
    pub sequence_name: String,
    pub sequence_path: PathBuf,
    pub sequence_abbrev: String,
    pub variant: Option<Variant>,
    pub repetition_index: usize,
    pub invocation: Invocation,
    pub raw_output_path: PathBuf,
    pub output_path: PathBuf,
}

impl RunDescriptor {
    pub fn raw_schema(&self) -> RawSchema {
        self.algorithm.raw_schema()
    }

    /// `<outname>[_<variant>]`, the executer label used in logs.
    pub fn executer(&self) -> String {
        match &self.variant {
            Some(v) => format!("{}_{}", self.algorithm.outname(), v.id),
            None => self.algorithm.outname().to_string(),
        }
    }

    pub fn config_json(&self) -> Value {
        json!({
            "executer": self.executer(),
            "config": self.variant.as_ref().map(|v| v.config_file.display().to_string()),
            "dataset": self.dataset.dir_name(),
            "seq_name": self.sequence_name,
            "seq_id": self.sequence_abbrev,
            "test_id": self.repetition_index,
        })
    }

    pub fn to_json(&self) -> Value {
        json!({
            "config": self.config_json(),
            "shape": self.invocation.shape(),
            "commands": self.invocation.commands().iter().map(|c| c.argv()).collect::<Vec<_>>(),
            "raw_output_path": self.raw_output_path.display().to_string(),
            "output_path": self.output_path.display().to_string(),
        })
    }
}

/// Ordered, immutable list of runs. Output paths are unique by construction.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    runs: Vec<RunDescriptor>,
}

impl BatchPlan {
    pub fn new(runs: Vec<RunDescriptor>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for run in &runs {
            if !seen.insert(run.output_path.clone()) {
                return Err(BenchError::config(format!(
                    "two runs share output path {} (sequence '{}' abbreviates to '{}')",
                    run.output_path.display(),
                    run.sequence_name,
                    run.sequence_abbrev
                )));
            }
        }
        Ok(Self { runs })
    }

    pub fn runs(&self) -> &[RunDescriptor] {
        &self.runs
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

pub fn generate_plan(
    config: &BenchConfig,
    registry: &SequenceRegistry,
    request: &PlanRequest,
) -> Result<BatchPlan> {
    if request.num_repetitions == 0 {
        return Err(BenchError::config("number of repetitions must be at least 1"));
    }
    if request.selector == DatasetSelector::All {
        check_all_datasets_present(&config.data_root)?;
    }
    let layout = OutputLayout::new(&config.output_root);
    let mut runs = Vec::new();
    for dataset in request.selector.datasets() {
        runs.extend(dataset_runs(config, registry, &layout, request, dataset)?);
    }
    info!("===== Total {} runs", runs.len());
    BatchPlan::new(runs)
}

/// `all` needs every recordings dir. When only some exist, the error names
/// the single-dataset selectors that would work.
fn check_all_datasets_present(data_root: &Path) -> Result<()> {
    let datasets = DatasetSelector::All.datasets();
    let (present, missing): (Vec<Dataset>, Vec<Dataset>) = datasets
        .into_iter()
        .partition(|d| d.recordings_dir(data_root).is_dir());
    let Some(first_missing) = missing.first() else {
        return Ok(());
    };
    let mut message = format!(
        "recordings dir doesn't exist: {}",
        first_missing.recordings_dir(data_root).display()
    );
    if !present.is_empty() {
        let hint = present
            .iter()
            .map(|d| format!("-d {}", d.cli_name()))
            .collect::<Vec<_>>()
            .join(" or ");
        message.push_str(&format!(
            "; --dataset all needs every dataset, pass {} to benchmark only what is present",
            hint
        ));
    }
    Err(BenchError::config(message))
}

fn dataset_runs(
    config: &BenchConfig,
    registry: &SequenceRegistry,
    layout: &OutputLayout,
    request: &PlanRequest,
    dataset: Dataset,
) -> Result<Vec<RunDescriptor>> {
    let mut recordings = list_recordings(&config.data_root, dataset)?;
    if let Some(idx) = request.sequence_index {
        if idx >= recordings.len() {
            return Err(BenchError::config(format!(
                "sequence index {} out of range: {} has {} sequences",
                idx,
                dataset,
                recordings.len()
            )));
        }
        recordings = vec![recordings.swap_remove(idx)];
    }

    let algorithm = request.algorithm;
    let schema = algorithm.raw_schema();
    let raw_output_path = layout.raw_output_path(algorithm.outname(), schema.extension());
    let mut runs = Vec::new();
    for variant in algorithm.variants(dataset, &config.vins_config_dir) {
        for recording in &recordings {
            let sequence_name = recording
                .file_name()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let sequence_abbrev = registry.abbreviate(dataset, &sequence_name)?;
            let invocation =
                algorithm.invocation(dataset, recording, variant.as_ref(), &raw_output_path)?;
            for repetition_index in 0..request.num_repetitions {
                let output_path = layout.output_path(
                    algorithm.outname(),
                    dataset,
                    variant.as_ref().map(|v| v.id),
                    &sequence_abbrev,
                    repetition_index,
                );
                runs.push(RunDescriptor {
                    algorithm,
                    dataset,
                    sequence_name: sequence_name.clone(),
                    sequence_path: recording.clone(),
                    sequence_abbrev: sequence_abbrev.clone(),
                    variant: variant.clone(),
                    repetition_index,
                    invocation: invocation.clone(),
                    raw_output_path: raw_output_path.clone(),
                    output_path,
                });
            }
            debug!(command = %invocation, "===== command");
        }
    }
    Ok(runs)
}
