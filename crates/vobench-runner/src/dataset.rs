use crate::error::{BenchError, Result};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const RECORDING_EXTENSION: &str = "bag";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    EurocMav,
    TumVi,
}

impl Dataset {
    /// Directory name under the data root and the output root.
    pub fn dir_name(self) -> &'static str {
        match self {
            Dataset::EurocMav => "euroc_mav",
            Dataset::TumVi => "tum_vi",
        }
    }

    pub fn cli_name(self) -> &'static str {
        match self {
            Dataset::EurocMav => "euroc",
            Dataset::TumVi => "tumvi",
        }
    }

    pub fn recordings_dir(self, data_root: &Path) -> PathBuf {
        data_root.join(self.dir_name()).join("bags")
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetSelector {
    All,
    One(Dataset),
}

impl DatasetSelector {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "all" => Ok(DatasetSelector::All),
            "euroc" | "euroc_mav" => Ok(DatasetSelector::One(Dataset::EurocMav)),
            "tumvi" | "tum_vi" => Ok(DatasetSelector::One(Dataset::TumVi)),
            other => Err(BenchError::config(format!(
                "unknown dataset '{}': expected all | euroc | tumvi",
                other
            ))),
        }
    }

    /// Datasets in batch order. `All` runs TUM VI before EuRoC.
    pub fn datasets(self) -> Vec<Dataset> {
        match self {
            DatasetSelector::All => vec![Dataset::TumVi, Dataset::EurocMav],
            DatasetSelector::One(d) => vec![d],
        }
    }
}

/// Recording files of one dataset, sorted by filename.
pub fn list_recordings(data_root: &Path, dataset: Dataset) -> Result<Vec<PathBuf>> {
    let dir = dataset.recordings_dir(data_root);
    if !dir.is_dir() {
        return Err(BenchError::config(format!(
            "recordings dir doesn't exist: {}",
            dir.display()
        )));
    }
    let mut found = Vec::new();
    for entry in WalkDir::new(&dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| BenchError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) == Some(RECORDING_EXTENSION) {
            found.push(path.to_path_buf());
        }
    }
    found.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(found)
}
