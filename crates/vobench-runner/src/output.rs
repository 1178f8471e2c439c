//! Canonical artifact paths and the filesystem completion gate.

use crate::dataset::Dataset;
use crate::error::Result;
use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub const OUTPUT_EXTENSION: &str = "txt";

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

    /// `<root>/<dataset>/<outname>[_<variant>]_<sequence>_<repetition>.txt`
    pub fn output_path(
        &self,
        outname: &str,
        dataset: Dataset,
        variant: Option<&str>,
        sequence_abbrev: &str,
        repetition_index: usize,
    ) -> PathBuf {
        let stem = match variant {
            Some(v) => format!("{}_{}", outname, v),
            None => outname.to_string(),
        };
        self.root.join(dataset.dir_name()).join(format!(
            "{}_{}_{}.{}",
            stem, sequence_abbrev, repetition_index, OUTPUT_EXTENSION
        ))
    }

    /// Scratch file the algorithm writes while it runs. Lives in the output
    /// root, outside every dataset directory, so it is never mistaken for a
    /// finished artifact.
    pub fn raw_output_path(&self, outname: &str, extension: &str) -> PathBuf {
        self.root.join(format!("{}_temp.{}", outname, extension))
    }
}

/// A run is complete iff its artifact exists. Artifacts only ever appear via
/// rename, so existence implies a fully written file.
pub fn is_complete(path: &Path) -> bool {
    path.is_file()
}

pub fn prepare_output_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    Ok(())
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

pub(crate) fn atomic_write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    let ts = Utc::now().timestamp_micros();
    let pid = std::process::id();
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("tmpfile");
    let tmp = path.with_file_name(format!(".{}.tmp.{}.{}", name, pid, ts));
    let written = (|| -> Result<()> {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)?;
        Ok(())
    })();
    if written.is_err() {
        let _ = fs::remove_file(&tmp);
        return written;
    }
    if let Some(parent) = path.parent() {
        if let Ok(dir) = fs::File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}
