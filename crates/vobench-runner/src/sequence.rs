//! Recording filename -> short sequence id used in output filenames.

use crate::dataset::Dataset;
use crate::error::{BenchError, Result};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct SequenceRegistry {
    overrides: BTreeMap<String, String>,
}

impl SequenceRegistry {
    pub fn new(overrides: BTreeMap<String, String>) -> Self {
        Self { overrides }
    }

    pub fn abbreviate(&self, dataset: Dataset, raw_filename: &str) -> Result<String> {
        if let Some(id) = self.overrides.get(raw_filename) {
            return Ok(id.clone());
        }
        let stem = Path::new(raw_filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(raw_filename);
        let abbrev = match dataset {
            Dataset::EurocMav => euroc_abbrev(stem),
            Dataset::TumVi => tumvi_abbrev(stem),
        };
        abbrev.ok_or_else(|| {
            BenchError::config(format!(
                "no sequence abbreviation for {} recording '{}'",
                dataset, raw_filename
            ))
        })
    }
}

// MH_01_easy -> MH01, V2_03_difficult -> V203
fn euroc_abbrev(stem: &str) -> Option<String> {
    let mut parts = stem.split('_');
    let room = parts.next()?;
    let number = parts.next()?;
    if !matches!(room, "MH" | "V1" | "V2") {
        return None;
    }
    if number.len() != 2 || !number.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(format!("{}{}", room, number))
}

// dataset-corridor4_512_16 -> corridor4
fn tumvi_abbrev(stem: &str) -> Option<String> {
    let name = stem.strip_prefix("dataset-")?;
    let id = name.split('_').next()?;
    let has_alpha = id.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = id.chars().any(|c| c.is_ascii_digit());
    if !has_alpha || !has_digit || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(id.to_string())
}
