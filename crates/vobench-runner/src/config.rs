use crate::error::{BenchError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_DATA_ROOT: &str = "/data/dataset";
pub const DEFAULT_OUTPUT_ROOT: &str = "/data/output/pose";
pub const DEFAULT_VINS_CONFIG_DIR: &str = "/work/vins_ws/src/vins-fusion/config";

/// Seconds of countdown printed before the broker comes up, so an operator
/// watching the terminal can still abort.
pub const COUNTDOWN_SECS: u64 = 3;
/// roscore needs roughly this long before nodes can register with it.
pub const BROKER_STARTUP_SECS: u64 = 3;
/// Time a live node needs to load its config and subscribe before replay
/// starts. Measured on VINS-Fusion; shorter values drop the first IMU frames.
pub const SETTLE_SECS: u64 = 5;
/// Time a live node needs after replay ends to process its queue and write
/// its trajectory file.
pub const FLUSH_SECS: u64 = 5;
/// How long a process gets to exit after SIGINT before it is killed.
pub const TEARDOWN_GRACE_SECS: u64 = 5;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchConfig {
    pub data_root: PathBuf,
    pub output_root: PathBuf,
    pub vins_config_dir: PathBuf,
    pub broker_command: Vec<String>,
    pub timing: Timing,
    /// Recording filename -> sequence id, consulted before the built-in rules.
    pub sequence_abbrevs: BTreeMap<String, String>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            data_root: PathBuf::from(DEFAULT_DATA_ROOT),
            output_root: PathBuf::from(DEFAULT_OUTPUT_ROOT),
            vins_config_dir: PathBuf::from(DEFAULT_VINS_CONFIG_DIR),
            broker_command: vec!["roscore".to_string()],
            timing: Timing::default(),
            sequence_abbrevs: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Timing {
    pub countdown_secs: u64,
    pub broker_startup_secs: u64,
    pub settle_secs: u64,
    pub flush_secs: u64,
    pub teardown_grace_secs: u64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            countdown_secs: COUNTDOWN_SECS,
            broker_startup_secs: BROKER_STARTUP_SECS,
            settle_secs: SETTLE_SECS,
            flush_secs: FLUSH_SECS,
            teardown_grace_secs: TEARDOWN_GRACE_SECS,
        }
    }
}

impl Timing {
    /// All delays zero. Used by tests and dry environments.
    pub fn immediate() -> Self {
        Self {
            countdown_secs: 0,
            broker_startup_secs: 0,
            settle_secs: 0,
            flush_secs: 0,
            teardown_grace_secs: 0,
        }
    }

    pub fn broker_startup(&self) -> Duration {
        Duration::from_secs(self.broker_startup_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    pub fn flush(&self) -> Duration {
        Duration::from_secs(self.flush_secs)
    }

    pub fn teardown_grace(&self) -> Duration {
        Duration::from_secs(self.teardown_grace_secs)
    }
}

impl BenchConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| {
            BenchError::config(format!("cannot read config {}: {}", path.display(), e))
        })?;
        let config: BenchConfig = serde_yaml::from_str(&raw)?;
        if config.broker_command.is_empty() {
            return Err(BenchError::config("broker_command cannot be empty"));
        }
        Ok(config)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Verifies the directories every run depends on. `needs_vins_config` is
    /// set for algorithms whose variants are driven by config files.
    pub fn check_base_paths(&self, needs_vins_config: bool) -> Result<()> {
        if !self.data_root.is_dir() {
            return Err(BenchError::config(format!(
                "dataset dir doesn't exist: {}",
                self.data_root.display()
            )));
        }
        if needs_vins_config && !self.vins_config_dir.is_dir() {
            return Err(BenchError::config(format!(
                "config dir doesn't exist: {}",
                self.vins_config_dir.display()
            )));
        }
        if !self.output_root.is_dir() {
            return Err(BenchError::config(format!(
                "output dir doesn't exist: {}",
                self.output_root.display()
            )));
        }
        Ok(())
    }
}
