//! The closed set of VIO algorithms the orchestrator knows how to drive.

use crate::dataset::Dataset;
use crate::error::{BenchError, Result};
use crate::normalize::{RawDelimiter, RawSchema};
use crate::process::CommandLine;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

// ROVIOLI csv: timestamp, 7 unused estimator columns, p_xyz, q_xyzw, 1 trailing column.
const ROVIOLI_KEEP: [usize; 8] = [0, 8, 9, 10, 11, 12, 13, 14];
const VINS_KEEP: [usize; 8] = [0, 1, 2, 3, 4, 5, 6, 7];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Rovioli,
    VinsFusion,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Variant {
    pub id: &'static str,
    pub config_file: PathBuf,
}

/// How a run's processes are choreographed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// One blocking process reads the recording and writes its output on exit.
    SingleShot { command: CommandLine },
    /// A long-lived node fed by a concurrently running replay process.
    LiveReplay {
        node: CommandLine,
        replay: CommandLine,
    },
}

impl Invocation {
    pub fn shape(&self) -> &'static str {
        match self {
            Invocation::SingleShot { .. } => "single_shot",
            Invocation::LiveReplay { .. } => "live_replay",
        }
    }

    /// Every command of the run, in launch order.
    pub fn commands(&self) -> Vec<&CommandLine> {
        match self {
            Invocation::SingleShot { command } => vec![command],
            Invocation::LiveReplay { node, replay } => vec![node, replay],
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invocation::SingleShot { command } => write!(f, "{}", command),
            Invocation::LiveReplay { node, replay } => {
                write!(f, "{} & sleep; {}", node, replay)
            }
        }
    }
}

impl Algorithm {
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "rovioli" => Ok(Algorithm::Rovioli),
            "vinsfusion" | "vins" => Ok(Algorithm::VinsFusion),
            other => Err(BenchError::config(format!(
                "unknown algorithm '{}': expected rovioli | vinsfusion",
                other
            ))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Algorithm::Rovioli => "rovioli",
            Algorithm::VinsFusion => "vinsfusion",
        }
    }

    /// Prefix of every canonical output filename this algorithm produces.
    pub fn outname(self) -> &'static str {
        match self {
            Algorithm::Rovioli => "rovioli_mvio",
            Algorithm::VinsFusion => "vinsfs",
        }
    }

    pub fn needs_config_dir(self) -> bool {
        matches!(self, Algorithm::VinsFusion)
    }

    pub fn raw_schema(self) -> RawSchema {
        match self {
            Algorithm::Rovioli => RawSchema {
                columns: 16,
                delimiter: RawDelimiter::CommaWithHeader,
                keep: &ROVIOLI_KEEP,
            },
            Algorithm::VinsFusion => RawSchema {
                columns: 8,
                delimiter: RawDelimiter::Whitespace,
                keep: &VINS_KEEP,
            },
        }
    }

    /// Variants in run order. Single-variant algorithms yield one `None`.
    pub fn variants(self, dataset: Dataset, vins_config_dir: &Path) -> Vec<Option<Variant>> {
        match self {
            Algorithm::Rovioli => vec![None],
            Algorithm::VinsFusion => {
                let (subdir, prefix) = match dataset {
                    Dataset::EurocMav => ("euroc", "euroc"),
                    Dataset::TumVi => ("tumvi512", "tumvi"),
                };
                let dir = vins_config_dir.join(subdir);
                [
                    ("mvio", "mono_imu"),
                    ("stereo", "stereo"),
                    ("svio", "stereo_imu"),
                ]
                .into_iter()
                .map(|(id, kind)| {
                    Some(Variant {
                        id,
                        config_file: dir.join(format!("{}_{}_config.yaml", prefix, kind)),
                    })
                })
                .collect()
            }
        }
    }

    pub fn invocation(
        self,
        dataset: Dataset,
        recording: &Path,
        variant: Option<&Variant>,
        raw_output: &Path,
    ) -> Result<Invocation> {
        match (self, variant) {
            (Algorithm::Rovioli, None) => {
                let node = match dataset {
                    Dataset::EurocMav => "run_rovioli_euroc_vo",
                    Dataset::TumVi => "run_rovioli_tumvi_vo",
                };
                Ok(Invocation::SingleShot {
                    command: CommandLine::new(
                        "rosrun",
                        [
                            "rovioli".to_string(),
                            node.to_string(),
                            path_arg(recording),
                            path_arg(raw_output),
                        ],
                    ),
                })
            }
            (Algorithm::VinsFusion, Some(variant)) => Ok(Invocation::LiveReplay {
                node: CommandLine::new(
                    "rosrun",
                    [
                        "vins".to_string(),
                        "vins_node".to_string(),
                        path_arg(&variant.config_file),
                        path_arg(raw_output),
                    ],
                ),
                replay: CommandLine::new("rosbag", ["play".to_string(), path_arg(recording)])
                    .quiet(),
            }),
            (algorithm, variant) => Err(BenchError::config(format!(
                "{} does not take variant {:?}",
                algorithm.name(),
                variant.map(|v| v.id)
            ))),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
