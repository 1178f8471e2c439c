//! Error taxonomy for the orchestrator.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BenchError {
    /// Bad selection input, missing base directories, unmapped sequence names.
    /// Raised before any run starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Raw algorithm output does not match the schema the orchestrator expects.
    #[error("format error in {}: {message}", .path.display())]
    Format { path: PathBuf, message: String },

    /// The run finished but no artifact exists at its canonical path.
    #[error("output file was NOT created: {}\nconfig: {config}\ncmd: {command}", .path.display())]
    RunIncomplete {
        path: PathBuf,
        config: String,
        command: String,
    },

    #[error("failed to launch `{command}`: {source}")]
    Process {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BenchError {
    pub fn config(message: impl Into<String>) -> Self {
        BenchError::Configuration(message.into())
    }

    pub fn format(path: &std::path::Path, message: impl Into<String>) -> Self {
        BenchError::Format {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    /// Stable short code used by the CLI's JSON error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            BenchError::Configuration(_) => "configuration_error",
            BenchError::Format { .. } => "format_error",
            BenchError::RunIncomplete { .. } => "run_incomplete",
            BenchError::Process { .. } => "process_error",
            BenchError::Io(_) => "io_error",
        }
    }
}

impl From<serde_yaml::Error> for BenchError {
    fn from(e: serde_yaml::Error) -> Self {
        BenchError::Configuration(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BenchError>;
