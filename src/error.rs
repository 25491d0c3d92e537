use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort a whole run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No sequence records extracted from any file in {input_dir}")]
    NoRecords { input_dir: PathBuf },

    #[error("Input directory {path} is unusable: {reason}")]
    InputDirectory { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Worker task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// A single input file could not be parsed. Other files are unaffected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to extract records from {}: {reason}", file.display())]
pub struct ExtractionError {
    pub file: PathBuf,
    pub reason: String,
}

impl ExtractionError {
    pub fn new(file: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            reason: reason.into(),
        }
    }
}

/// An external tool failed for one marker.
#[derive(Error, Debug)]
pub enum StageExecutionError {
    #[error("Tool not found on PATH (tried: {})", tried.join(", "))]
    ToolNotFound { tried: Vec<String> },

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {secs}s")]
    Timeout { program: String, secs: u64 },

    #[error("{program} exited with status {code:?}: {stderr}")]
    ExitStatus {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("{program} produced no output")]
    EmptyOutput { program: String },

    #[error("Malformed tool output: {0}")]
    MalformedOutput(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A marker's sequences do not share one non-zero length going into concatenation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Marker {marker_id} has inconsistent sequence lengths {lengths:?}")]
pub struct WidthInconsistencyError {
    pub marker_id: String,
    pub lengths: Vec<usize>,
}
