//! Error types for pressroom-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from history and settings persistence.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure, annotated with the path involved.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization error (history write path).
    #[error("history JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML serialization error (settings write path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Settings YAML could not be parsed; includes the file path.
    #[error("failed to parse settings at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// Settings parsed but carry values the pollers cannot run with.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// `dirs::home_dir()` returned `None`; cannot locate `~/.pressroom/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

/// A deployment record that breaks the record invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("record has an empty commit sha")]
    EmptySha,

    #[error("record {sha} is {status} but carries a duration")]
    DurationBeforeTerminal { sha: String, status: String },

    #[error("record {sha} is {status} but carries a completion time")]
    CompletedBeforeTerminal { sha: String, status: String },

    #[error("record {sha} completed before it started")]
    CompletedBeforeStart { sha: String },
}

/// Convenience constructor for [`StoreError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.into(),
        source,
    }
}
