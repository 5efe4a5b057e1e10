use std::path::PathBuf;

use thiserror::Error;

/// Failures while loading or rendering banner and dashboard text.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A template failed to parse or render; embedded or user override.
    #[error("template error: {0}")]
    Tera(#[from] tera::Error),

    /// A view could not be turned into a template context.
    #[error("view serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A user override under `~/.pressroom/templates` could not be read.
    #[error("cannot read template override {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
