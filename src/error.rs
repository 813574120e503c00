//! Error types for the dataset, registry and pipeline layers.
//!
//! The binary wraps these in `anyhow` with context; the pipeline itself
//! returns them per (year, place) so a single fault never aborts a batch.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// A denominator is zero or a value is non-finite after upstream coercion.
    #[error("Data integrity fault: {0}")]
    DataIntegrity(String),

    #[error("Dataset error in {path}: {message}")]
    Dataset { path: String, message: String },

    #[error("Invalid place: {0}")]
    InvalidPlace(String),

    #[error("Place registry error: {0}")]
    Registry(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

impl PipelineError {
    pub fn dataset(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Dataset {
            path: path.into(),
            message: message.into(),
        }
    }

    /// True for faults that only affect one (year, place) evaluation.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::DataIntegrity(_) | Self::InvalidPlace(_))
    }
}
