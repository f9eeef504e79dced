//! Error types for burn-occo.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while preparing data, training or running completion.
#[derive(Error, Debug)]
pub enum CompletionError {
    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the configuration error.
        message: String,
    },

    /// The mesh has no triangle with a positive area.
    #[error("mesh {path} has no surface to sample")]
    DegenerateMesh {
        /// Mesh file.
        path: PathBuf,
    },

    /// Sampling or array reshaping failed.
    #[error("sampling error: {0}")]
    Sampling(String),

    /// Tensor data could not be read back as `f32`.
    #[error("tensor data error: {0}")]
    TensorData(String),

    /// No mesh could be loaded from a dataset split.
    #[error("no usable STL mesh found in {0}")]
    EmptyDataset(PathBuf),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file could not be read.
    #[error("config error: {0}")]
    Config(#[from] burn::config::ConfigError),

    /// Model record could not be saved or loaded.
    #[error("record error: {0}")]
    Record(#[from] burn::record::RecorderError),
}

impl CompletionError {
    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

/// Result type for burn-occo operations.
pub type Result<T, E = CompletionError> = std::result::Result<T, E>;
