use std::path::PathBuf;

use polars::prelude::PolarsError;

pub type Result<T> = std::result::Result<T, DatasetError>;

/// Errors raised by datasets, partition listings and storage configs.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    /// The backing file has never been written.
    #[error("dataset '{path}' does not exist")]
    Missing { path: PathBuf },

    #[error("invalid dataset path '{path}': {reason}")]
    InvalidPath { path: PathBuf, reason: &'static str },

    /// Deserialization of an existing file failed.
    #[error("failed to load dataset '{path}'")]
    Load {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },

    /// Serialization into the target file failed.
    #[error("failed to save dataset '{path}'")]
    Save {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },

    #[error("i/o error on '{path}'")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// One partition could not be materialized, so no combined table is produced.
    #[error("failed to merge partition '{partition}'")]
    Merge {
        partition: String,
        #[source]
        source: Box<DatasetError>,
    },

    #[error("failed to concatenate tables")]
    Concat(#[source] PolarsError),

    #[error("invalid version '{0}'")]
    InvalidVersion(String),

    #[error("invalid storage config")]
    Config(#[from] serde_json::Error),
}

impl DatasetError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing { .. })
    }
}
