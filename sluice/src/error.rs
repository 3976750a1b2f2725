use std::path::{Path, PathBuf};

use arrow::datatypes::DataType;
use arrow::error::ArrowError;
use parquet::errors::ParquetError;
use thiserror::Error;

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("arrow error: {0}")]
    Arrow(#[from] ArrowError),

    #[error("parquet error: {0}")]
    Parquet(#[from] ParquetError),

    #[error("failed to read or write commit manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("failed to walk input directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("column '{name}' not found (available: {available})")]
    ColumnNotFound { name: String, available: String },

    #[error("duplicate column '{0}' in output")]
    DuplicateColumn(String),

    #[error("column '{name}' has {actual} rows, table has {expected}")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("no input files matched {pattern}")]
    NoInputFiles { pattern: String },

    #[error("table at {} has no commit marker; it was not durably written", .0.display())]
    NotCommitted(PathBuf),

    #[error("output {} already exists", .0.display())]
    AlreadyExists(PathBuf),

    #[error("column '{column}' has type {data_type}, which cannot be a partition key")]
    UnsupportedPartitionType { column: String, data_type: DataType },

    #[error("invalid partition path '{0}'")]
    InvalidPartitionPath(String),
}

pub type Result<T> = std::result::Result<T, EngineError>;

/// Attach the offending path to an `io::Error`.
pub(crate) fn io_at(path: &Path) -> impl FnOnce(std::io::Error) -> EngineError + '_ {
    move |source| EngineError::Io {
        path: path.to_path_buf(),
        source,
    }
}
