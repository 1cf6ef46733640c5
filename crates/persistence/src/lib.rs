//! Persistence layer for candle-lstm
//!
//! Provides flat-file storage for collected candle series (CSV) and small
//! JSON sidecars written next to trained model artifacts.
//!
//! Nothing here takes a file lock: a collector and a trainer running against
//! the same symbol can observe a partially written series.

pub mod series;
pub mod sidecar;

pub use series::{read_series, write_series, OhlcvRow, SeriesStore};
pub use sidecar::{file_sha256, read_json, write_json};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("File not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Create the parent directory of `path` if it has one
pub(crate) fn ensure_parent(path: &std::path::Path) -> StoreResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
    }
    Ok(())
}
