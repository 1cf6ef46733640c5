//! Errors surfaced by the train and predict pipelines

use std::path::PathBuf;

use persistence::StoreError;
use thiserror::Error;

use crate::features::FeatureError;
use crate::model::ModelError;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Too few rows; reported to the caller as an ordinary outcome
    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error("model not found at {}: {reason}", .path.display())]
    ModelNotFound { path: PathBuf, reason: String },

    #[error("manifest {} is incompatible: {reason}", .path.display())]
    IncompatibleManifest { path: PathBuf, reason: String },

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PipelineError {
    /// Whether the caller should exit non-zero. Insufficient data is not fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PipelineError::Feature(_))
    }
}
