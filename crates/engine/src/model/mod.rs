//! Sequence classification
//!
//! The pipeline only depends on [`SequenceClassifier`]; [`LstmClassifier`]
//! is the stacked-LSTM implementation used by the binaries.

pub mod classifier;
pub mod config;
pub mod layers;
pub mod lstm;
pub mod network;
pub mod optimizer;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::features::Window;

pub use classifier::LstmClassifier;
pub use config::{NetworkConfig, TrainingConfig};
pub use network::{DirectionNetwork, EpochMetrics};

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("corrupt model artifact {}: {reason}", .path.display())]
    Corrupt { path: PathBuf, reason: String },

    #[error("cannot train on an empty dataset")]
    EmptyDataset,

    #[error("{windows} windows but {labels} labels")]
    LabelMismatch { windows: usize, labels: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("model encoding failed: {0}")]
    Codec(#[from] bincode::Error),
}

/// A binary classifier over fixed-length multichannel windows.
///
/// `fit` takes `[T, C]` windows with 0/1 labels; `predict` returns P(label = 1)
/// for one window. The model type is opaque to callers and only travels
/// through `save`/`load`.
pub trait SequenceClassifier {
    type Model;

    fn fit(&self, windows: &[Window], labels: &[u8]) -> Result<Self::Model, ModelError>;

    fn predict(&self, model: &Self::Model, window: &Window) -> Result<f64, ModelError>;

    fn save(&self, model: &Self::Model, path: &Path) -> Result<(), ModelError>;

    fn load(&self, path: &Path) -> Result<Self::Model, ModelError>;

    /// Per-epoch metrics recorded while `model` was fitted, if kept
    fn history(&self, _model: &Self::Model) -> Vec<EpochMetrics> {
        Vec::new()
    }
}
