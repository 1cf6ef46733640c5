//! Training pipeline: series CSV -> windows -> fitted model + manifest
//!
//! The manifest sits next to the model at `<model_path>.manifest.json` and
//! carries the scaler fitted on the training series, so prediction scales
//! its window exactly as training did.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use persistence::{file_sha256, read_series, write_json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::PipelineError;
use crate::features::{build_training_set, MinMaxScaler, CHANNELS, LOOKBACK};
use crate::model::{EpochMetrics, SequenceClassifier};

/// Metadata written alongside every trained model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    pub lookback: usize,
    pub channels: usize,
    pub scaler: MinMaxScaler,
    /// Rows in the training series
    pub rows: usize,
    /// Hex SHA-256 of the training CSV
    pub series_sha256: String,
    pub trained_at: DateTime<Utc>,
}

impl ModelManifest {
    /// Reason this manifest cannot drive the current feature builder, if any
    pub fn incompatibility(&self) -> Option<String> {
        if self.lookback != LOOKBACK {
            return Some(format!("lookback {} != {}", self.lookback, LOOKBACK));
        }
        if self.channels != CHANNELS || self.scaler.channels() != CHANNELS {
            return Some(format!(
                "channels {} (scaler {}) != {}",
                self.channels,
                self.scaler.channels(),
                CHANNELS
            ));
        }
        None
    }
}

/// `<model_path>.manifest.json`
pub fn manifest_path(model_path: &Path) -> PathBuf {
    let mut name = OsString::from(model_path.as_os_str());
    name.push(".manifest.json");
    PathBuf::from(name)
}

#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub rows: usize,
    pub windows: usize,
    pub epochs: Vec<EpochMetrics>,
    pub model_path: PathBuf,
    pub manifest_path: PathBuf,
}

/// Result of [`ensure_trained`]
#[derive(Debug, Clone)]
pub enum EnsureOutcome {
    Trained(TrainingReport),
    Existing(PathBuf),
}

/// Fit `classifier` on the series at `csv_path` and persist the model and its
/// manifest, overwriting any previous ones.
pub fn train<C: SequenceClassifier>(
    classifier: &C,
    csv_path: &Path,
    model_path: &Path,
) -> Result<TrainingReport, PipelineError> {
    let rows = read_series(csv_path)?;
    let set = build_training_set(&rows)?;

    info!(
        csv = %csv_path.display(),
        rows = rows.len(),
        windows = set.len(),
        positives = set.labels.iter().filter(|&&l| l == 1).count(),
        "Built training set"
    );

    let model = classifier.fit(&set.windows, &set.labels)?;
    classifier.save(&model, model_path)?;

    let manifest = ModelManifest {
        lookback: LOOKBACK,
        channels: CHANNELS,
        scaler: set.scaler,
        rows: rows.len(),
        series_sha256: file_sha256(csv_path)?,
        trained_at: Utc::now(),
    };
    let manifest_path = manifest_path(model_path);
    write_json(&manifest_path, &manifest)?;

    info!(
        model = %model_path.display(),
        manifest = %manifest_path.display(),
        "Training complete"
    );

    Ok(TrainingReport {
        rows: rows.len(),
        windows: set.windows.len(),
        epochs: classifier.history(&model),
        model_path: model_path.to_path_buf(),
        manifest_path,
    })
}

/// Train only when no complete artifact (model plus manifest) exists yet
pub fn ensure_trained<C: SequenceClassifier>(
    classifier: &C,
    csv_path: &Path,
    model_path: &Path,
) -> Result<EnsureOutcome, PipelineError> {
    if model_path.exists() && manifest_path(model_path).exists() {
        info!(model = %model_path.display(), "Model already trained");
        return Ok(EnsureOutcome::Existing(model_path.to_path_buf()));
    }
    train(classifier, csv_path, model_path).map(EnsureOutcome::Trained)
}
