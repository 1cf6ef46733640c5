//! Prediction pipeline: latest window of a series -> P(next close is higher)
//!
//! By default the window is min-max scaled with statistics of the series
//! handed to this call, exactly like the training windows were scaled with
//! statistics of the training series. [`Scaling::Persisted`] instead reuses
//! the scaler stored in the model manifest at training time; windows may then
//! fall outside [0, 1] and the manifest becomes a required part of the model.

use std::path::Path;

use persistence::{read_json, read_series, StoreError};
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::features::{
    build_prediction_window, build_prediction_window_with, FeatureError, MinMaxScaler, LOOKBACK,
};
use crate::model::{ModelError, SequenceClassifier};
use crate::trainer::{manifest_path, ModelManifest};

/// Round to 4 decimal places
pub fn round_probability(p: f64) -> f64 {
    (p * 10_000.0).round() / 10_000.0
}

/// Where the min-max statistics of the prediction window come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scaling {
    /// Fit on the rows supplied to the call
    #[default]
    PerCall,
    /// Scaler persisted in `<model>.manifest.json`
    Persisted,
}

/// Predict the probability that the candle after the last row of `csv_path`
/// closes higher, scaling per call.
pub fn predict<C: SequenceClassifier>(
    classifier: &C,
    csv_path: &Path,
    model_path: &Path,
) -> Result<f64, PipelineError> {
    predict_with(classifier, csv_path, model_path, Scaling::PerCall)
}

/// [`predict`] with an explicit scaling source.
///
/// The row count is checked before the model is touched: a short series
/// yields [`FeatureError::NotEnoughPredictRows`] without loading anything.
pub fn predict_with<C: SequenceClassifier>(
    classifier: &C,
    csv_path: &Path,
    model_path: &Path,
    scaling: Scaling,
) -> Result<f64, PipelineError> {
    let rows = read_series(csv_path)?;
    if rows.len() < LOOKBACK {
        return Err(FeatureError::NotEnoughPredictRows {
            rows: rows.len(),
            required: LOOKBACK,
        }
        .into());
    }

    let model = classifier.load(model_path).map_err(|e| match e {
        ModelError::NotFound(_) | ModelError::Corrupt { .. } | ModelError::Io { .. } => {
            PipelineError::ModelNotFound {
                path: model_path.to_path_buf(),
                reason: e.to_string(),
            }
        }
        other => PipelineError::Model(other),
    })?;

    let window = match scaling {
        Scaling::PerCall => build_prediction_window(&rows)?,
        Scaling::Persisted => build_prediction_window_with(&rows, &persisted_scaler(model_path)?)?,
    };
    let raw = classifier.predict(&model, &window)?;
    let prob_up = round_probability(raw);

    debug!(raw, ?scaling, "Model output");
    info!(csv = %csv_path.display(), rows = rows.len(), prob_up, "Prediction");
    Ok(prob_up)
}

/// Scaler from the manifest next to `model_path`; a missing or unreadable
/// manifest means the artifact is incomplete
fn persisted_scaler(model_path: &Path) -> Result<MinMaxScaler, PipelineError> {
    let path = manifest_path(model_path);
    let manifest: ModelManifest = read_json(&path).map_err(|e| match e {
        StoreError::NotFound(_) | StoreError::Json(_) => PipelineError::ModelNotFound {
            path: model_path.to_path_buf(),
            reason: format!("manifest unavailable: {e}"),
        },
        other => PipelineError::Store(other),
    })?;
    if let Some(reason) = manifest.incompatibility() {
        return Err(PipelineError::IncompatibleManifest { path, reason });
    }
    Ok(manifest.scaler)
}
