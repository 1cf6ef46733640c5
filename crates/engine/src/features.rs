//! Feature builder: lookback windows, direction labels, min-max scaling
//!
//! Windows are `LOOKBACK x CHANNELS` matrices of scaled OHLCV values. The
//! label attached to the window ending before row `i` compares the raw
//! (unscaled) closes at `i + 1` and `i`.

use ndarray::{s, Array1, Array2, Axis};
use persistence::OhlcvRow;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Rows per model input window
pub const LOOKBACK: usize = 60;

/// open, high, low, close, volume
pub const CHANNELS: usize = 5;

const CLOSE: usize = 3;

/// One model input: `LOOKBACK` rows by `CHANNELS` columns
pub type Window = Array2<f64>;

/// Not enough rows for the requested operation. Returned, never raised.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FeatureError {
    #[error("not enough data")]
    NotEnoughTrainingRows { rows: usize, required: usize },

    #[error("not enough rows for predict")]
    NotEnoughPredictRows { rows: usize, required: usize },
}

/// Per-channel min-max scaling parameters.
///
/// A channel whose minimum equals its maximum scales to 0.0 everywhere
/// rather than dividing by zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
}

impl MinMaxScaler {
    /// Compute per-column min and max over `data` (`rows x channels`)
    pub fn fit(data: &Array2<f64>) -> Self {
        let mut min = Vec::with_capacity(data.ncols());
        let mut max = Vec::with_capacity(data.ncols());
        for column in data.axis_iter(Axis(1)) {
            min.push(column.fold(f64::INFINITY, |acc, &v| acc.min(v)));
            max.push(column.fold(f64::NEG_INFINITY, |acc, &v| acc.max(v)));
        }
        Self { min, max }
    }

    pub fn channels(&self) -> usize {
        self.min.len()
    }

    /// Scale `data` column by column. Values outside the fitted range land
    /// outside [0, 1]; they are not clipped.
    pub fn transform(&self, data: &Array2<f64>) -> Array2<f64> {
        let min = Array1::from(self.min.clone());
        let range = Array1::from_iter(
            self.min
                .iter()
                .zip(&self.max)
                .map(|(lo, hi)| hi - lo),
        );

        let mut scaled = data - &min;
        for (mut column, &r) in scaled.axis_iter_mut(Axis(1)).zip(range.iter()) {
            if r > 0.0 {
                column.mapv_inplace(|v| v / r);
            } else {
                column.fill(0.0);
            }
        }
        scaled
    }

    pub fn fit_transform(data: &Array2<f64>) -> (Self, Array2<f64>) {
        let scaler = Self::fit(data);
        let scaled = scaler.transform(data);
        (scaler, scaled)
    }
}

/// Windows, labels and the scaler fitted over the whole training series
#[derive(Debug, Clone)]
pub struct TrainingSet {
    pub windows: Vec<Window>,
    pub labels: Vec<u8>,
    pub scaler: MinMaxScaler,
}

impl TrainingSet {
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Convert persisted rows into a `rows x CHANNELS` float matrix
pub fn to_matrix(rows: &[OhlcvRow]) -> Array2<f64> {
    let mut data = Array2::zeros((rows.len(), CHANNELS));
    for (i, row) in rows.iter().enumerate() {
        let values = [row.open, row.high, row.low, row.close, row.volume];
        for (j, value) in values.iter().enumerate() {
            data[[i, j]] = value.to_f64().unwrap_or(f64::NAN);
        }
    }
    data
}

/// Build training windows and labels from a raw series.
///
/// Requires at least `LOOKBACK + 2` rows and yields `len - LOOKBACK - 1`
/// windows. The scaler is fitted on every row supplied.
pub fn build_training_set(rows: &[OhlcvRow]) -> Result<TrainingSet, FeatureError> {
    let required = LOOKBACK + 2;
    if rows.len() < required {
        return Err(FeatureError::NotEnoughTrainingRows {
            rows: rows.len(),
            required,
        });
    }

    let raw = to_matrix(rows);
    let (scaler, scaled) = MinMaxScaler::fit_transform(&raw);

    let count = rows.len() - LOOKBACK - 1;
    let mut windows = Vec::with_capacity(count);
    let mut labels = Vec::with_capacity(count);
    for i in LOOKBACK..rows.len() - 1 {
        windows.push(scaled.slice(s![i - LOOKBACK..i, ..]).to_owned());
        labels.push(u8::from(raw[[i + 1, CLOSE]] > raw[[i, CLOSE]]));
    }

    Ok(TrainingSet {
        windows,
        labels,
        scaler,
    })
}

fn check_predict_rows(rows: &[OhlcvRow]) -> Result<(), FeatureError> {
    if rows.len() < LOOKBACK {
        return Err(FeatureError::NotEnoughPredictRows {
            rows: rows.len(),
            required: LOOKBACK,
        });
    }
    Ok(())
}

/// The most recent `LOOKBACK` rows, scaled with a scaler fitted on every
/// row supplied to this call. Values always lie in [0, 1].
pub fn build_prediction_window(rows: &[OhlcvRow]) -> Result<Window, FeatureError> {
    check_predict_rows(rows)?;
    let (_, scaled) = MinMaxScaler::fit_transform(&to_matrix(rows));
    Ok(scaled.slice(s![rows.len() - LOOKBACK.., ..]).to_owned())
}

/// The most recent `LOOKBACK` rows, scaled with a previously fitted `scaler`.
/// Values outside the fitted range are not clipped.
pub fn build_prediction_window_with(
    rows: &[OhlcvRow],
    scaler: &MinMaxScaler,
) -> Result<Window, FeatureError> {
    check_predict_rows(rows)?;
    let tail = to_matrix(&rows[rows.len() - LOOKBACK..]);
    Ok(scaler.transform(&tail))
}
