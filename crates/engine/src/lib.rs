//! candle-lstm engine — candle collection, feature building, direction model
//!
//! Provides:
//! - Klines HTTP client and backward-paginating collector with retry
//! - Lookback windows, direction labels and min-max scaling
//! - A sequence classifier capability with a stacked-LSTM implementation
//! - Train and predict pipelines over series CSV files

pub mod api;
pub mod collector;
pub mod config;
pub mod error;
pub mod features;
pub mod model;
pub mod outcome;
pub mod predictor;
pub mod retry;
pub mod trainer;
pub mod types;

// Re-exports for convenience
pub use api::{FetchError, KlineClient, KlineSource};
pub use collector::{collect, collect_to_store, CollectError, CollectPlan};
pub use config::CollectConfig;
pub use error::PipelineError;
pub use features::{
    build_prediction_window, build_prediction_window_with, build_training_set, FeatureError,
    MinMaxScaler, TrainingSet, Window, CHANNELS, LOOKBACK,
};
pub use model::{
    DirectionNetwork, EpochMetrics, LstmClassifier, ModelError, NetworkConfig, SequenceClassifier,
    TrainingConfig,
};
pub use outcome::Outcome;
pub use predictor::{predict, predict_with, round_probability, Scaling};
pub use retry::RetryPolicy;
pub use trainer::{
    ensure_trained, manifest_path, train, EnsureOutcome, ModelManifest, TrainingReport,
};
pub use types::*;
