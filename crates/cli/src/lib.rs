//! Shared setup and argument handling for the candle-lstm binaries

use std::ffi::OsString;
use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};
use engine::{ensure_trained, predict, train, Outcome, PipelineError, SequenceClassifier};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const USAGE: &str = "Usage: train-and-predict [train|train-if-needed|predict] data.csv model.bin";

/// Process status for bad arguments and fatal pipeline errors
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_SUCCESS: u8 = 0;

/// Install the global subscriber. Output goes to stderr so stdout stays free
/// for the result line. `RUST_LOG`, when set, overrides the verbosity flag.
pub fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug,engine=debug,persistence=debug,candle_lstm=debug")
        } else {
            EnvFilter::new("info,engine=info,persistence=info,candle_lstm=info")
        }
    });

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .with(filter)
        .init();
}

#[derive(Parser, Debug)]
#[command(name = "collect-data")]
#[command(about = "Collect historical candles into a CSV series", long_about = None)]
pub struct CollectCli {
    /// Trading symbol to collect
    #[arg(default_value = engine::config::DEFAULT_SYMBOL)]
    pub symbol: String,
}

#[derive(Parser, Debug)]
#[command(name = "train-and-predict")]
#[command(about = "Train the LSTM direction model or predict P(up)", long_about = None)]
pub struct TrainCli {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    pub action: Action,

    /// Series CSV with open,high,low,close,volume columns
    pub csv_path: PathBuf,

    /// Model artifact; the manifest is written next to it
    pub model_path: PathBuf,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Action {
    Train,
    /// Train only when no model exists at the path yet
    TrainIfNeeded,
    Predict,
}

pub fn parse_train_args<I, T>(args: I) -> Result<TrainCli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    TrainCli::try_parse_from(args)
}

/// Whether a parse failure should print the usage line and exit 1, as opposed
/// to clap's own `--help` / `--version` output
pub fn wants_usage(err: &clap::Error) -> bool {
    !matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion)
}

/// Run the requested pipeline step
pub fn run_action<C: SequenceClassifier>(
    classifier: &C,
    cli: &TrainCli,
) -> Result<Outcome, PipelineError> {
    match cli.action {
        Action::Train => {
            train(classifier, &cli.csv_path, &cli.model_path).map(|_| Outcome::trained())
        }
        Action::TrainIfNeeded => {
            ensure_trained(classifier, &cli.csv_path, &cli.model_path).map(|_| Outcome::trained())
        }
        Action::Predict => {
            predict(classifier, &cli.csv_path, &cli.model_path).map(Outcome::prediction)
        }
    }
}

/// Map a pipeline result to the JSON outcome and the process status.
/// Insufficient data is an ordinary outcome; anything else failing is fatal.
pub fn resolve(result: Result<Outcome, PipelineError>) -> (Outcome, u8) {
    match result {
        Ok(outcome) => (outcome, EXIT_SUCCESS),
        Err(err) if err.is_fatal() => {
            error!("{}", err);
            (Outcome::from(&err), EXIT_FAILURE)
        }
        Err(err) => (Outcome::from(&err), EXIT_SUCCESS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engine::{FeatureError, LstmClassifier, NetworkConfig, TrainingConfig};
    use persistence::{write_series, OhlcvRow};
    use rust_decimal::Decimal;
    use std::path::Path;
    use tempfile::tempdir;

    fn zigzag(len: usize) -> Vec<OhlcvRow> {
        (0..len)
            .map(|i| {
                let c = Decimal::from(100 + ((i * 7) % 11) as i64);
                OhlcvRow {
                    open: c,
                    high: c + Decimal::ONE,
                    low: c - Decimal::ONE,
                    close: c,
                    volume: Decimal::from(5 + (i % 4) as i64),
                }
            })
            .collect()
    }

    fn small_classifier() -> LstmClassifier {
        LstmClassifier::new(
            NetworkConfig {
                lstm1_units: 8,
                lstm2_units: 4,
                dense_units: 4,
                ..NetworkConfig::default()
            },
            TrainingConfig {
                epochs: 2,
                ..TrainingConfig::default()
            },
        )
    }

    fn cli(action: Action, csv: &Path, model: &Path) -> TrainCli {
        TrainCli {
            verbose: false,
            action,
            csv_path: csv.to_path_buf(),
            model_path: model.to_path_buf(),
        }
    }

    #[test]
    fn test_missing_arguments_want_usage() {
        let err = parse_train_args(["train-and-predict"]).unwrap_err();
        assert!(wants_usage(&err));

        let err = parse_train_args(["train-and-predict", "train", "data.csv"]).unwrap_err();
        assert!(wants_usage(&err));
    }

    #[test]
    fn test_unknown_action_wants_usage() {
        let err = parse_train_args(["train-and-predict", "fit", "a.csv", "m.bin"]).unwrap_err();
        assert!(wants_usage(&err));
    }

    #[test]
    fn test_help_is_not_a_usage_error() {
        let err = parse_train_args(["train-and-predict", "--help"]).unwrap_err();
        assert!(!wants_usage(&err));
    }

    #[test]
    fn test_parses_positional_arguments() {
        let cli = parse_train_args(["train-and-predict", "train-if-needed", "a.csv", "m.bin"]).unwrap();
        assert_eq!(cli.action, Action::TrainIfNeeded);
        assert_eq!(cli.csv_path, PathBuf::from("a.csv"));
        assert_eq!(cli.model_path, PathBuf::from("m.bin"));

        let cli = parse_train_args(["train-and-predict", "predict", "a.csv", "m.bin"]).unwrap();
        assert_eq!(cli.action, Action::Predict);
    }

    #[test]
    fn test_collect_takes_optional_symbol_only() {
        assert_eq!(CollectCli::try_parse_from(["collect-data"]).unwrap().symbol, "BTCUSDT");
        assert_eq!(
            CollectCli::try_parse_from(["collect-data", "ETHUSDT"]).unwrap().symbol,
            "ETHUSDT"
        );
        assert!(CollectCli::try_parse_from(["collect-data", "-v"]).is_err());
    }

    #[test]
    fn test_resolve_exit_status() {
        let (outcome, status) = resolve(Ok(Outcome::trained()));
        assert_eq!(outcome, Outcome::trained());
        assert_eq!(status, EXIT_SUCCESS);

        let short = PipelineError::from(FeatureError::NotEnoughPredictRows {
            rows: 59,
            required: 60,
        });
        let (outcome, status) = resolve(Err(short));
        assert_eq!(
            outcome.to_json_line().unwrap(),
            r#"{"error":"not enough rows for predict"}"#
        );
        assert_eq!(status, EXIT_SUCCESS);

        let missing = PipelineError::ModelNotFound {
            path: PathBuf::from("m.bin"),
            reason: "gone".into(),
        };
        let (outcome, status) = resolve(Err(missing));
        assert!(matches!(outcome, Outcome::Error { .. }));
        assert_eq!(status, EXIT_FAILURE);
    }

    #[test]
    fn test_short_series_predict_exits_zero() {
        let dir = tempdir().unwrap();
        let csv = dir.path().join("s.csv");
        write_series(&csv, &zigzag(59)).unwrap();

        let args = cli(Action::Predict, &csv, &dir.path().join("absent.bin"));
        let (outcome, status) = resolve(run_action(&small_classifier(), &args));
        assert_eq!(
            outcome.to_json_line().unwrap(),
            r#"{"error":"not enough rows for predict"}"#
        );
        assert_eq!(status, EXIT_SUCCESS);
    }

    #[test]
    fn test_predict_without_model_exits_one() {
        let dir = tempdir().unwrap();
        let csv = dir.path().join("s.csv");
        write_series(&csv, &zigzag(80)).unwrap();

        let args = cli(Action::Predict, &csv, &dir.path().join("absent.bin"));
        let (_, status) = resolve(run_action(&small_classifier(), &args));
        assert_eq!(status, EXIT_FAILURE);
    }

    #[test]
    fn test_train_then_predict() {
        let dir = tempdir().unwrap();
        let csv = dir.path().join("s.csv");
        let model = dir.path().join("models").join("m.bin");
        write_series(&csv, &zigzag(90)).unwrap();
        let clf = small_classifier();

        let (outcome, status) = resolve(run_action(&clf, &cli(Action::Train, &csv, &model)));
        assert_eq!(outcome.to_json_line().unwrap(), r#"{"trained":true}"#);
        assert_eq!(status, EXIT_SUCCESS);

        let (outcome, _) = resolve(run_action(&clf, &cli(Action::TrainIfNeeded, &csv, &model)));
        assert_eq!(outcome, Outcome::trained());

        let (outcome, status) = resolve(run_action(&clf, &cli(Action::Predict, &csv, &model)));
        assert_eq!(status, EXIT_SUCCESS);
        match outcome {
            Outcome::Prediction { prob_up } => assert!((0.0..=1.0).contains(&prob_up)),
            other => panic!("unexpected outcome {other:?}"),
        }
    }

    #[test]
    fn test_train_short_series_exits_zero() {
        let dir = tempdir().unwrap();
        let csv = dir.path().join("s.csv");
        write_series(&csv, &zigzag(61)).unwrap();

        let args = cli(Action::Train, &csv, &dir.path().join("m.bin"));
        let (outcome, status) = resolve(run_action(&small_classifier(), &args));
        assert_eq!(outcome.to_json_line().unwrap(), r#"{"error":"not enough data"}"#);
        assert_eq!(status, EXIT_SUCCESS);
    }
}
