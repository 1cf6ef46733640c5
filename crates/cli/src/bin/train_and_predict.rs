//! train-and-predict — fit the direction model or score the latest window
//!
//! Usage:
//!   train-and-predict train           data/BTCUSDT.csv models/btc.bin
//!   train-and-predict train-if-needed data/BTCUSDT.csv models/btc.bin
//!   train-and-predict predict         data/BTCUSDT.csv models/btc.bin
//!
//! Prints exactly one JSON line on stdout: `{"trained":true}`,
//! `{"prob_up":0.5321}` or `{"error":"..."}`. Too little data is an ordinary
//! outcome (exit 0); any other failure exits 1.

use std::process::ExitCode;

use candle_lstm::{
    init_logging, parse_train_args, resolve, run_action, wants_usage, EXIT_FAILURE, USAGE,
};
use engine::LstmClassifier;
use tracing::error;

fn main() -> ExitCode {
    let cli = match parse_train_args(std::env::args_os()) {
        Ok(cli) => cli,
        Err(e) if !wants_usage(&e) => e.exit(),
        Err(e) => {
            eprintln!("{e}");
            println!("{USAGE}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };
    dotenvy::dotenv().ok();
    init_logging(cli.verbose);

    let (outcome, status) = resolve(run_action(&LstmClassifier::default(), &cli));
    match outcome.to_json_line() {
        Ok(line) => {
            println!("{line}");
            ExitCode::from(status)
        }
        Err(e) => {
            error!("Failed to encode outcome: {}", e);
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
