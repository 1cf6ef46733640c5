//! collect-data — download recent candles for one symbol into `<data_dir>/<SYMBOL>.csv`
//!
//! Usage:
//!   collect-data              (BTCUSDT)
//!   collect-data ETHUSDT
//!
//! Endpoint, interval, target count, pacing and data directory come from
//! `KLINES_*` environment variables (a `.env` file is honoured). Log
//! verbosity follows `RUST_LOG`.

use anyhow::Context;
use candle_lstm::{init_logging, CollectCli};
use clap::Parser;
use engine::{collect_to_store, CollectConfig, KlineClient};
use persistence::SeriesStore;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CollectCli::parse();
    dotenvy::dotenv().ok();
    init_logging(false);

    let cfg = CollectConfig::from_env().context("Invalid collector configuration")?;
    info!(
        base_url = %cfg.base_url,
        data_dir = %cfg.data_dir.display(),
        "Collector configured"
    );

    let client = KlineClient::new(cfg.base_url.clone(), cfg.timeout)?;
    let store = SeriesStore::new(cfg.data_dir.clone());

    let (path, count) = collect_to_store(&client, &store, &cli.symbol, &cfg.plan)
        .await
        .with_context(|| format!("Collection failed for {}", cli.symbol))?;

    println!("Saved {} ({} candles)", path.display(), count);
    Ok(())
}
