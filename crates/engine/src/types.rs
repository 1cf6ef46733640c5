//! Core market data types

use persistence::OhlcvRow;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single candlestick (OHLCV)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Kline {
    /// Open time in epoch milliseconds
    pub open_time: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

impl From<Kline> for OhlcvRow {
    fn from(k: Kline) -> Self {
        OhlcvRow {
            open: k.open,
            high: k.high,
            low: k.low,
            close: k.close,
            volume: k.volume,
        }
    }
}
