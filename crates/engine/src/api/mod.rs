//! Market data sources

pub mod klines;

pub use klines::KlineClient;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::Kline;

/// Upper bound the exchange accepts for `limit` on a single klines request
pub const MAX_KLINES_PER_REQUEST: u32 = 1000;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Kline API error {status}: {body}")]
    Status { status: u16, body: String },
}

impl FetchError {
    /// Whether repeating the same request could plausibly succeed
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport(e) => !e.is_decode() && !e.is_builder(),
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
        }
    }
}

/// Anything that can return one page of historical candles.
///
/// Contract: at most `limit` candles with `open_time <= end_time` (or the most
/// recent ones when `end_time` is `None`), ascending by open time.
#[async_trait]
pub trait KlineSource: Send + Sync {
    async fn fetch_batch(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
        end_time: Option<i64>,
    ) -> Result<Vec<Kline>, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transience() {
        let throttled = FetchError::Status {
            status: 429,
            body: String::new(),
        };
        let upstream = FetchError::Status {
            status: 503,
            body: String::new(),
        };
        let bad_symbol = FetchError::Status {
            status: 400,
            body: "Invalid symbol.".to_string(),
        };

        assert!(throttled.is_transient());
        assert!(upstream.is_transient());
        assert!(!bad_symbol.is_transient());
    }
}
