//! Public klines REST client (MEXC-compatible `/api/v3/klines`, no authentication)

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

use super::{FetchError, KlineSource, MAX_KLINES_PER_REQUEST};
use crate::types::Kline;

pub const DEFAULT_BASE_URL: &str = "https://api.mexc.com";

/// Klines market data client
#[derive(Clone)]
pub struct KlineClient {
    client: Client,
    base_url: String,
}

impl KlineClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch klines (candlestick data) for a symbol, ending at `end_time` if given
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
        end_time: Option<i64>,
    ) -> Result<Vec<Kline>, FetchError> {
        let mut url = format!(
            "{}/api/v3/klines?symbol={}&interval={}",
            self.base_url, symbol, interval
        );

        let limit = limit.min(MAX_KLINES_PER_REQUEST);
        url.push_str(&format!("&limit={}", limit));

        if let Some(end) = end_time {
            url.push_str(&format!("&endTime={}", end));
        }

        debug!(symbol, interval, limit, end_time, "Fetching klines");

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status { status, body });
        }

        let raw: Vec<Vec<Value>> = response.json().await?;
        let klines = parse_page(symbol, &raw);
        debug!(received = raw.len(), parsed = klines.len(), "Fetched klines");
        Ok(klines)
    }
}

#[async_trait]
impl KlineSource for KlineClient {
    async fn fetch_batch(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
        end_time: Option<i64>,
    ) -> Result<Vec<Kline>, FetchError> {
        self.get_klines(symbol, interval, limit, end_time).await
    }
}

/// Parse a response page, warning when rows had to be dropped. A page whose
/// rows all fail to parse comes back empty, which ends a collection walk.
fn parse_page(symbol: &str, raw: &[Vec<Value>]) -> Vec<Kline> {
    let klines: Vec<Kline> = raw.iter().filter_map(|row| parse_kline(row)).collect();
    if klines.len() < raw.len() {
        warn!(
            symbol,
            received = raw.len(),
            parsed = klines.len(),
            "Dropped unparsable kline rows"
        );
    }
    klines
}

/// Parse one `[openTime, open, high, low, close, volume, ...]` record.
///
/// Prices arrive as strings on most venues and as bare numbers on some;
/// both are accepted. Anything unparseable drops the row.
fn parse_kline(row: &[Value]) -> Option<Kline> {
    let open_time = match row.first()? {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.parse().ok()?,
        _ => return None,
    };

    Some(Kline {
        open_time,
        open: decimal_at(row, 1)?,
        high: decimal_at(row, 2)?,
        low: decimal_at(row, 3)?,
        close: decimal_at(row, 4)?,
        volume: decimal_at(row, 5)?,
    })
}

fn decimal_at(row: &[Value], idx: usize) -> Option<Decimal> {
    let text = match row.get(idx)? {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}
