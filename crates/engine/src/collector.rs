//! Historical candle collection: backward cursor pagination
//!
//! Walks back in time one page at a time: each page ends one millisecond
//! before the earliest candle already held, so pages never overlap as long
//! as the source honours `end_time`. Pages are prepended to a locally owned
//! buffer which is handed, by value, to the series store once the walk ends.
//! A failed request aborts the whole run and nothing is written.

use persistence::{OhlcvRow, SeriesStore, StoreError};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::api::{FetchError, KlineSource, MAX_KLINES_PER_REQUEST};
use crate::retry::RetryPolicy;
use crate::types::Kline;

#[derive(Error, Debug)]
pub enum CollectError {
    #[error("Network error after {attempts} attempt(s): {source}")]
    Network {
        attempts: u32,
        #[source]
        source: FetchError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Pagination settings for one collection run
#[derive(Debug, Clone)]
pub struct CollectPlan {
    pub interval: String,
    /// Stop once at least this many candles are held
    pub target: usize,
    /// Page size, clamped to the exchange maximum
    pub batch_limit: u32,
    /// Fixed courtesy delay between successful pages
    pub pacing: Duration,
    pub retry: RetryPolicy,
}

impl Default for CollectPlan {
    fn default() -> Self {
        Self {
            interval: "1m".to_string(),
            target: 10_000,
            batch_limit: MAX_KLINES_PER_REQUEST,
            pacing: Duration::from_millis(400),
            retry: RetryPolicy::default(),
        }
    }
}

/// Collect up to `plan.target` candles for `symbol`, newest page first.
///
/// Returns the series in ascending open-time order. Stops on an empty page
/// or once the target is reached; the result is not trimmed, so it may
/// exceed the target by up to one page.
pub async fn collect<S: KlineSource + ?Sized>(
    source: &S,
    symbol: &str,
    plan: &CollectPlan,
) -> Result<Vec<Kline>, CollectError> {
    let limit = plan.batch_limit.clamp(1, MAX_KLINES_PER_REQUEST);
    let mut series: Vec<Kline> = Vec::new();
    let mut cursor: Option<i64> = None;

    info!(symbol, interval = %plan.interval, target = plan.target, "Starting collection");

    while series.len() < plan.target {
        let batch = plan
            .retry
            .run(|| source.fetch_batch(symbol, &plan.interval, limit, cursor))
            .await
            .map_err(|e| CollectError::Network {
                attempts: e.attempts,
                source: e.error,
            })?;

        let Some(earliest) = batch.first().map(|k| k.open_time) else {
            debug!(symbol, "Empty page, history exhausted");
            break;
        };

        let mut page = batch;
        page.append(&mut series);
        series = page;
        cursor = Some(earliest - 1);

        info!(symbol, collected = series.len(), cursor = earliest - 1, "Collected page");

        if series.len() < plan.target && !plan.pacing.is_zero() {
            tokio::time::sleep(plan.pacing).await;
        }
    }

    info!(symbol, total = series.len(), "Collection complete");
    Ok(series)
}

/// Collect and persist in one go: the series file is written only after the
/// walk finished without a network failure, replacing any previous file.
pub async fn collect_to_store<S: KlineSource + ?Sized>(
    source: &S,
    store: &SeriesStore,
    symbol: &str,
    plan: &CollectPlan,
) -> Result<(PathBuf, usize), CollectError> {
    let series = collect(source, symbol, plan).await?;
    let count = series.len();
    let rows: Vec<OhlcvRow> = series.into_iter().map(OhlcvRow::from).collect();
    let path = store.save(symbol, rows)?;
    Ok((path, count))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use rust_decimal::Decimal;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::tempdir;

    const MINUTE: i64 = 60_000;

    /// Serves a fixed history backwards, honouring `end_time` and `limit`
    struct HistorySource {
        history: Vec<Kline>,
        calls: Mutex<Vec<Option<i64>>>,
    }

    impl HistorySource {
        fn new(len: usize) -> Self {
            let history = (0..len)
                .map(|i| {
                    let price = Decimal::from(100 + (i % 17) as i64);
                    Kline {
                        open_time: 1_600_000_000_000 + i as i64 * MINUTE,
                        open: price,
                        high: price,
                        low: price,
                        close: price,
                        volume: Decimal::ONE,
                    }
                })
                .collect();
            Self {
                history,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Option<i64>> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl KlineSource for HistorySource {
        async fn fetch_batch(
            &self,
            _symbol: &str,
            _interval: &str,
            limit: u32,
            end_time: Option<i64>,
        ) -> Result<Vec<Kline>, FetchError> {
            self.calls.lock().unwrap().push(end_time);
            let eligible: Vec<&Kline> = self
                .history
                .iter()
                .filter(|k| end_time.map_or(true, |end| k.open_time <= end))
                .collect();
            let start = eligible.len().saturating_sub(limit as usize);
            Ok(eligible[start..].iter().map(|k| (*k).clone()).collect())
        }
    }

    /// Replays scripted pages regardless of the cursor
    struct ScriptedSource {
        pages: Mutex<VecDeque<Result<Vec<Kline>, FetchError>>>,
        calls: Mutex<usize>,
    }

    impl ScriptedSource {
        fn new(pages: Vec<Result<Vec<Kline>, FetchError>>) -> Self {
            Self {
                pages: Mutex::new(pages.into()),
                calls: Mutex::new(0),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl KlineSource for ScriptedSource {
        async fn fetch_batch(
            &self,
            _symbol: &str,
            _interval: &str,
            _limit: u32,
            _end_time: Option<i64>,
        ) -> Result<Vec<Kline>, FetchError> {
            *self.calls.lock().unwrap() += 1;
            self.pages
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn page(start_minute: i64, len: usize) -> Vec<Kline> {
        (0..len as i64)
            .map(|i| Kline {
                open_time: (start_minute + i) * MINUTE,
                open: Decimal::ONE,
                high: Decimal::ONE,
                low: Decimal::ONE,
                close: Decimal::ONE,
                volume: Decimal::ONE,
            })
            .collect()
    }

    fn fast_plan(target: usize) -> CollectPlan {
        CollectPlan {
            target,
            pacing: Duration::ZERO,
            retry: RetryPolicy {
                initial_backoff: Duration::ZERO,
                max_backoff: Duration::ZERO,
                ..RetryPolicy::default()
            },
            ..CollectPlan::default()
        }
    }

    fn assert_strictly_increasing(series: &[Kline]) {
        for pair in series.windows(2) {
            assert!(
                pair[0].open_time < pair[1].open_time,
                "open times {} and {} out of order",
                pair[0].open_time,
                pair[1].open_time
            );
        }
    }

    #[tokio::test]
    async fn test_stops_at_target_without_extra_request() {
        // Pages of 1000, 1000 and 500 are available; the third is never asked for
        let source = ScriptedSource::new(vec![
            Ok(page(2000, 1000)),
            Ok(page(1000, 1000)),
            Ok(page(500, 500)),
        ]);

        let series = collect(&source, "BTCUSDT", &fast_plan(2000)).await.unwrap();

        assert_eq!(series.len(), 2000);
        assert_eq!(source.calls(), 2);
        assert_eq!(series[0].open_time, 1000 * MINUTE);
        assert_strictly_increasing(&series);
    }

    #[tokio::test]
    async fn test_cursor_walks_backwards() {
        let source = HistorySource::new(2500);
        let series = collect(&source, "BTCUSDT", &fast_plan(10_000)).await.unwrap();

        assert_eq!(series, source.history);
        assert_strictly_increasing(&series);

        let calls = source.calls();
        // three pages of history, then the empty page that ends the walk
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0], None);
        assert_eq!(calls[1], Some(source.history[1500].open_time - 1));
        assert_eq!(calls[2], Some(source.history[500].open_time - 1));
        assert_eq!(calls[3], Some(source.history[0].open_time - 1));
    }

    #[tokio::test]
    async fn test_result_may_overshoot_target() {
        let source = HistorySource::new(5000);
        let series = collect(&source, "BTCUSDT", &fast_plan(1500)).await.unwrap();

        assert_eq!(series.len(), 2000);
        assert_eq!(source.calls().len(), 2);
        assert_eq!(series.last(), source.history.last());
    }

    #[tokio::test]
    async fn test_empty_history() {
        let source = HistorySource::new(0);
        let series = collect(&source, "BTCUSDT", &fast_plan(100)).await.unwrap();

        assert!(series.is_empty());
        assert_eq!(source.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_is_retried() {
        let source = ScriptedSource::new(vec![
            Err(FetchError::Status {
                status: 502,
                body: String::new(),
            }),
            Ok(page(100, 10)),
            Ok(Vec::new()),
        ]);

        let series = collect(&source, "BTCUSDT", &fast_plan(1000)).await.unwrap();
        assert_eq!(series.len(), 10);
        assert_eq!(source.calls(), 3);
    }

    #[tokio::test]
    async fn test_network_failure_persists_nothing() {
        let dir = tempdir().unwrap();
        let store = SeriesStore::new(dir.path());
        let source = ScriptedSource::new(vec![
            Ok(page(1000, 1000)),
            Err(FetchError::Status {
                status: 403,
                body: "forbidden".to_string(),
            }),
        ]);

        let err = collect_to_store(&source, &store, "BTCUSDT", &fast_plan(5000))
            .await
            .unwrap_err();

        assert!(matches!(err, CollectError::Network { attempts: 1, .. }));
        assert!(!store.path_for("BTCUSDT").exists());
    }

    #[tokio::test]
    async fn test_collect_to_store_writes_series() {
        let dir = tempdir().unwrap();
        let store = SeriesStore::new(dir.path());
        let source = HistorySource::new(1200);

        let (path, count) = collect_to_store(&source, &store, "ETHUSDT", &fast_plan(1200))
            .await
            .unwrap();

        assert_eq!(count, 1200);
        assert_eq!(path, store.path_for("ETHUSDT"));
        assert_eq!(store.load("ETHUSDT").unwrap().len(), 1200);
    }
}
