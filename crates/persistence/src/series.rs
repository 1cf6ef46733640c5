//! Candle series store: one CSV file per symbol
//!
//! Layout: header `open,high,low,close,volume`, one row per candle in
//! ascending chronological order. Open time is not written, so a stored
//! series cannot be checked for chronological order after the fact.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::{ensure_parent, StoreError, StoreResult};

/// A single persisted candle (open time intentionally absent)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvRow {
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// Directory-backed store mapping a symbol to `<data_dir>/<symbol>.csv`
#[derive(Debug, Clone)]
pub struct SeriesStore {
    data_dir: PathBuf,
}

impl SeriesStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Path of the series file for a symbol
    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.data_dir.join(format!("{symbol}.csv"))
    }

    /// Replace the stored series for `symbol` with `rows`.
    ///
    /// Takes the rows by value: the caller's accumulation buffer ends here.
    pub fn save(&self, symbol: &str, rows: Vec<OhlcvRow>) -> StoreResult<PathBuf> {
        let path = self.path_for(symbol);
        write_series(&path, &rows)?;
        info!(symbol, rows = rows.len(), path = %path.display(), "Saved series");
        Ok(path)
    }

    pub fn load(&self, symbol: &str) -> StoreResult<Vec<OhlcvRow>> {
        read_series(self.path_for(symbol))
    }
}

/// Write a full series, truncating any existing file
pub fn write_series(path: impl AsRef<Path>, rows: &[OhlcvRow]) -> StoreResult<()> {
    let path = path.as_ref();
    ensure_parent(path)?;

    let mut writer = csv::Writer::from_path(path)?;
    if rows.is_empty() {
        // serialize() emits the header lazily, so an empty series needs it by hand
        writer.write_record(["open", "high", "low", "close", "volume"])?;
    }
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush().map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Read a series written by [`write_series`] (or any CSV with the same header)
pub fn read_series(path: impl AsRef<Path>) -> StoreResult<Vec<OhlcvRow>> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(StoreError::NotFound(path.to_path_buf()));
    }

    let mut reader = csv::Reader::from_path(path)?;
    let rows = reader
        .deserialize()
        .collect::<Result<Vec<OhlcvRow>, csv::Error>>()?;

    debug!(path = %path.display(), rows = rows.len(), "Loaded series");
    Ok(rows)
}
