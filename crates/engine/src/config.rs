//! Collector configuration from the environment (`.env` is loaded by the binary)

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::api::klines::DEFAULT_BASE_URL;
use crate::collector::CollectPlan;

pub const ENV_BASE_URL: &str = "KLINES_BASE_URL";
pub const ENV_INTERVAL: &str = "KLINES_INTERVAL";
pub const ENV_TARGET: &str = "KLINES_TARGET";
pub const ENV_PACING_MS: &str = "KLINES_PACING_MS";
pub const ENV_DATA_DIR: &str = "KLINES_DATA_DIR";
pub const ENV_MAX_ATTEMPTS: &str = "KLINES_MAX_ATTEMPTS";

pub const DEFAULT_SYMBOL: &str = "BTCUSDT";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct CollectConfig {
    pub base_url: String,
    pub data_dir: PathBuf,
    pub timeout: Duration,
    pub plan: CollectPlan,
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            timeout: HTTP_TIMEOUT,
            plan: CollectPlan::default(),
        }
    }
}

fn parsed<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("invalid {}={:?}", key, raw)),
        _ => Ok(None),
    }
}

impl CollectConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset or blank keys keep their defaults
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut cfg = Self::default();

        if let Some(url) = parsed::<String>(&get, ENV_BASE_URL)? {
            cfg.base_url = url;
        }
        if let Some(dir) = parsed::<PathBuf>(&get, ENV_DATA_DIR)? {
            cfg.data_dir = dir;
        }
        if let Some(interval) = parsed::<String>(&get, ENV_INTERVAL)? {
            cfg.plan.interval = interval;
        }
        if let Some(target) = parsed::<usize>(&get, ENV_TARGET)? {
            cfg.plan.target = target;
        }
        if let Some(ms) = parsed::<u64>(&get, ENV_PACING_MS)? {
            cfg.plan.pacing = Duration::from_millis(ms);
        }
        if let Some(attempts) = parsed::<u32>(&get, ENV_MAX_ATTEMPTS)? {
            anyhow::ensure!(attempts >= 1, "{} must be at least 1", ENV_MAX_ATTEMPTS);
            cfg.plan.retry.max_attempts = attempts;
        }

        Ok(cfg)
    }
}
