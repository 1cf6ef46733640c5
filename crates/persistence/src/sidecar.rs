//! JSON sidecar files and content fingerprints

use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::{ensure_parent, StoreError, StoreResult};

/// Serialize `value` as pretty JSON to `path`, replacing any existing file
pub fn write_json<T: Serialize>(path: impl AsRef<Path>, value: &T) -> StoreResult<()> {
    let path = path.as_ref();
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> StoreResult<T> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(StoreError::NotFound(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&text)?)
}

/// Hex SHA-256 of a file's bytes
pub fn file_sha256(path: impl AsRef<Path>) -> StoreResult<String> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}
