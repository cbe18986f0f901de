//! On-disk encoding of an edge store

use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::atomic::write_atomic;
use crate::error::{EdgeManageError, Result};
use crate::models::Sample;

/// Serialized form of a store, samples in chronological order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub(super) struct StoreFile {
    pub edge_name: String,
    pub recent: Vec<Sample>,
    pub historical_average: Vec<HistoricalBucket>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub(super) struct HistoricalBucket {
    /// Bucket start, seconds since the epoch
    pub period: i64,
    pub average: f64,
}

/// Result of looking up a store file
pub(super) enum StoreLoad {
    Loaded(StoreFile),
    NotFound,
}

pub(super) fn read_store_file(path: &Path) -> Result<StoreLoad> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(StoreLoad::NotFound),
        Err(e) => return Err(EdgeManageError::persistence(path, e)),
    };

    let file = serde_json::from_slice(&data).map_err(|source| EdgeManageError::Serialization {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(StoreLoad::Loaded(file))
}

pub(super) fn write_store_file(path: &Path, file: &StoreFile) -> Result<()> {
    let json = serde_json::to_vec(file).map_err(|source| EdgeManageError::Serialization {
        path: path.to_path_buf(),
        source,
    })?;

    write_atomic(path, &json)
}
