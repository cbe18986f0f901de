//! Per-edge sample storage
//!
//! Each edge owns a bounded time series of recent fetch times plus a
//! downsampled archive of per-period averages. Both are persisted to a
//! per-edge file after every mutation and reloaded by edge name.

mod file;
mod sample_store;

pub use sample_store::{SampleStore, SharedSampleStore};

use std::time::Duration;

/// Default number of recent samples kept per edge
pub const DEFAULT_FETCH_HISTORY: usize = 20;

/// Width of a historical-average bucket. Buckets are aligned to multiples of
/// this width since the epoch, so the default seals one bucket per hour.
pub const DEFAULT_HISTORY_PERIOD: Duration = Duration::from_secs(60 * 60);

/// File extension for persisted edge stores
pub const STORE_EXTENSION: &str = "edgestore";

/// Configuration for a sample store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Capacity of the recent-sample series
    pub fetch_history: usize,
    /// Bucket width for the historical archive
    pub history_period: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            fetch_history: DEFAULT_FETCH_HISTORY,
            history_period: DEFAULT_HISTORY_PERIOD,
        }
    }
}

impl StoreConfig {
    /// The archive keeps one more bucket than the recent series
    pub fn historical_capacity(&self) -> usize {
        self.fetch_history + 1
    }
}
