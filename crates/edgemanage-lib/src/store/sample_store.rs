//! Bounded, persistent sample series for one edge

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::Utc;
use tracing::{debug, info};

use super::file::{read_store_file, write_store_file, HistoricalBucket, StoreFile, StoreLoad};
use super::{StoreConfig, STORE_EXTENSION};
use crate::error::{EdgeManageError, Result};
use crate::models::Sample;

/// Store handle shared between a probe writer and the decision engine
pub type SharedSampleStore = Arc<RwLock<SampleStore>>;

/// Ordering key for recent samples: timestamp first, arrival order on ties
#[derive(Debug, Clone, Copy)]
struct SampleKey {
    timestamp: f64,
    seq: u64,
}

impl Ord for SampleKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .total_cmp(&other.timestamp)
            .then(self.seq.cmp(&other.seq))
    }
}

impl PartialOrd for SampleKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for SampleKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SampleKey {}

/// Recent fetch times and per-period averages for one edge
#[derive(Debug)]
pub struct SampleStore {
    edge_name: String,
    path: PathBuf,
    config: StoreConfig,
    recent: BTreeMap<SampleKey, f64>,
    /// Bucket start (epoch seconds) to period average
    historical: BTreeMap<i64, f64>,
    next_seq: u64,
}

impl SampleStore {
    /// Open the store for `edge_name` under `root`, loading persisted state
    /// when a store file exists. A missing file yields an empty store.
    pub fn open(edge_name: &str, root: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let path = Self::store_path(root.as_ref(), edge_name)?;
        let mut store = Self {
            edge_name: edge_name.to_string(),
            path,
            config,
            recent: BTreeMap::new(),
            historical: BTreeMap::new(),
            next_seq: 0,
        };

        match read_store_file(&store.path)? {
            StoreLoad::Loaded(file) => {
                store.restore(file);
                debug!(
                    edge = %store.edge_name,
                    samples = store.recent.len(),
                    buckets = store.historical.len(),
                    "Loaded edge store"
                );
            }
            StoreLoad::NotFound => {
                debug!(edge = %store.edge_name, "No persisted state, starting empty store");
            }
        }

        Ok(store)
    }

    /// Path of the store file for an edge. Names that are not a plain file
    /// name are rejected.
    pub fn store_path(root: &Path, edge_name: &str) -> Result<PathBuf> {
        EdgeManageError::check_name("edge", edge_name)?;
        Ok(root.join(format!("{}.{}", edge_name, STORE_EXTENSION)))
    }

    /// Whether health data has been persisted for an edge
    pub fn exists(root: impl AsRef<Path>, edge_name: &str) -> bool {
        Self::store_path(root.as_ref(), edge_name).is_ok_and(|path| path.is_file())
    }

    pub fn into_shared(self) -> SharedSampleStore {
        Arc::new(RwLock::new(self))
    }

    pub fn edge_name(&self) -> &str {
        &self.edge_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a sample taken now
    pub fn add_value(&mut self, value: f64) -> Result<()> {
        let now = Utc::now().timestamp_micros() as f64 / 1_000_000.0;
        self.add_value_at(value, now)
    }

    /// Record a sample with an explicit timestamp and persist the store.
    ///
    /// When the sample's period differs from that of the newest recorded
    /// sample, the newest sample's period is sealed into the archive first.
    /// The in-memory state keeps the sample even if persisting fails; the
    /// error is returned to the caller. Non-finite values or timestamps are
    /// rejected before anything changes.
    pub fn add_value_at(&mut self, value: f64, timestamp: f64) -> Result<()> {
        if !value.is_finite() || !timestamp.is_finite() {
            return Err(EdgeManageError::InvalidSample {
                edge: self.edge_name.clone(),
                value,
                timestamp,
            });
        }

        let period = self.period_of(timestamp);

        if let Some(previous) = self.last_timestamp() {
            let previous_period = self.period_of(previous);
            if previous_period != period {
                self.seal_period(previous_period);
            }
        }

        let key = SampleKey {
            timestamp,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.recent.insert(key, value);

        while self.recent.len() > self.config.fetch_history {
            self.recent.pop_first();
        }

        debug!(edge = %self.edge_name, value, timestamp, "Recorded sample");

        self.persist()
    }

    /// Mean of all recent samples
    pub fn current_average(&self) -> Result<f64> {
        if self.recent.is_empty() {
            return Err(EdgeManageError::InsufficientData {
                edge: self.edge_name.clone(),
            });
        }
        Ok(self.recent.values().sum::<f64>() / self.recent.len() as f64)
    }

    /// Value of the newest sample by timestamp
    pub fn last_value(&self) -> Option<f64> {
        self.recent.last_key_value().map(|(_, v)| *v)
    }

    pub fn last_timestamp(&self) -> Option<f64> {
        self.recent.last_key_value().map(|(k, _)| k.timestamp)
    }

    pub fn len(&self) -> usize {
        self.recent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.is_empty()
    }

    /// Recent samples, oldest first
    pub fn samples(&self) -> impl Iterator<Item = Sample> + '_ {
        self.recent.iter().map(|(k, v)| Sample {
            timestamp: k.timestamp,
            value: *v,
        })
    }

    /// Average of the samples with `lower <= timestamp <= upper`, with the
    /// number of samples it covers
    pub fn window_average(&self, lower: f64, upper: f64) -> Option<(usize, f64)> {
        let (count, sum) = self
            .samples()
            .filter(|s| s.timestamp >= lower && s.timestamp <= upper)
            .fold((0usize, 0.0f64), |(n, sum), s| (n + 1, sum + s.value));

        if count == 0 {
            None
        } else {
            Some((count, sum / count as f64))
        }
    }

    /// Sealed period averages as `(bucket start, average)`, oldest first
    pub fn historical_average(&self) -> impl Iterator<Item = (i64, f64)> + '_ {
        self.historical.iter().map(|(p, v)| (*p, *v))
    }

    pub fn historical_len(&self) -> usize {
        self.historical.len()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn period_of(&self, timestamp: f64) -> i64 {
        let width = self.config.history_period.as_secs().max(1) as f64;
        ((timestamp / width).floor() * width) as i64
    }

    /// Average the recent samples of `period` into the archive. Resealing a
    /// period already in the archive overwrites its value.
    fn seal_period(&mut self, period: i64) {
        let width = self.config.history_period.as_secs().max(1) as i64;
        let (count, sum) = self
            .recent
            .iter()
            .filter(|(k, _)| self.period_of(k.timestamp) == period)
            .fold((0usize, 0.0f64), |(n, sum), (_, v)| (n + 1, sum + v));

        if count == 0 {
            return;
        }

        let average = sum / count as f64;
        self.historical.insert(period, average);

        while self.historical.len() > self.config.historical_capacity() {
            self.historical.pop_first();
        }

        info!(
            edge = %self.edge_name,
            period_start = period,
            period_secs = width,
            samples = count,
            average,
            "Sealed historical average"
        );
    }

    fn restore(&mut self, file: StoreFile) {
        for sample in file.recent {
            let key = SampleKey {
                timestamp: sample.timestamp,
                seq: self.next_seq,
            };
            self.next_seq += 1;
            self.recent.insert(key, sample.value);
        }
        for bucket in file.historical_average {
            self.historical.insert(bucket.period, bucket.average);
        }

        // Capacity may have shrunk since the file was written
        while self.recent.len() > self.config.fetch_history {
            self.recent.pop_first();
        }
        while self.historical.len() > self.config.historical_capacity() {
            self.historical.pop_first();
        }
    }

    fn persist(&self) -> Result<()> {
        let file = StoreFile {
            edge_name: self.edge_name.clone(),
            recent: self.samples().collect(),
            historical_average: self
                .historical_average()
                .map(|(period, average)| HistoricalBucket { period, average })
                .collect(),
        };
        write_store_file(&self.path, &file)
    }
}
