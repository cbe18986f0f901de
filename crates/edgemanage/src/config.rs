//! Edgemanage configuration

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use edgemanage_lib::{DecisionConfig, StoreConfig};
use serde::Deserialize;

/// Runtime configuration, read from an optional file then `EDGEMANAGE_*`
/// environment variables
#[derive(Debug, Clone, Deserialize)]
pub struct EdgeManageConfig {
    /// Directory holding one `.edgestore` file per edge
    #[serde(default = "default_healthdata_store")]
    pub healthdata_store: PathBuf,

    /// Directory holding one edge-list file per dnet
    #[serde(default = "default_edgelist_dir")]
    pub edgelist_dir: PathBuf,

    /// Lock file shared by every process touching `edgelist_dir`
    #[serde(default = "default_lockfile")]
    pub lockfile: PathBuf,

    /// Fetch time in seconds under which an edge is healthy
    #[serde(default = "default_goodenough")]
    pub goodenough: f64,

    /// Recent samples kept per edge
    #[serde(default = "default_fetch_history")]
    pub fetch_history: usize,

    /// Value recorded for a probe that timed out
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout: f64,

    /// Decision window in seconds
    #[serde(default = "default_decision_slice_window")]
    pub decision_slice_window: u64,

    /// Historical-average bucket width in seconds
    #[serde(default = "default_history_period")]
    pub history_period: u64,

    /// Prometheus textfile to write after classification
    #[serde(default)]
    pub prometheus_logs: Option<PathBuf>,

    /// Fail every edge regardless of data
    #[serde(default)]
    pub edges_disabled: bool,
}

fn default_healthdata_store() -> PathBuf {
    PathBuf::from("/var/lib/edgemanage/health")
}

fn default_edgelist_dir() -> PathBuf {
    PathBuf::from("/etc/edgemanage/edges")
}

fn default_lockfile() -> PathBuf {
    PathBuf::from("/var/lock/edgemanage.lock")
}

fn default_goodenough() -> f64 {
    0.7
}

fn default_fetch_history() -> usize {
    edgemanage_lib::store::DEFAULT_FETCH_HISTORY
}

fn default_fetch_timeout() -> f64 {
    edgemanage_lib::decision::DEFAULT_FETCH_TIMEOUT
}

fn default_decision_slice_window() -> u64 {
    edgemanage_lib::decision::DEFAULT_SLICE_WINDOW.as_secs()
}

fn default_history_period() -> u64 {
    edgemanage_lib::store::DEFAULT_HISTORY_PERIOD.as_secs()
}

impl EdgeManageConfig {
    /// Load configuration from an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let config = builder
            .add_source(config::Environment::with_prefix("EDGEMANAGE"))
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid edgemanage configuration")
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            fetch_history: self.fetch_history,
            history_period: Duration::from_secs(self.history_period),
        }
    }

    pub fn decision_config(&self) -> DecisionConfig {
        DecisionConfig {
            fetch_timeout: self.fetch_timeout,
            slice_window: Duration::from_secs(self.decision_slice_window),
        }
    }
}
