//! Health classification over per-edge sample stores
//!
//! Each pass walks every registered edge and applies a tiered set of
//! threshold checks; the first matching tier decides the verdict.

mod engine;

pub use engine::{DecisionEngine, HealthCounts};

use std::time::Duration;

/// Fetch time recorded when a probe does not complete
pub const DEFAULT_FETCH_TIMEOUT: f64 = 10.0;

/// Sliding window, ending at classification time, for the window tier
pub const DEFAULT_SLICE_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct DecisionConfig {
    /// Sentinel value a timed-out probe records
    pub fetch_timeout: f64,
    pub slice_window: Duration,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            slice_window: DEFAULT_SLICE_WINDOW,
        }
    }
}
