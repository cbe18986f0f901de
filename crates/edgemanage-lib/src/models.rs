//! Core data models shared across components

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single probe result for an edge
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    /// Fetch time in seconds, or the configured fetch timeout
    pub value: f64,
}

/// Health verdict for an edge after a classification pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    /// Last fetch was under the good-enough threshold
    PassThreshold,
    /// Recent window average was under the threshold
    PassWindow,
    /// Running average was under the threshold
    PassAverage,
    /// Not under the threshold but not timing out
    Pass,
    /// Last fetch timed out, or edges are disabled
    Fail,
}

impl Health {
    pub const ALL: [Health; 5] = [
        Health::PassThreshold,
        Health::PassWindow,
        Health::PassAverage,
        Health::Pass,
        Health::Fail,
    ];

    pub fn is_passing(&self) -> bool {
        !matches!(self, Health::Fail)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Health::PassThreshold => "pass_threshold",
            Health::PassWindow => "pass_window",
            Health::PassAverage => "pass_average",
            Health::Pass => "pass",
            Health::Fail => "fail",
        }
    }
}

impl fmt::Display for Health {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-edge readings reported to the metrics sink
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EdgeReadings {
    pub last_value: f64,
    pub running_average: f64,
    /// `None` when no sample falls inside the decision window
    pub window_average: Option<f64>,
}
