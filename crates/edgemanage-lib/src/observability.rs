//! Metrics sink for edge health readings
//!
//! Provides:
//! - The [`MetricsSink`] seam the decision engine and reconciler report into
//! - Prometheus gauges per edge on an owned registry, rendered to a textfile

use std::path::Path;

use prometheus::{
    Encoder, GaugeVec, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder,
};
use tracing::debug;

use crate::atomic::write_atomic;
use crate::error::Result;
use crate::models::EdgeReadings;

/// Reported as the window average when the decision window holds no samples
pub const NO_DATA: f64 = -1.0;

/// Buckets for classification pass duration (in seconds)
const CLASSIFICATION_BUCKETS: &[f64] = &[0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0];

/// Receiver of per-edge health readings
pub trait MetricsSink: Send + Sync {
    /// Last value, running average and window average for an edge
    fn record_readings(&self, edge: &str, readings: &EdgeReadings);

    /// Whether the last classification found the edge reachable
    fn set_reachable(&self, edge: &str, reachable: bool);

    /// Whether the edge is listed in any segment
    fn set_in_rotation(&self, edge: &str, in_rotation: bool);

    /// Count one create/update/delete applied to a segment file
    fn record_segment_operation(&self, _operation: &str) {}

    fn observe_classification(&self, _duration_secs: f64) {}
}

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record_readings(&self, _edge: &str, _readings: &EdgeReadings) {}
    fn set_reachable(&self, _edge: &str, _reachable: bool) {}
    fn set_in_rotation(&self, _edge: &str, _in_rotation: bool) {}
}

/// Prometheus-backed sink with its own registry
#[derive(Clone)]
pub struct EdgeMetrics {
    registry: Registry,
    response_time: GaugeVec,
    average_time: GaugeVec,
    timeslice: GaugeVec,
    reachable_status: GaugeVec,
    in_rotation: GaugeVec,
    segment_operations: IntCounterVec,
    classification_seconds: Histogram,
}

impl EdgeMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let edge_gauge = |name: &str, help: &str| -> Result<GaugeVec> {
            let gauge = GaugeVec::new(Opts::new(name, help), &["edge"])?;
            registry.register(Box::new(gauge.clone()))?;
            Ok(gauge)
        };

        let response_time = edge_gauge(
            "edgemanage_response_time",
            "Most recent fetch time of the edge in seconds",
        )?;
        let average_time = edge_gauge(
            "edgemanage_average_time",
            "Average fetch time over the recent samples",
        )?;
        let timeslice = edge_gauge(
            "edgemanage_timeslice",
            "Average fetch time inside the decision window, -1 without data",
        )?;
        let reachable_status = edge_gauge(
            "edgemanage_reachable_status",
            "1 when the last classification did not fail the edge",
        )?;
        let in_rotation = edge_gauge(
            "edgemanage_in_rotation",
            "1 when the edge is listed in a segment",
        )?;

        let segment_operations = IntCounterVec::new(
            Opts::new(
                "edgemanage_segment_operations_total",
                "Segment files created, updated or deleted",
            ),
            &["op"],
        )?;
        registry.register(Box::new(segment_operations.clone()))?;

        let classification_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "edgemanage_classification_seconds",
                "Time spent classifying all registered edges",
            )
            .buckets(CLASSIFICATION_BUCKETS.to_vec()),
        )?;
        registry.register(Box::new(classification_seconds.clone()))?;

        Ok(Self {
            registry,
            response_time,
            average_time,
            timeslice,
            reachable_status,
            in_rotation,
            segment_operations,
            classification_seconds,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render the registry in the Prometheus text format
    pub fn render(&self) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }

    /// Atomically write the rendered metrics for a textfile collector
    pub fn write_textfile(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let buffer = self.render()?;
        write_atomic(path, &buffer)?;
        debug!(path = %path.display(), bytes = buffer.len(), "Wrote metrics textfile");
        Ok(())
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

impl MetricsSink for EdgeMetrics {
    fn record_readings(&self, edge: &str, readings: &EdgeReadings) {
        self.response_time
            .with_label_values(&[edge])
            .set(readings.last_value);
        self.average_time
            .with_label_values(&[edge])
            .set(readings.running_average);
        self.timeslice
            .with_label_values(&[edge])
            .set(readings.window_average.unwrap_or(NO_DATA));
    }

    fn set_reachable(&self, edge: &str, reachable: bool) {
        self.reachable_status
            .with_label_values(&[edge])
            .set(flag(reachable));
    }

    fn set_in_rotation(&self, edge: &str, in_rotation: bool) {
        self.in_rotation
            .with_label_values(&[edge])
            .set(flag(in_rotation));
    }

    fn record_segment_operation(&self, operation: &str) {
        self.segment_operations.with_label_values(&[operation]).inc();
    }

    fn observe_classification(&self, duration_secs: f64) {
        self.classification_seconds.observe(duration_secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_metrics_are_isolated_per_instance() {
        // Owned registries: two instances never collide on registration
        let first = EdgeMetrics::new().unwrap();
        let second = EdgeMetrics::new().unwrap();

        first.set_reachable("edge1.example.net", true);
        let rendered = String::from_utf8(second.render().unwrap()).unwrap();
        assert!(!rendered.contains("edge1.example.net"));
    }

    #[test]
    fn test_window_without_data_renders_sentinel() {
        let metrics = EdgeMetrics::new().unwrap();
        metrics.record_readings(
            "edge1.example.net",
            &EdgeReadings {
                last_value: 0.5,
                running_average: 0.75,
                window_average: None,
            },
        );

        let rendered = String::from_utf8(metrics.render().unwrap()).unwrap();
        assert!(rendered.contains("edgemanage_timeslice{edge=\"edge1.example.net\"} -1"));
        assert!(rendered.contains("edgemanage_response_time{edge=\"edge1.example.net\"} 0.5"));
    }

    #[test]
    fn test_write_textfile() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("edgemanage.prom");

        let metrics = EdgeMetrics::new().unwrap();
        metrics.set_in_rotation("edge2.example.net", false);
        metrics.record_segment_operation("create");
        metrics.write_textfile(&path).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("edgemanage_in_rotation{edge=\"edge2.example.net\"} 0"));
        assert!(contents.contains("edgemanage_segment_operations_total{op=\"create\"} 1"));
    }
}
