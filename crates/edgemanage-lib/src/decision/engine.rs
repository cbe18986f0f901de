use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, PoisonError};
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use super::DecisionConfig;
use crate::error::{EdgeManageError, Result};
use crate::models::{EdgeReadings, Health};
use crate::observability::MetricsSink;
use crate::store::{SampleStore, SharedSampleStore};

/// Number of edges per verdict from one classification pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HealthCounts(BTreeMap<Health, usize>);

impl HealthCounts {
    fn zeroed() -> Self {
        Self(Health::ALL.iter().map(|h| (*h, 0)).collect())
    }

    fn bump(&mut self, health: Health) {
        *self.0.entry(health).or_insert(0) += 1;
    }

    pub fn get(&self, health: Health) -> usize {
        self.0.get(&health).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Health, usize)> + '_ {
        self.0.iter().map(|(h, n)| (*h, *n))
    }
}

/// Values read from one store under a single lock acquisition
struct Snapshot {
    last_value: f64,
    running_average: f64,
    window: Option<(usize, f64)>,
}

impl Snapshot {
    fn take(store: &SampleStore, lower: f64, upper: f64) -> Option<Self> {
        let last_value = store.last_value()?;
        let running_average = store.current_average().ok()?;
        Some(Self {
            last_value,
            running_average,
            window: store.window_average(lower, upper),
        })
    }

    fn readings(&self) -> EdgeReadings {
        EdgeReadings {
            last_value: self.last_value,
            running_average: self.running_average,
            window_average: self.window.map(|(_, avg)| avg),
        }
    }
}

/// Tracks registered edges and their latest verdicts
pub struct DecisionEngine {
    config: DecisionConfig,
    stores: HashMap<String, SharedSampleStore>,
    /// `None` until the edge has been through a classification pass
    judgements: HashMap<String, Option<Health>>,
    edges_disabled: bool,
    metrics: Arc<dyn MetricsSink>,
}

impl DecisionEngine {
    pub fn new(config: DecisionConfig, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            config,
            stores: HashMap::new(),
            judgements: HashMap::new(),
            edges_disabled: false,
            metrics,
        }
    }

    /// Track an edge. Registering a name again replaces its store and
    /// clears its verdict.
    pub fn register(&mut self, edge_name: impl Into<String>, store: SharedSampleStore) {
        let edge_name = edge_name.into();
        debug!(edge = %edge_name, "Registered edge");
        self.stores.insert(edge_name.clone(), store);
        self.judgements.insert(edge_name, None);
    }

    /// Force every edge to fail on the next classification pass
    pub fn set_edges_disabled(&mut self, disabled: bool) {
        self.edges_disabled = disabled;
    }

    pub fn edges_disabled(&self) -> bool {
        self.edges_disabled
    }

    pub fn edges(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }

    pub fn config(&self) -> &DecisionConfig {
        &self.config
    }

    /// Classify every registered edge against `good_enough` seconds
    pub fn classify(&mut self, good_enough: f64) -> HealthCounts {
        let now = Utc::now().timestamp_micros() as f64 / 1_000_000.0;
        self.classify_at(good_enough, now)
    }

    /// Classify with the decision window ending at `now` (epoch seconds)
    pub fn classify_at(&mut self, good_enough: f64, now: f64) -> HealthCounts {
        let started = Instant::now();
        let mut counts = HealthCounts::zeroed();

        if self.edges_disabled {
            for (edge_name, judgement) in self.judgements.iter_mut() {
                *judgement = Some(Health::Fail);
                counts.bump(Health::Fail);
                self.metrics.set_reachable(edge_name, false);
            }
            warn!(
                edges = counts.get(Health::Fail),
                "FAIL: edges have been disabled"
            );
            return counts;
        }

        let lower = now - self.config.slice_window.as_secs_f64();
        for (edge_name, store) in &self.stores {
            let snapshot = {
                let guard = store.read().unwrap_or_else(PoisonError::into_inner);
                Snapshot::take(&guard, lower, now)
            };

            let health = match snapshot {
                Some(snapshot) => {
                    self.metrics.record_readings(edge_name, &snapshot.readings());
                    self.judge(edge_name, &snapshot, good_enough)
                }
                None => {
                    warn!(edge = %edge_name, "FAIL: no samples recorded for edge");
                    Health::Fail
                }
            };

            self.metrics.set_reachable(edge_name, health.is_passing());
            self.judgements.insert(edge_name.clone(), Some(health));
            counts.bump(health);
        }

        self.metrics
            .observe_classification(started.elapsed().as_secs_f64());
        debug!(counts = ?counts, "Classification pass complete");
        counts
    }

    fn judge(&self, edge_name: &str, snapshot: &Snapshot, good_enough: f64) -> Health {
        let last = snapshot.last_value;

        if last < good_enough {
            info!(
                edge = %edge_name,
                last_value = last,
                good_enough,
                "PASS: last fetch is under the good_enough threshold"
            );
            return Health::PassThreshold;
        }

        // A timed-out fetch fails the edge before any averaging can mask it
        if last == self.config.fetch_timeout {
            info!(
                edge = %edge_name,
                fetch_timeout = self.config.fetch_timeout,
                "FAIL: last fetch hit the fetch timeout"
            );
            return Health::Fail;
        }

        if let Some((count, window_average)) = snapshot.window {
            if window_average < good_enough {
                info!(
                    edge = %edge_name,
                    samples = count,
                    window_average,
                    good_enough,
                    "UNSURE: last fetch is over the threshold but the window average is under it"
                );
                return Health::PassWindow;
            }
        }

        if snapshot.running_average < good_enough {
            info!(
                edge = %edge_name,
                running_average = snapshot.running_average,
                good_enough,
                "UNSURE: last fetch is over the threshold but the running average is under it"
            );
            return Health::PassAverage;
        }

        info!(
            edge = %edge_name,
            last_value = last,
            fetch_timeout = self.config.fetch_timeout,
            "PASS: last fetch is over the threshold but not timing out"
        );
        Health::Pass
    }

    /// Verdict from the last pass; `None` if the edge has not been judged
    pub fn judgement(&self, edge_name: &str) -> Result<Option<Health>> {
        self.judgements
            .get(edge_name)
            .copied()
            .ok_or_else(|| EdgeManageError::edge_not_found(edge_name))
    }

    /// True unless the last verdict was `Fail`
    pub fn is_passing(&self, edge_name: &str) -> Result<bool> {
        Ok(self.judgement(edge_name)? != Some(Health::Fail))
    }

    /// Running average of the edge's recent samples
    pub fn average(&self, edge_name: &str) -> Result<f64> {
        let store = self
            .stores
            .get(edge_name)
            .ok_or_else(|| EdgeManageError::edge_not_found(edge_name))?;
        let guard = store.read().unwrap_or_else(PoisonError::into_inner);
        guard.current_average()
    }

    /// All verdicts from the last pass
    pub fn judgements(&self) -> impl Iterator<Item = (&str, Option<Health>)> {
        self.judgements.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::DEFAULT_FETCH_TIMEOUT;
    use crate::observability::NoopMetrics;
    use crate::store::StoreConfig;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    const NOW: f64 = 1_645_210_800.0;
    const GOOD_ENOUGH: f64 = 0.5;

    /// Captures what the engine reports
    #[derive(Default)]
    struct RecordingMetrics {
        readings: Mutex<Vec<(String, EdgeReadings)>>,
        reachable: Mutex<HashMap<String, bool>>,
    }

    impl MetricsSink for RecordingMetrics {
        fn record_readings(&self, edge: &str, readings: &EdgeReadings) {
            self.readings
                .lock()
                .unwrap()
                .push((edge.to_string(), *readings));
        }

        fn set_reachable(&self, edge: &str, reachable: bool) {
            self.reachable
                .lock()
                .unwrap()
                .insert(edge.to_string(), reachable);
        }

        fn set_in_rotation(&self, _edge: &str, _in_rotation: bool) {}
    }

    fn engine() -> DecisionEngine {
        DecisionEngine::new(DecisionConfig::default(), Arc::new(NoopMetrics))
    }

    /// Store with samples as `(seconds before NOW, value)`
    fn store_with(dir: &TempDir, edge: &str, samples: &[(f64, f64)]) -> SharedSampleStore {
        let config = StoreConfig {
            fetch_history: 20,
            history_period: Duration::from_secs(3600),
        };
        let mut store = SampleStore::open(edge, dir.path(), config).unwrap();
        for (age, value) in samples {
            store.add_value_at(*value, NOW - age).unwrap();
        }
        store.into_shared()
    }

    #[test]
    fn test_last_value_under_threshold_passes_threshold() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine();
        // Window and average both far above the threshold
        engine.register(
            "edge1",
            store_with(&dir, "edge1", &[(30.0, 9.0), (20.0, 9.0), (1.0, 0.1)]),
        );

        let counts = engine.classify_at(GOOD_ENOUGH, NOW);

        assert_eq!(engine.judgement("edge1").unwrap(), Some(Health::PassThreshold));
        assert_eq!(counts.get(Health::PassThreshold), 1);
    }

    #[test]
    fn test_timeout_fails_despite_good_averages() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine();
        let mut samples: Vec<(f64, f64)> = (2..15).map(|i| (i as f64, 0.01)).collect();
        samples.push((1.0, DEFAULT_FETCH_TIMEOUT));
        engine.register("edge1", store_with(&dir, "edge1", &samples));

        // Window and running averages are still well under 1.0
        let counts = engine.classify_at(1.0, NOW);

        assert_eq!(engine.judgement("edge1").unwrap(), Some(Health::Fail));
        assert!(!engine.is_passing("edge1").unwrap());
        assert_eq!(counts.get(Health::Fail), 1);
    }

    #[test]
    fn test_window_average_passes_window() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine();
        // Old slow samples outside the window drag the running average up
        engine.register(
            "edge1",
            store_with(
                &dir,
                "edge1",
                &[(600.0, 5.0), (500.0, 5.0), (30.0, 0.1), (20.0, 0.1), (1.0, 0.8)],
            ),
        );

        engine.classify_at(GOOD_ENOUGH, NOW);

        assert_eq!(engine.judgement("edge1").unwrap(), Some(Health::PassWindow));
    }

    #[test]
    fn test_running_average_passes_average() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine();
        // Nothing inside the window; running average (0.1 * 3 + 0.8) / 4 = 0.275
        engine.register(
            "edge1",
            store_with(
                &dir,
                "edge1",
                &[(600.0, 0.1), (500.0, 0.1), (400.0, 0.1), (300.0, 0.8)],
            ),
        );

        engine.classify_at(GOOD_ENOUGH, NOW);

        assert_eq!(engine.judgement("edge1").unwrap(), Some(Health::PassAverage));
    }

    #[test]
    fn test_slow_but_not_timing_out_is_weak_pass() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine();
        engine.register(
            "edge1",
            store_with(&dir, "edge1", &[(30.0, 3.0), (1.0, 4.0)]),
        );

        engine.classify_at(GOOD_ENOUGH, NOW);

        assert_eq!(engine.judgement("edge1").unwrap(), Some(Health::Pass));
        assert!(engine.is_passing("edge1").unwrap());
    }

    #[test]
    fn test_disabled_edges_all_fail_without_stats() {
        let dir = TempDir::new().unwrap();
        let metrics = Arc::new(RecordingMetrics::default());
        let mut engine = DecisionEngine::new(DecisionConfig::default(), metrics.clone());
        engine.register("edge1", store_with(&dir, "edge1", &[(1.0, 0.1)]));
        engine.register("edge2", store_with(&dir, "edge2", &[(1.0, 0.2)]));
        engine.set_edges_disabled(true);

        let counts = engine.classify_at(GOOD_ENOUGH, NOW);

        assert_eq!(counts.get(Health::Fail), 2);
        assert_eq!(counts.total(), 2);
        assert_eq!(engine.judgement("edge1").unwrap(), Some(Health::Fail));
        assert_eq!(engine.judgement("edge2").unwrap(), Some(Health::Fail));
        assert!(metrics.readings.lock().unwrap().is_empty());
    }

    #[test]
    fn test_readings_report_missing_window() {
        let dir = TempDir::new().unwrap();
        let metrics = Arc::new(RecordingMetrics::default());
        let mut engine = DecisionEngine::new(DecisionConfig::default(), metrics.clone());
        engine.register("edge1", store_with(&dir, "edge1", &[(600.0, 0.2)]));
        engine.register("edge2", store_with(&dir, "edge2", &[(5.0, 0.4)]));

        engine.classify_at(GOOD_ENOUGH, NOW);

        let readings: HashMap<String, EdgeReadings> =
            metrics.readings.lock().unwrap().iter().cloned().collect();
        assert_eq!(readings["edge1"].window_average, None);
        assert_eq!(readings["edge2"].window_average, Some(0.4));
        assert_eq!(readings["edge2"].last_value, 0.4);
        assert!(metrics.reachable.lock().unwrap()["edge1"]);
    }

    #[test]
    fn test_empty_store_fails() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine();
        engine.register("edge1", store_with(&dir, "edge1", &[]));

        let counts = engine.classify_at(GOOD_ENOUGH, NOW);

        assert_eq!(counts.get(Health::Fail), 1);
        assert!(matches!(
            engine.average("edge1"),
            Err(EdgeManageError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_counts_cover_every_class() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine();
        engine.register("edge1", store_with(&dir, "edge1", &[(1.0, 0.1)]));
        engine.register("edge2", store_with(&dir, "edge2", &[(1.0, 3.0)]));

        let counts = engine.classify_at(GOOD_ENOUGH, NOW);

        assert_eq!(counts.iter().count(), Health::ALL.len());
        assert_eq!(counts.get(Health::PassWindow), 0);
        assert_eq!(counts.total(), 2);
    }

    #[test]
    fn test_accessors_before_and_after_registration() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine();

        assert!(matches!(
            engine.judgement("edge1"),
            Err(EdgeManageError::NotFound { .. })
        ));
        assert!(engine.is_passing("edge1").is_err());
        assert!(engine.average("edge1").is_err());

        engine.register("edge1", store_with(&dir, "edge1", &[(1.0, 0.25), (2.0, 0.75)]));
        assert_eq!(engine.judgement("edge1").unwrap(), None);
        assert!(engine.is_passing("edge1").unwrap());
        assert_eq!(engine.average("edge1").unwrap(), 0.5);
    }

    #[test]
    fn test_reregistration_resets_verdict() {
        let dir = TempDir::new().unwrap();
        let mut engine = engine();
        engine.register("edge1", store_with(&dir, "edge1", &[(1.0, 0.1)]));
        engine.classify_at(GOOD_ENOUGH, NOW);

        engine.register("edge1", store_with(&dir, "edge1-b", &[(1.0, 3.0)]));
        assert_eq!(engine.judgement("edge1").unwrap(), None);

        engine.classify_at(GOOD_ENOUGH, NOW);
        assert_eq!(engine.judgement("edge1").unwrap(), Some(Health::Pass));
    }
}
