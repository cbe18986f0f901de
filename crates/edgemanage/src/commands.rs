//! Command implementations

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use edgemanage_lib::{
    DecisionEngine, DesiredMembership, EdgeMetrics, Health, HealthCounts, MembershipReconciler,
    ReconcileLock, SampleStore, SegmentDirectory, TracingAuditSink,
};
use serde::Serialize;
use tracing::info;

use crate::config::EdgeManageConfig;

const TIMEOUT_KEYWORD: &str = "timeout";

#[derive(Serialize)]
struct ClassifyReport {
    edges_disabled: bool,
    counts: HealthCounts,
    verdicts: BTreeMap<String, Option<Health>>,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

fn parse_sample(config: &EdgeManageConfig, value: &str) -> Result<f64> {
    if value.eq_ignore_ascii_case(TIMEOUT_KEYWORD) {
        return Ok(config.fetch_timeout);
    }
    let parsed: f64 = value
        .parse()
        .with_context(|| format!("Invalid fetch time {:?}", value))?;
    if !parsed.is_finite() || parsed < 0.0 {
        bail!("Fetch time must be a non-negative number, got {}", value);
    }
    Ok(parsed)
}

pub fn record(
    config: &EdgeManageConfig,
    edge: &str,
    value: &str,
    timestamp: Option<f64>,
) -> Result<()> {
    let value = parse_sample(config, value)?;
    let mut store = SampleStore::open(edge, &config.healthdata_store, config.store_config())
        .with_context(|| format!("Failed to open store for {}", edge))?;

    let recorded = match timestamp {
        Some(ts) => store.add_value_at(value, ts),
        None => store.add_value(value),
    };
    recorded.with_context(|| format!("Failed to record sample for {}", edge))?;

    info!(edge = %edge, value, samples = store.len(), "Sample recorded");
    Ok(())
}

pub fn classify(config: &EdgeManageConfig, dnet: Option<&str>, mut edges: Vec<String>) -> Result<()> {
    if let Some(dnet) = dnet {
        let listed = SegmentDirectory::new(&config.edgelist_dir)
            .read(dnet)
            .with_context(|| format!("Failed to read dnet {}", dnet))?;
        edges.extend(listed);
    }
    if edges.is_empty() {
        bail!("No edges to classify: pass edge names or --dnet");
    }

    let metrics = Arc::new(EdgeMetrics::new()?);
    let mut engine = DecisionEngine::new(config.decision_config(), metrics.clone());
    engine.set_edges_disabled(config.edges_disabled);

    for edge in &edges {
        let store = SampleStore::open(edge, &config.healthdata_store, config.store_config())
            .with_context(|| format!("Failed to open store for {}", edge))?;
        engine.register(edge.clone(), store.into_shared());
    }

    let counts = engine.classify(config.goodenough);

    if let Some(path) = &config.prometheus_logs {
        metrics
            .write_textfile(path)
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
    }

    let report = ClassifyReport {
        edges_disabled: engine.edges_disabled(),
        counts,
        verdicts: engine
            .judgements()
            .map(|(edge, health)| (edge.to_string(), health))
            .collect(),
    };
    print_json(&report)
}

pub fn segments(config: &EdgeManageConfig) -> Result<()> {
    let listed = SegmentDirectory::new(&config.edgelist_dir)
        .list()
        .context("Failed to list dnets")?;
    print_json(&listed)
}

pub fn apply(config: &EdgeManageConfig, mapping: &Path) -> Result<()> {
    let raw = std::fs::read_to_string(mapping)
        .with_context(|| format!("Failed to read mapping {}", mapping.display()))?;
    let desired: DesiredMembership =
        serde_json::from_str(&raw).context("Mapping must be a JSON object of dnet to edge list")?;

    let lock = ReconcileLock::try_acquire(&config.lockfile)
        .context("Couldn't acquire edge_conf lockfile")?;

    let metrics = Arc::new(EdgeMetrics::new()?);
    let reconciler = MembershipReconciler::new(
        SegmentDirectory::new(&config.edgelist_dir),
        metrics.clone(),
        Arc::new(TracingAuditSink),
    );

    let outcome = reconciler.apply(&lock, &desired)?;
    drop(lock);

    if let Some(path) = &config.prometheus_logs {
        metrics
            .write_textfile(path)
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
    }

    print_json(&outcome)?;
    outcome.ensure_complete()?;
    Ok(())
}
