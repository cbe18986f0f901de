//! Decision core for the edge health control plane
//!
//! This crate provides the core functionality for:
//! - Bounded, persistent per-edge sample stores with an hourly archive
//! - Tiered health classification with a global kill-switch
//! - Locked diff-and-write reconciliation of segment edge lists
//! - Metrics and audit sinks injected by the caller

pub mod atomic;
pub mod audit;
pub mod decision;
pub mod error;
pub mod membership;
pub mod models;
pub mod observability;
pub mod store;

pub use audit::{AuditOperation, AuditRecord, AuditSink, TracingAuditSink};
pub use decision::{DecisionConfig, DecisionEngine, HealthCounts};
pub use error::{EdgeManageError, Result};
pub use membership::{
    DesiredMembership, MembershipReconciler, ReconcileLock, ReconcileOutcome, SegmentDirectory,
};
pub use models::*;
pub use observability::{EdgeMetrics, MetricsSink, NoopMetrics};
pub use store::{SampleStore, SharedSampleStore, StoreConfig};
