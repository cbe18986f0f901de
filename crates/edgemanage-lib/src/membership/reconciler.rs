//! Diff-and-write of segment files against a desired membership mapping

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::lock::ReconcileLock;
use super::segment::SegmentDirectory;
use crate::audit::{AuditOperation, AuditRecord, AuditSink};
use crate::error::{EdgeManageError, Result};
use crate::observability::MetricsSink;

/// Segment name to the edges that should serve it
pub type DesiredMembership = BTreeMap<String, Vec<String>>;

/// A segment whose create/update/delete failed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentFailure {
    pub segment: String,
    pub operation: AuditOperation,
    pub error: String,
}

/// Where each segment landed during one reconcile pass
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReconcileOutcome {
    /// Segments on disk before the pass
    pub existing: Vec<String>,
    pub created: Vec<String>,
    pub updated: Vec<String>,
    pub deleted: Vec<String>,
    pub errors: Vec<SegmentFailure>,
}

impl ReconcileOutcome {
    pub fn failed_segments(&self) -> Vec<String> {
        self.errors.iter().map(|f| f.segment.clone()).collect()
    }

    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// Turn a non-empty error bucket into
    /// [`EdgeManageError::PartialReconcileFailure`]
    pub fn ensure_complete(&self) -> Result<()> {
        if self.is_complete() {
            Ok(())
        } else {
            Err(EdgeManageError::PartialReconcileFailure {
                failed: self.failed_segments(),
            })
        }
    }
}

/// Short random id tying a segment write to its audit record
pub fn generate_reference_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

pub struct MembershipReconciler {
    segments: SegmentDirectory,
    metrics: Arc<dyn MetricsSink>,
    audit: Arc<dyn AuditSink>,
}

impl MembershipReconciler {
    pub fn new(
        segments: SegmentDirectory,
        metrics: Arc<dyn MetricsSink>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            segments,
            metrics,
            audit,
        }
    }

    pub fn segments(&self) -> &SegmentDirectory {
        &self.segments
    }

    /// Bring the segment directory in line with `desired`.
    ///
    /// Segments only on disk are deleted, segments only in `desired` are
    /// created, and segments in both are rewritten. A failure on one segment
    /// lands it in the error bucket without stopping the others. Only a
    /// failure to list the directory aborts the pass.
    pub fn apply(
        &self,
        lock: &ReconcileLock,
        desired: &DesiredMembership,
    ) -> Result<ReconcileOutcome> {
        let existing = self.segments.list()?;
        let wanted: BTreeSet<String> = desired.keys().cloned().collect();
        let previous_edges = self.edges_on_disk(&existing);

        info!(
            lock = %lock.path().display(),
            existing = existing.len(),
            desired = wanted.len(),
            "Reconciling segments"
        );

        let mut outcome = ReconcileOutcome {
            existing: existing.iter().cloned().collect(),
            ..Default::default()
        };

        for segment in existing.difference(&wanted) {
            match self.segments.remove(segment) {
                Ok(()) => {
                    info!(segment = %segment, "Segment deleted");
                    self.record(segment, AuditOperation::Delete, "");
                    outcome.deleted.push(segment.clone());
                }
                Err(e) => {
                    warn!(segment = %segment, error = %e, "Segment delete failed");
                    outcome.errors.push(failure(segment, AuditOperation::Delete, &e));
                }
            }
        }

        for segment in wanted.difference(&existing) {
            self.write_segment(segment, &desired[segment], AuditOperation::Create, &mut outcome);
        }

        for segment in wanted.intersection(&existing) {
            self.write_segment(segment, &desired[segment], AuditOperation::Update, &mut outcome);
        }

        self.update_rotation(desired, &previous_edges, &outcome);

        info!(
            created = outcome.created.len(),
            updated = outcome.updated.len(),
            deleted = outcome.deleted.len(),
            errors = outcome.errors.len(),
            "Reconcile pass complete"
        );
        Ok(outcome)
    }

    fn write_segment(
        &self,
        segment: &str,
        edges: &[String],
        operation: AuditOperation,
        outcome: &mut ReconcileOutcome,
    ) {
        let edges = dedup_edges(edges);
        let reference_id = generate_reference_id();
        info!(
            segment = %segment,
            reference_id = %reference_id,
            operation = %operation,
            edges = ?edges,
            "Writing segment"
        );

        match self.segments.write(segment, &edges, &reference_id) {
            Ok(()) => {
                self.record(segment, operation, &reference_id);
                let bucket = match operation {
                    AuditOperation::Create => &mut outcome.created,
                    _ => &mut outcome.updated,
                };
                bucket.push(segment.to_string());
            }
            Err(e) => {
                warn!(
                    segment = %segment,
                    reference_id = %reference_id,
                    operation = %operation,
                    error = %e,
                    "Segment write failed"
                );
                outcome.errors.push(failure(segment, operation, &e));
            }
        }
    }

    fn record(&self, segment: &str, operation: AuditOperation, reference_id: &str) {
        self.audit
            .emit(&AuditRecord::new(segment, operation, reference_id));
        self.metrics.record_segment_operation(operation.as_str());
    }

    /// Edges listed in each current file; unreadable files are skipped
    fn edges_on_disk(&self, existing: &BTreeSet<String>) -> BTreeMap<String, Vec<String>> {
        let mut edges = BTreeMap::new();
        for segment in existing {
            match self.segments.read(segment) {
                Ok(listed) => {
                    edges.insert(segment.clone(), listed);
                }
                Err(e) => warn!(segment = %segment, error = %e, "Could not read segment"),
            }
        }
        edges
    }

    /// Flag the edges the segment files list after the pass. A written
    /// segment contributes its desired edges; a failed one keeps whatever
    /// it listed before.
    fn update_rotation(
        &self,
        desired: &DesiredMembership,
        previous: &BTreeMap<String, Vec<String>>,
        outcome: &ReconcileOutcome,
    ) {
        let written = outcome.created.iter().chain(&outcome.updated);
        let failed = outcome.errors.iter().map(|f| &f.segment);

        let mut in_rotation: BTreeSet<&String> = written
            .filter_map(|segment| desired.get(segment))
            .flatten()
            .collect();
        in_rotation.extend(
            failed
                .filter_map(|segment| previous.get(segment))
                .flatten(),
        );

        for edge in &in_rotation {
            self.metrics.set_in_rotation(edge, true);
        }
        for edge in previous.values().flatten() {
            if !in_rotation.contains(edge) {
                self.metrics.set_in_rotation(edge, false);
            }
        }
    }
}

fn failure(segment: &str, operation: AuditOperation, error: &EdgeManageError) -> SegmentFailure {
    SegmentFailure {
        segment: segment.to_string(),
        operation,
        error: error.to_string(),
    }
}

/// Keep the first occurrence of each edge, in caller order
fn dedup_edges(edges: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    edges
        .iter()
        .filter(|e| seen.insert(e.as_str()))
        .cloned()
        .collect()
}
