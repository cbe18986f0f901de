//! Segment membership reconciliation
//!
//! This module provides:
//! - The process-wide non-blocking reconcile lock
//! - Reading, listing and atomically writing segment edge-list files
//! - The diff-and-write reconciler with audit and rotation reporting

mod lock;
mod reconciler;
mod segment;


pub use lock::ReconcileLock;
pub use reconciler::{
    generate_reference_id, DesiredMembership, MembershipReconciler, ReconcileOutcome,
    SegmentFailure,
};
pub use segment::{parse_edge_list, render_edge_list, SegmentDirectory};
