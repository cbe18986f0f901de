//! Audit records for segment file mutations

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOperation {
    Create,
    Update,
    Delete,
}

impl AuditOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOperation::Create => "create",
            AuditOperation::Update => "update",
            AuditOperation::Delete => "delete",
        }
    }
}

impl fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One segment mutation, correlated with the file header by `reference_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub segment: String,
    pub operation: AuditOperation,
    /// Empty for deletes, which write no file
    pub reference_id: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(
        segment: impl Into<String>,
        operation: AuditOperation,
        reference_id: impl Into<String>,
    ) -> Self {
        Self {
            segment: segment.into(),
            operation,
            reference_id: reference_id.into(),
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for AuditRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Segment {} changed mode to {} with comment ref {}",
            self.segment, self.operation, self.reference_id
        )
    }
}

/// Fire-and-forget receiver of audit records
pub trait AuditSink: Send + Sync {
    fn emit(&self, record: &AuditRecord);
}

/// Emits each record as a structured event on the `edge_conf` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, record: &AuditRecord) {
        info!(
            target: "edge_conf",
            event = "segment_changed",
            segment = %record.segment,
            operation = %record.operation,
            reference_id = %record.reference_id,
            timestamp = %record.timestamp.to_rfc3339(),
            "{}",
            record
        );
    }
}
