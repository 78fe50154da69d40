//! Append-only audit records, one per gateway call.
//!
//! The gateway is the sole producer; sinks only receive. Rejected calls are
//! audited with the same fidelity as completed ones.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    Read,
    Create,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum AuditOutcome {
    Completed { records: usize },
    Created { id: i64 },
    Rejected { reason: String },
    Failed { reason: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    pub record_id: String,
    pub occurred_at: DateTime<Utc>,
    pub uid: i64,
    pub tenant_id: i64,
    pub entity: String,
    pub operation: AuditOperation,
    /// Rendered final domain (after scope injection) for reads; empty for
    /// creates.
    pub domain: String,
    /// Requested fields for reads, supplied value keys for creates.
    pub fields_or_values: Vec<String>,
    pub outcome: AuditOutcome,
}

impl AuditRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        uid: i64,
        tenant_id: i64,
        entity: impl Into<String>,
        operation: AuditOperation,
        domain: impl Into<String>,
        fields_or_values: Vec<String>,
        outcome: AuditOutcome,
    ) -> Self {
        Self {
            record_id: Uuid::new_v4().to_string(),
            occurred_at: Utc::now(),
            uid,
            tenant_id,
            entity: entity.into(),
            operation,
            domain: domain.into(),
            fields_or_values,
            outcome,
        }
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, record: AuditRecord);
}

/// Collects records in memory; the default sink for tests and the CLI.
#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    records: Arc<Mutex<Vec<AuditRecord>>>,
}

impl InMemoryAuditSink {
    pub fn records(&self) -> Vec<AuditRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, record: AuditRecord) {
        match self.records.lock() {
            Ok(mut records) => records.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
    }
}

/// Forwards every record to the process log stream for an external
/// collector to pick up.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, record: AuditRecord) {
        tracing::info!(
            target: "opsgate::audit",
            record_id = %record.record_id,
            uid = record.uid,
            tenant_id = record.tenant_id,
            entity = %record.entity,
            operation = ?record.operation,
            domain = %record.domain,
            fields_or_values = ?record.fields_or_values,
            outcome = ?record.outcome,
            "gateway call"
        );
    }
}

/// Fan-out to several sinks; lets deployments keep an in-memory tail while
/// also streaming to the collector.
#[derive(Clone, Default)]
pub struct CompositeAuditSink {
    sinks: Vec<Arc<dyn AuditSink>>,
}

impl CompositeAuditSink {
    pub fn push(&mut self, sink: Arc<dyn AuditSink>) {
        self.sinks.push(sink);
    }
}

impl AuditSink for CompositeAuditSink {
    fn emit(&self, record: AuditRecord) {
        for sink in &self.sinks {
            sink.emit(record.clone());
        }
    }
}
