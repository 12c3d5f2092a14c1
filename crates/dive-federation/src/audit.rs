//! Audit sinks. Storage and querying of audit logs live elsewhere; the
//! orchestrator only hands entries over.

use std::sync::{Mutex, PoisonError};

use dive_types::AuditEntry;
use tracing::info;

/// Receives every audit entry produced while serving a request.
pub trait AuditSink: Send + Sync {
    fn record(&self, request_id: &str, entry: &AuditEntry);
}

/// Emits entries as `tracing` events under the `dive::audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, request_id: &str, entry: &AuditEntry) {
        info!(
            target: "dive::audit",
            request_id,
            instance = %entry.instance_id,
            action = %entry.action,
            outcome = ?entry.outcome,
            detail = entry.detail.as_deref().unwrap_or(""),
            timestamp = %entry.timestamp,
            "audit"
        );
    }
}

/// Keeps entries in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<(String, AuditEntry)>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.lock().iter().map(|(_, e)| e.clone()).collect()
    }

    pub fn entries_for(&self, request_id: &str) -> Vec<AuditEntry> {
        self.lock()
            .iter()
            .filter(|(id, _)| id == request_id)
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, AuditEntry)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, request_id: &str, entry: &AuditEntry) {
        self.lock().push((request_id.to_string(), entry.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dive_types::AuditOutcome;

    #[test]
    fn test_memory_sink_groups_by_request() {
        let sink = MemoryAuditSink::new();
        sink.record("req-1", &AuditEntry::new("USA", "local_evaluation", AuditOutcome::Allow));
        sink.record("req-2", &AuditEntry::new("USA", "local_evaluation", AuditOutcome::Deny));
        sink.record("req-1", &AuditEntry::new("USA", "cache_hit", AuditOutcome::Allow));

        assert_eq!(sink.len(), 3);
        let first = sink.entries_for("req-1");
        assert_eq!(first.len(), 2);
        assert_eq!(first[1].action, "cache_hit");
    }
}
