//! Security alert forwarder
//!
//! Notifies the collector's evaluator of a high/critical entry together
//! with the configured thresholds. The client never decides whether an
//! alert fires; it only forwards. Failures are reported and swallowed.

use crate::collector::{with_deadline, Collector};
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink};
use crate::types::{AlertThresholds, AuditLogEntry};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

pub struct SecurityAlertForwarder {
    collector: Arc<dyn Collector>,
    diagnostics: Arc<dyn DiagnosticSink>,
    timeout: Duration,
}

impl SecurityAlertForwarder {
    pub fn new(
        collector: Arc<dyn Collector>,
        diagnostics: Arc<dyn DiagnosticSink>,
        timeout: Duration,
    ) -> Self {
        Self {
            collector,
            diagnostics,
            timeout,
        }
    }

    /// Forward in the background; the returned handle never yields an error
    pub fn forward(
        self: &Arc<Self>,
        entry: AuditLogEntry,
        thresholds: AlertThresholds,
    ) -> JoinHandle<()> {
        let forwarder = Arc::clone(self);
        tokio::spawn(async move {
            forwarder.check(&entry, &thresholds).await;
        })
    }

    /// Forward and wait; returns whether the evaluator accepted the entry
    pub async fn check(&self, entry: &AuditLogEntry, thresholds: &AlertThresholds) -> bool {
        let call = self.collector.security_check(entry, thresholds);
        match with_deadline(self.timeout, "security check", call).await {
            Ok(()) => {
                tracing::debug!(
                    entry_id = %entry.id,
                    severity = %entry.severity,
                    "Entry forwarded for security evaluation"
                );
                true
            }
            Err(e) => {
                self.diagnostics.report(Diagnostic::for_entry(
                    DiagnosticKind::AlertForwardFailed,
                    &entry.id,
                    e.to_string(),
                ));
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{CollectorOp, Failure, MemoryCollector};
    use crate::diagnostics::MemorySink;
    use crate::types::{Actor, AuditAction, AuditResource, AuditSeverity};

    fn critical() -> AuditLogEntry {
        AuditLogEntry {
            id: "audit-crit".to_string(),
            timestamp: chrono::Utc::now(),
            action: AuditAction::RoleChange,
            resource: AuditResource::Role,
            resource_id: Some("admin".to_string()),
            actor: Actor::anonymous(),
            severity: AuditSeverity::Critical,
            description: "Granted admin".to_string(),
            details: Default::default(),
            changes: Vec::new(),
            metadata: Default::default(),
            tags: Default::default(),
            success: true,
            error_message: None,
        }
    }

    fn forwarder() -> (Arc<SecurityAlertForwarder>, Arc<MemoryCollector>, MemorySink) {
        let collector = Arc::new(MemoryCollector::new());
        let sink = MemorySink::new();
        let forwarder = Arc::new(SecurityAlertForwarder::new(
            collector.clone(),
            Arc::new(sink.clone()),
            Duration::from_secs(5),
        ));
        (forwarder, collector, sink)
    }

    #[tokio::test]
    async fn test_forward_sends_entry_with_thresholds() {
        let (forwarder, collector, sink) = forwarder();
        let thresholds = AlertThresholds {
            failed_logins: 2,
            ..Default::default()
        };

        forwarder.forward(critical(), thresholds).await.unwrap();

        let checks = collector.security_checks();
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].0.id, "audit-crit");
        assert_eq!(checks[0].1, thresholds);
        assert!(sink.reports().is_empty());
    }

    #[tokio::test]
    async fn test_forward_failure_is_reported_not_raised() {
        let (forwarder, collector, sink) = forwarder();
        collector.fail(CollectorOp::SecurityCheck, Some(Failure::Network));

        assert!(!forwarder.check(&critical(), &AlertThresholds::default()).await);
        assert_eq!(sink.count(DiagnosticKind::AlertForwardFailed), 1);
        assert_eq!(sink.reports()[0].entry_id.as_deref(), Some("audit-crit"));
    }
}
