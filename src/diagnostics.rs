//! Diagnostics for failures of the audit subsystem itself
//!
//! Capture-path failures never reach business code. They are reported
//! here instead, through an injectable `DiagnosticSink`, so they stay
//! observable in production.

use std::fmt;
use std::sync::{Arc, RwLock};

/// Where in the pipeline a failure happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    /// Single-entry delivery failed; entry routed to the fallback queue
    DeliveryFailed,
    /// Single-entry delivery was rejected permanently; entry dropped
    DeliveryRejected,
    /// Writing the fallback queue failed; entry lost
    QueueWriteFailed,
    /// Reading the fallback queue failed or found a corrupt blob
    QueueReadFailed,
    /// Batch reconciliation failed; queue left intact
    SyncFailed,
    /// Security alert forwarding failed
    AlertForwardFailed,
    /// Performance report failed
    PerformanceReportFailed,
    /// Configuration refresh from the collector failed
    ConfigRefreshFailed,
    /// Background work requested with no Tokio runtime to run it on
    RuntimeUnavailable,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::DeliveryFailed => "delivery_failed",
            DiagnosticKind::DeliveryRejected => "delivery_rejected",
            DiagnosticKind::QueueWriteFailed => "queue_write_failed",
            DiagnosticKind::QueueReadFailed => "queue_read_failed",
            DiagnosticKind::SyncFailed => "sync_failed",
            DiagnosticKind::AlertForwardFailed => "alert_forward_failed",
            DiagnosticKind::PerformanceReportFailed => "performance_report_failed",
            DiagnosticKind::ConfigRefreshFailed => "config_refresh_failed",
            DiagnosticKind::RuntimeUnavailable => "runtime_unavailable",
        }
    }

    /// Whether this kind means an audit record was irrecoverably lost
    pub fn is_data_loss(&self) -> bool {
        matches!(
            self,
            DiagnosticKind::QueueWriteFailed
                | DiagnosticKind::DeliveryRejected
                | DiagnosticKind::RuntimeUnavailable
        )
    }
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single structured failure report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Entry the failure concerns, when there is one
    pub entry_id: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            entry_id: None,
            message: message.into(),
        }
    }

    pub fn for_entry(kind: DiagnosticKind, entry_id: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            entry_id: Some(entry_id.to_string()),
            message: message.into(),
        }
    }
}

/// Receiver for audit-subsystem failures
///
/// Implementations must not block and must not fail.
pub trait DiagnosticSink: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);
}

/// Default sink: emits each diagnostic as a `tracing` event
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn report(&self, diagnostic: Diagnostic) {
        let entry_id = diagnostic.entry_id.as_deref().unwrap_or("-");
        if diagnostic.kind.is_data_loss() {
            tracing::error!(
                kind = %diagnostic.kind,
                entry_id = %entry_id,
                "Audit entry lost: {}",
                diagnostic.message
            );
        } else {
            tracing::warn!(
                kind = %diagnostic.kind,
                entry_id = %entry_id,
                "Audit subsystem failure: {}",
                diagnostic.message
            );
        }
    }
}

/// Collecting sink for tests and in-process inspection
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    reports: Arc<RwLock<Vec<Diagnostic>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All reports so far, oldest first
    pub fn reports(&self) -> Vec<Diagnostic> {
        self.reports
            .read()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, kind: DiagnosticKind) -> usize {
        self.reports
            .read()
            .map(|r| r.iter().filter(|d| d.kind == kind).count())
            .unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut reports) = self.reports.write() {
            reports.clear();
        }
    }
}

impl DiagnosticSink for MemorySink {
    fn report(&self, diagnostic: Diagnostic) {
        tracing::debug!(kind = %diagnostic.kind, "Diagnostic recorded");
        if let Ok(mut reports) = self.reports.write() {
            reports.push(diagnostic);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_collects_in_order() {
        let sink = MemorySink::new();
        sink.report(Diagnostic::new(DiagnosticKind::SyncFailed, "first"));
        sink.report(Diagnostic::for_entry(
            DiagnosticKind::QueueWriteFailed,
            "audit-1",
            "second",
        ));

        let reports = sink.reports();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].message, "first");
        assert_eq!(reports[1].entry_id.as_deref(), Some("audit-1"));
        assert_eq!(sink.count(DiagnosticKind::SyncFailed), 1);
    }

    #[test]
    fn test_memory_sink_clones_share_reports() {
        let sink = MemorySink::new();
        let shared = sink.clone();
        shared.report(Diagnostic::new(DiagnosticKind::DeliveryFailed, "x"));
        assert_eq!(sink.reports().len(), 1);

        sink.clear();
        assert!(shared.reports().is_empty());
    }

    #[test]
    fn test_data_loss_kinds() {
        assert!(DiagnosticKind::QueueWriteFailed.is_data_loss());
        assert!(DiagnosticKind::DeliveryRejected.is_data_loss());
        assert!(DiagnosticKind::RuntimeUnavailable.is_data_loss());
        assert!(!DiagnosticKind::DeliveryFailed.is_data_loss());
    }

    #[test]
    fn test_tracing_sink_does_not_panic() {
        TracingSink.report(Diagnostic::new(DiagnosticKind::AlertForwardFailed, "boom"));
        TracingSink.report(Diagnostic::new(DiagnosticKind::QueueWriteFailed, "lost"));
    }
}
