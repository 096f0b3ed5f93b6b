//! Performance recorder
//!
//! Best-effort timing reports, independent of the audit entry for the
//! same operation. Disabled by `enablePerformanceTracking = false`.

use crate::builder::EventBuilder;
use crate::config::ConfigStore;
use crate::delivery::DeliveryPipeline;
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink};
use crate::types::PerformanceRecord;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub struct PerformanceRecorder {
    delivery: Arc<DeliveryPipeline>,
    config: Arc<ConfigStore>,
    builder: Arc<EventBuilder>,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl PerformanceRecorder {
    pub fn new(
        delivery: Arc<DeliveryPipeline>,
        config: Arc<ConfigStore>,
        builder: Arc<EventBuilder>,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            delivery,
            config,
            builder,
            diagnostics,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.config.read(|c| c.enable_performance_tracking)
    }

    /// Build a record stamped with the current time, user and session
    pub fn sample(
        &self,
        operation: impl Into<String>,
        duration: Duration,
        success: bool,
        error_message: Option<String>,
    ) -> PerformanceRecord {
        let actor = self.builder.resolve_actor();
        PerformanceRecord {
            operation: operation.into(),
            duration_ms: duration.as_millis() as u64,
            success,
            timestamp: self.builder.clock().now(),
            user_id: (!actor.is_anonymous()).then_some(actor.user_id),
            session_id: self.builder.session_id(),
            error_message: if success { None } else { error_message },
        }
    }

    /// Submit a record; returns whether it was delivered
    ///
    /// Returns false without a network call while tracking is disabled.
    pub async fn record(&self, record: &PerformanceRecord) -> bool {
        if !self.is_enabled() {
            return false;
        }
        match self.delivery.send_performance(record).await {
            Ok(()) => {
                tracing::trace!(
                    operation = %record.operation,
                    duration_ms = record.duration_ms,
                    "Performance record delivered"
                );
                true
            }
            Err(e) => {
                self.diagnostics.report(Diagnostic::new(
                    DiagnosticKind::PerformanceReportFailed,
                    format!("{}: {}", record.operation, e),
                ));
                false
            }
        }
    }

    /// Time `operation`, report it, and return its result untouched
    pub async fn time<T, E, F>(&self, operation: &str, fut: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        let started = Instant::now();
        let result = fut.await;
        let record = self.sample(
            operation,
            started.elapsed(),
            result.is_ok(),
            result.as_ref().err().map(|e| e.to_string()),
        );
        self.record(&record).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{CollectorOp, Failure, MemoryCollector};
    use crate::context::{ContextAccumulator, ManualClock, StaticSession};
    use crate::delivery::DeliveryTimeouts;
    use crate::diagnostics::MemorySink;
    use crate::types::{Actor, AuditConfiguration};

    fn recorder(
        config: AuditConfiguration,
    ) -> (PerformanceRecorder, Arc<MemoryCollector>, MemorySink) {
        let collector = Arc::new(MemoryCollector::new());
        let sink = MemorySink::new();
        let store = Arc::new(ConfigStore::with_initial(
            config,
            collector.clone(),
            Arc::new(sink.clone()),
            Duration::from_secs(5),
        ));
        let session = StaticSession::user(
            Actor {
                user_id: "u-9".to_string(),
                user_name: "Grace".to_string(),
                user_email: None,
                user_role: "editor".to_string(),
            },
            "sess-9",
        );
        let builder = Arc::new(EventBuilder::new(
            Arc::new(ManualClock::new(chrono::Utc::now())),
            Arc::new(session),
            Arc::new(ContextAccumulator::new()),
        ));
        let recorder = PerformanceRecorder::new(
            Arc::new(DeliveryPipeline::new(collector.clone(), DeliveryTimeouts::default())),
            store,
            builder,
            Arc::new(sink.clone()),
        );
        (recorder, collector, sink)
    }

    #[tokio::test]
    async fn test_time_reports_success_and_passes_result_through() {
        let (recorder, collector, _) = recorder(AuditConfiguration::default());

        let result: Result<u32, String> = recorder.time("load", async { Ok(7) }).await;
        assert_eq!(result, Ok(7));

        let records = collector.performance_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].operation, "load");
        assert!(records[0].success);
        assert_eq!(records[0].user_id.as_deref(), Some("u-9"));
        assert_eq!(records[0].session_id.as_deref(), Some("sess-9"));
    }

    #[tokio::test]
    async fn test_time_records_failure_message() {
        let (recorder, collector, _) = recorder(AuditConfiguration::default());

        let result: Result<(), String> =
            recorder.time("save", async { Err("disk full".to_string()) }).await;
        assert_eq!(result, Err("disk full".to_string()));

        let records = collector.performance_records();
        assert!(!records[0].success);
        assert_eq!(records[0].error_message.as_deref(), Some("disk full"));
    }

    #[tokio::test]
    async fn test_disabled_tracking_sends_nothing() {
        let (recorder, collector, _) = recorder(AuditConfiguration {
            enable_performance_tracking: false,
            ..Default::default()
        });

        let record = recorder.sample("noop", Duration::from_millis(3), true, None);
        assert!(!recorder.record(&record).await);
        assert_eq!(collector.calls(CollectorOp::Performance), 0);
    }

    #[tokio::test]
    async fn test_report_failure_is_swallowed() {
        let (recorder, collector, sink) = recorder(AuditConfiguration::default());
        collector.fail(CollectorOp::Performance, Some(Failure::Status(503)));

        let result: Result<&str, String> = recorder.time("publish", async { Ok("done") }).await;
        assert_eq!(result, Ok("done"));
        assert_eq!(sink.count(DiagnosticKind::PerformanceReportFailed), 1);
    }
}
