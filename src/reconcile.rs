//! Reconciler: flushes the fallback queue back to the collector
//!
//! `sync` reads the queue, submits it as one ordered batch and removes
//! exactly the delivered entries on confirmed success. On failure the
//! queue is left as it was. Only one sync runs at a time.

use crate::delivery::DeliveryPipeline;
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink};
use crate::queue::PendingQueue;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

/// Result of one reconciliation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing pending; no network call made
    Empty,
    /// This many entries were delivered and removed
    Flushed(usize),
    /// Batch delivery failed; queue unchanged
    Failed,
}

pub struct Reconciler {
    queue: Arc<PendingQueue>,
    delivery: Arc<DeliveryPipeline>,
    diagnostics: Arc<dyn DiagnosticSink>,
    in_flight: Mutex<()>,
}

impl Reconciler {
    pub fn new(
        queue: Arc<PendingQueue>,
        delivery: Arc<DeliveryPipeline>,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            queue,
            delivery,
            diagnostics,
            in_flight: Mutex::new(()),
        }
    }

    /// Re-attempt delivery of everything pending
    pub async fn sync(&self) -> SyncOutcome {
        let _running = self.in_flight.lock().await;

        let pending = self.queue.drain().await;
        if pending.is_empty() {
            return SyncOutcome::Empty;
        }

        if let Err(e) = self.delivery.send_batch(&pending).await {
            self.diagnostics.report(Diagnostic::new(
                DiagnosticKind::SyncFailed,
                format!("{} pending entries kept: {}", pending.len(), e),
            ));
            return SyncOutcome::Failed;
        }

        let ids: Vec<String> = pending.iter().map(|e| e.id.clone()).collect();
        if let Err(e) = self.queue.acknowledge(&ids).await {
            // Delivered but still queued; the next sync resends them
            self.diagnostics.report(Diagnostic::new(
                DiagnosticKind::SyncFailed,
                format!("batch delivered but queue not updated: {}", e),
            ));
        }
        SyncOutcome::Flushed(pending.len())
    }

    /// Run `sync` every `interval` until the handle is shut down
    pub fn spawn_periodic(self: &Arc<Self>, interval: Duration) -> PeriodicSync {
        let state = Arc::new(PeriodicState {
            shutdown: AtomicBool::new(false),
            notify: Notify::new(),
        });
        let reconciler = Arc::clone(self);
        let loop_state = Arc::clone(&state);

        let handle = tokio::spawn(async move {
            tracing::info!(interval_secs = interval.as_secs(), "Starting audit reconciliation loop");
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        if loop_state.shutdown.load(Ordering::SeqCst) {
                            break;
                        }
                        reconciler.sync().await;
                    }
                    _ = loop_state.notify.notified() => {
                        if loop_state.shutdown.load(Ordering::SeqCst) {
                            // Final attempt before stopping
                            reconciler.sync().await;
                            break;
                        }
                    }
                }
            }
            tracing::info!("Audit reconciliation loop stopped");
        });

        PeriodicSync { state, handle }
    }
}

struct PeriodicState {
    shutdown: AtomicBool,
    notify: Notify,
}

/// Handle to a running periodic reconciliation loop
pub struct PeriodicSync {
    state: Arc<PeriodicState>,
    handle: JoinHandle<()>,
}

impl PeriodicSync {
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Stop the loop after one final sync and wait for it to exit
    pub async fn shutdown(self) {
        self.state.shutdown.store(true, Ordering::SeqCst);
        self.state.notify.notify_one();
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Audit reconciliation loop panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{CollectorOp, Failure, MemoryCollector};
    use crate::delivery::DeliveryTimeouts;
    use crate::diagnostics::MemorySink;
    use crate::storage::MemoryStore;
    use crate::types::{Actor, AuditAction, AuditLogEntry, AuditResource, AuditSeverity};

    fn entry(n: usize) -> AuditLogEntry {
        AuditLogEntry {
            id: format!("audit-{}", n),
            timestamp: chrono::Utc::now(),
            action: AuditAction::Update,
            resource: AuditResource::Settings,
            resource_id: None,
            actor: Actor::anonymous(),
            severity: AuditSeverity::Low,
            description: format!("Entry {}", n),
            details: Default::default(),
            changes: Vec::new(),
            metadata: Default::default(),
            tags: Default::default(),
            success: true,
            error_message: None,
        }
    }

    struct Fixture {
        reconciler: Arc<Reconciler>,
        queue: Arc<PendingQueue>,
        collector: Arc<MemoryCollector>,
        sink: MemorySink,
    }

    fn fixture() -> Fixture {
        let sink = MemorySink::new();
        let collector = Arc::new(MemoryCollector::new());
        let queue = Arc::new(PendingQueue::new(
            Arc::new(MemoryStore::new()),
            Arc::new(sink.clone()),
        ));
        let delivery = Arc::new(DeliveryPipeline::new(
            collector.clone(),
            DeliveryTimeouts::default(),
        ));
        let reconciler = Arc::new(Reconciler::new(
            queue.clone(),
            delivery,
            Arc::new(sink.clone()),
        ));
        Fixture {
            reconciler,
            queue,
            collector,
            sink,
        }
    }

    #[tokio::test]
    async fn test_empty_sync_makes_no_call() {
        let f = fixture();
        assert_eq!(f.reconciler.sync().await, SyncOutcome::Empty);
        assert_eq!(f.reconciler.sync().await, SyncOutcome::Empty);
        assert_eq!(f.collector.calls(CollectorOp::Batch), 0);
    }

    #[tokio::test]
    async fn test_successful_sync_clears_queue() {
        let f = fixture();
        for i in 1..=3 {
            f.queue.enqueue(entry(i)).await;
        }

        assert_eq!(f.reconciler.sync().await, SyncOutcome::Flushed(3));
        assert!(f.queue.is_empty().await);

        let ids: Vec<String> = f.collector.batches()[0].iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, vec!["audit-1", "audit-2", "audit-3"]);
    }

    #[tokio::test]
    async fn test_failed_sync_leaves_queue_unchanged() {
        let f = fixture();
        for i in 1..=3 {
            f.queue.enqueue(entry(i)).await;
        }
        let before = f.queue.drain().await;

        f.collector.fail(CollectorOp::Batch, Some(Failure::Status(400)));
        assert_eq!(f.reconciler.sync().await, SyncOutcome::Failed);
        assert_eq!(f.queue.drain().await, before);
        assert_eq!(f.sink.count(DiagnosticKind::SyncFailed), 1);

        f.collector.fail(CollectorOp::Batch, None);
        assert_eq!(f.reconciler.sync().await, SyncOutcome::Flushed(3));
    }

    #[tokio::test]
    async fn test_entry_enqueued_during_stalled_sync_is_kept() {
        let f = fixture();
        f.queue.enqueue(entry(1)).await;

        // Hold the batch call open while another entry arrives
        f.collector.fail(CollectorOp::Batch, Some(Failure::Hang));
        let reconciler = f.reconciler.clone();
        let sync = tokio::spawn(async move { reconciler.sync().await });
        while f.collector.calls(CollectorOp::Batch) == 0 {
            tokio::task::yield_now().await;
        }
        f.queue.enqueue(entry(2)).await;
        sync.abort();
        let _ = sync.await;

        f.collector.fail(CollectorOp::Batch, None);
        assert_eq!(f.reconciler.sync().await, SyncOutcome::Flushed(2));
        assert!(f.queue.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_sync_and_final_flush() {
        let f = fixture();
        let periodic = f.reconciler.spawn_periodic(Duration::from_secs(30));

        f.queue.enqueue(entry(1)).await;
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(f.queue.is_empty().await);
        assert_eq!(f.collector.batches().len(), 1);

        f.queue.enqueue(entry(2)).await;
        assert!(periodic.is_running());
        periodic.shutdown().await;

        assert!(f.queue.is_empty().await);
        assert_eq!(f.collector.batches().len(), 2);
    }
}
