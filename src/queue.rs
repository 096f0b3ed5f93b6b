//! Durable fallback queue for entries the collector did not accept
//!
//! The queue is one serialized JSON array under a single storage key,
//! bounded at `capacity` entries with oldest-first eviction so the most
//! recent events win. Every mutation runs its read, trim and write under
//! one writer lock; interleaving two read-modify-write cycles across an
//! await would otherwise lose entries.

use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink};
use crate::error::Result;
use crate::storage::{DurableStore, PENDING_QUEUE_KEY};
use crate::types::AuditLogEntry;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Default maximum number of pending entries
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Bounded, order-preserving persistent queue of undelivered entries
pub struct PendingQueue {
    store: Arc<dyn DurableStore>,
    capacity: usize,
    writer: Mutex<()>,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl PendingQueue {
    /// Create a queue with the default capacity
    pub fn new(store: Arc<dyn DurableStore>, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        Self::with_capacity(store, DEFAULT_QUEUE_CAPACITY, diagnostics)
    }

    /// Create a queue with a custom capacity (minimum 1)
    pub fn with_capacity(
        store: Arc<dyn DurableStore>,
        capacity: usize,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            store,
            capacity: capacity.max(1),
            writer: Mutex::new(()),
            diagnostics,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an entry, evicting the oldest entries beyond capacity
    ///
    /// Never fails: storage errors are reported to the diagnostic sink and
    /// the entry is not durably queued. Returns whether the write succeeded.
    pub async fn enqueue(&self, entry: AuditLogEntry) -> bool {
        let _guard = self.writer.lock().await;

        let mut entries = match self.load() {
            Ok(entries) => entries,
            Err(e) => {
                // Unreadable blob cannot be recovered; start over rather than lose this entry too
                self.diagnostics.report(Diagnostic::new(
                    DiagnosticKind::QueueReadFailed,
                    format!("discarding unreadable pending queue: {}", e),
                ));
                Vec::new()
            }
        };

        let entry_id = entry.id.clone();
        entries.push(entry);

        if entries.len() > self.capacity {
            let evict = entries.len() - self.capacity;
            let evicted: Vec<AuditLogEntry> = entries.drain(..evict).collect();
            for old in &evicted {
                tracing::warn!(
                    entry_id = %old.id,
                    action = %old.action,
                    capacity = self.capacity,
                    "Pending audit entry evicted due to queue overflow"
                );
            }
        }

        match self.save(&entries) {
            Ok(()) => {
                tracing::debug!(entry_id = %entry_id, pending = entries.len(), "Audit entry queued");
                true
            }
            Err(e) => {
                self.diagnostics.report(Diagnostic::for_entry(
                    DiagnosticKind::QueueWriteFailed,
                    &entry_id,
                    e.to_string(),
                ));
                false
            }
        }
    }

    /// Read every pending entry, oldest first, without removing any
    ///
    /// An unreadable queue reads as empty and is reported.
    pub async fn drain(&self) -> Vec<AuditLogEntry> {
        let _guard = self.writer.lock().await;
        match self.load() {
            Ok(entries) => entries,
            Err(e) => {
                self.diagnostics.report(Diagnostic::new(
                    DiagnosticKind::QueueReadFailed,
                    e.to_string(),
                ));
                Vec::new()
            }
        }
    }

    /// Remove all pending entries (atomic replace with empty)
    pub async fn clear(&self) -> Result<()> {
        let _guard = self.writer.lock().await;
        self.save(&[])?;
        tracing::debug!("Pending audit queue cleared");
        Ok(())
    }

    /// Remove the entries with the given ids, keeping everything else in order
    ///
    /// Used after a confirmed batch send so entries enqueued after the
    /// batch was read survive. Returns the number of entries removed.
    pub async fn acknowledge(&self, delivered_ids: &[String]) -> Result<usize> {
        let _guard = self.writer.lock().await;
        let delivered: HashSet<&str> = delivered_ids.iter().map(String::as_str).collect();

        let entries = self.load()?;
        let before = entries.len();
        let remaining: Vec<AuditLogEntry> = entries
            .into_iter()
            .filter(|e| !delivered.contains(e.id.as_str()))
            .collect();
        let removed = before - remaining.len();

        self.save(&remaining)?;
        tracing::debug!(removed, remaining = remaining.len(), "Pending audit entries acknowledged");
        Ok(removed)
    }

    /// Number of pending entries (0 if unreadable)
    pub async fn len(&self) -> usize {
        let _guard = self.writer.lock().await;
        self.load().map(|e| e.len()).unwrap_or(0)
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn load(&self) -> Result<Vec<AuditLogEntry>> {
        match self.store.get(PENDING_QUEUE_KEY)? {
            Some(blob) if !blob.trim().is_empty() => Ok(serde_json::from_str(&blob)?),
            _ => Ok(Vec::new()),
        }
    }

    fn save(&self, entries: &[AuditLogEntry]) -> Result<()> {
        if entries.is_empty() {
            return self.store.remove(PENDING_QUEUE_KEY);
        }
        let blob = serde_json::to_string(entries)?;
        self.store.set(PENDING_QUEUE_KEY, &blob)
    }
}
