//! Delivery pipeline: deadline-bounded submission to the collector
//!
//! The pipeline only attempts delivery and reports the result. Routing a
//! failed entry to the fallback queue is the caller's decision.

use crate::collector::{with_deadline, Collector};
use crate::config::ClientConfig;
use crate::error::Result;
use crate::types::{AuditLogEntry, PerformanceRecord};
use std::sync::Arc;
use std::time::Duration;

/// Deadlines applied to each kind of remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryTimeouts {
    pub entry: Duration,
    pub batch: Duration,
    pub performance: Duration,
}

impl Default for DeliveryTimeouts {
    fn default() -> Self {
        Self {
            entry: Duration::from_secs(5),
            batch: Duration::from_secs(10),
            performance: Duration::from_secs(2),
        }
    }
}

impl From<&ClientConfig> for DeliveryTimeouts {
    fn from(config: &ClientConfig) -> Self {
        Self {
            entry: config.entry_timeout_duration(),
            batch: config.batch_timeout_duration(),
            performance: config.performance_timeout_duration(),
        }
    }
}

/// Submits entries, batches and performance records
pub struct DeliveryPipeline {
    collector: Arc<dyn Collector>,
    timeouts: DeliveryTimeouts,
}

impl DeliveryPipeline {
    pub fn new(collector: Arc<dyn Collector>, timeouts: DeliveryTimeouts) -> Self {
        Self {
            collector,
            timeouts,
        }
    }

    pub fn collector(&self) -> &Arc<dyn Collector> {
        &self.collector
    }

    pub fn timeouts(&self) -> DeliveryTimeouts {
        self.timeouts
    }

    /// Submit one entry; a timeout is reported as `AuditError::Timeout`
    pub async fn send(&self, entry: &AuditLogEntry) -> Result<()> {
        let result =
            with_deadline(self.timeouts.entry, "submit entry", self.collector.submit(entry)).await;
        match &result {
            Ok(()) => tracing::debug!(
                entry_id = %entry.id,
                action = %entry.action,
                collector = self.collector.name(),
                "Audit entry delivered"
            ),
            Err(e) => tracing::warn!(
                entry_id = %entry.id,
                action = %entry.action,
                error = %e,
                "Audit entry delivery failed"
            ),
        }
        result
    }

    /// Submit queued entries in one request, preserving their order
    pub async fn send_batch(&self, entries: &[AuditLogEntry]) -> Result<()> {
        let result = with_deadline(
            self.timeouts.batch,
            "submit batch",
            self.collector.submit_batch(entries),
        )
        .await;
        match &result {
            Ok(()) => tracing::info!(count = entries.len(), "Pending audit batch delivered"),
            Err(e) => tracing::warn!(
                count = entries.len(),
                error = %e,
                "Pending audit batch delivery failed"
            ),
        }
        result
    }

    pub async fn send_performance(&self, record: &PerformanceRecord) -> Result<()> {
        with_deadline(
            self.timeouts.performance,
            "submit performance",
            self.collector.submit_performance(record),
        )
        .await
    }
}
