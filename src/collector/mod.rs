//! Collector trait: the remote side of the audit pipeline
//!
//! Every remote backend (the HTTP collector, the in-memory fake) implements
//! `Collector` so delivery, reconciliation, forwarding and configuration
//! can be exercised without a network.

use crate::error::{AuditError, Result};
use crate::query::{AuditLogPage, AuditLogQuery, AuditStats, SecurityAlert, StatsQuery, UserActivity};
use crate::types::{
    AlertThresholds, AuditConfiguration, AuditConfigurationUpdate, AuditLogEntry,
    PerformanceRecord,
};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

pub mod http;
pub mod memory;

/// Core trait for audit collectors
///
/// Implementations only move data; timeouts, queuing and error
/// swallowing live in the pipeline above them.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Submit one entry (`POST /audit/logs`)
    async fn submit(&self, entry: &AuditLogEntry) -> Result<()>;

    /// Submit queued entries in order (`POST /audit/logs/batch`)
    async fn submit_batch(&self, entries: &[AuditLogEntry]) -> Result<()>;

    /// Submit a performance record (`POST /audit/performance`)
    async fn submit_performance(&self, record: &PerformanceRecord) -> Result<()>;

    /// Forward a high/critical entry with the current thresholds
    /// (`POST /audit/security-check`)
    async fn security_check(
        &self,
        entry: &AuditLogEntry,
        thresholds: &AlertThresholds,
    ) -> Result<()>;

    /// Fetch the server-side policy (`GET /audit/config`)
    async fn fetch_config(&self) -> Result<AuditConfiguration>;

    /// Apply a partial policy update (`PUT /audit/config`)
    async fn update_config(&self, update: &AuditConfigurationUpdate) -> Result<()>;

    /// Paginated, filtered log query (`GET /audit/logs`)
    async fn query_logs(&self, query: &AuditLogQuery) -> Result<AuditLogPage>;

    /// Aggregate counters (`GET /audit/stats`)
    async fn stats(&self, query: &StatsQuery) -> Result<AuditStats>;

    /// List alerts, optionally by resolved state (`GET /audit/security-alerts`)
    async fn security_alerts(&self, resolved: Option<bool>) -> Result<Vec<SecurityAlert>>;

    /// `POST /audit/security-alerts/{id}/acknowledge`
    async fn acknowledge_alert(&self, alert_id: &str) -> Result<()>;

    /// `POST /audit/security-alerts/{id}/resolve`
    async fn resolve_alert(&self, alert_id: &str, resolution: &str) -> Result<()>;

    /// Per-user activity summary (`GET /audit/users/{id}/activity`)
    async fn user_activity(&self, user_id: &str, days: Option<u32>) -> Result<UserActivity>;

    /// Collector name (e.g., "http", "memory")
    fn name(&self) -> &str;

    /// Health check, true if the collector answers
    ///
    /// Default implementation fetches the configuration.
    async fn health(&self) -> Result<bool> {
        self.fetch_config().await.map(|_| true)
    }
}

pub use http::HttpCollector;
pub use memory::{CollectorOp, Failure, MemoryCollector};

/// Run a collector call with a deadline; expiry maps to `AuditError::Timeout`
pub async fn with_deadline<T, F>(deadline: Duration, operation: &str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(deadline, call).await {
        Ok(result) => result,
        Err(_) => Err(AuditError::Timeout(format!(
            "{} did not complete within {}ms",
            operation,
            deadline.as_millis()
        ))),
    }
}
