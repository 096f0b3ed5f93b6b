//! In-memory collector for tests and single-process use
//!
//! Records everything it accepts, answers queries from what it recorded,
//! and can be told to fail or hang per operation.

use crate::collector::Collector;
use crate::error::{AuditError, Result};
use crate::query::{
    AuditLogPage, AuditLogQuery, AuditStats, SecurityAlert, StatsQuery, UserActivity, UserCount,
};
use crate::types::{
    AlertThresholds, AuditConfiguration, AuditConfigurationUpdate, AuditLogEntry,
    PerformanceRecord,
};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Collector operations that can be made to fail independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectorOp {
    Submit,
    Batch,
    Performance,
    SecurityCheck,
    Config,
    Query,
}

/// How a failing operation fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// Connection-level error
    Network,
    /// Non-2xx response with this status
    Status(u16),
    /// Never completes; only a deadline ends the call
    Hang,
}

impl Failure {
    fn into_error(self, op: CollectorOp) -> AuditError {
        match self {
            Failure::Network | Failure::Hang => {
                AuditError::Transport(format!("{:?}: connection refused", op))
            }
            Failure::Status(status) => AuditError::Status {
                status,
                message: format!("{:?} rejected", op),
            },
        }
    }
}

#[derive(Default)]
struct MemoryState {
    entries: Vec<AuditLogEntry>,
    batches: Vec<Vec<AuditLogEntry>>,
    performance: Vec<PerformanceRecord>,
    security_checks: Vec<(AuditLogEntry, AlertThresholds)>,
    alerts: Vec<SecurityAlert>,
    config: AuditConfiguration,
    failures: HashMap<CollectorOp, Failure>,
    calls: HashMap<CollectorOp, usize>,
}

/// In-memory collector
#[derive(Default)]
pub struct MemoryCollector {
    state: Mutex<MemoryState>,
}

impl MemoryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Make `op` fail with `failure`, or succeed again with `None`
    pub fn fail(&self, op: CollectorOp, failure: Option<Failure>) {
        let mut state = self.lock();
        match failure {
            Some(f) => state.failures.insert(op, f),
            None => state.failures.remove(&op),
        };
    }

    /// Number of calls made for `op`, successful or not
    pub fn calls(&self, op: CollectorOp) -> usize {
        self.lock().calls.get(&op).copied().unwrap_or(0)
    }

    /// Every accepted entry, single and batched, in arrival order
    pub fn entries(&self) -> Vec<AuditLogEntry> {
        self.lock().entries.clone()
    }

    /// Accepted batches, each in submitted order
    pub fn batches(&self) -> Vec<Vec<AuditLogEntry>> {
        self.lock().batches.clone()
    }

    pub fn performance_records(&self) -> Vec<PerformanceRecord> {
        self.lock().performance.clone()
    }

    /// Accepted security checks with the thresholds sent alongside
    pub fn security_checks(&self) -> Vec<(AuditLogEntry, AlertThresholds)> {
        self.lock().security_checks.clone()
    }

    pub fn config(&self) -> AuditConfiguration {
        self.lock().config.clone()
    }

    pub fn set_config(&self, config: AuditConfiguration) {
        self.lock().config = config;
    }

    /// Make an alert visible to `security_alerts`
    pub fn push_alert(&self, alert: SecurityAlert) {
        self.lock().alerts.push(alert);
    }

    /// Count the call and return the configured failure, if any
    async fn begin(&self, op: CollectorOp) -> Result<()> {
        let failure = {
            let mut state = self.lock();
            *state.calls.entry(op).or_insert(0) += 1;
            state.failures.get(&op).copied()
        };
        match failure {
            None => Ok(()),
            Some(Failure::Hang) => {
                std::future::pending::<()>().await;
                Err(Failure::Hang.into_error(op))
            }
            Some(f) => Err(f.into_error(op)),
        }
    }
}

#[async_trait]
impl Collector for MemoryCollector {
    async fn submit(&self, entry: &AuditLogEntry) -> Result<()> {
        self.begin(CollectorOp::Submit).await?;
        self.lock().entries.push(entry.clone());
        Ok(())
    }

    async fn submit_batch(&self, entries: &[AuditLogEntry]) -> Result<()> {
        self.begin(CollectorOp::Batch).await?;
        let mut state = self.lock();
        state.entries.extend_from_slice(entries);
        state.batches.push(entries.to_vec());
        Ok(())
    }

    async fn submit_performance(&self, record: &PerformanceRecord) -> Result<()> {
        self.begin(CollectorOp::Performance).await?;
        self.lock().performance.push(record.clone());
        Ok(())
    }

    async fn security_check(
        &self,
        entry: &AuditLogEntry,
        thresholds: &AlertThresholds,
    ) -> Result<()> {
        self.begin(CollectorOp::SecurityCheck).await?;
        self.lock()
            .security_checks
            .push((entry.clone(), *thresholds));
        Ok(())
    }

    async fn fetch_config(&self) -> Result<AuditConfiguration> {
        self.begin(CollectorOp::Config).await?;
        Ok(self.lock().config.clone())
    }

    async fn update_config(&self, update: &AuditConfigurationUpdate) -> Result<()> {
        self.begin(CollectorOp::Config).await?;
        update.apply_to(&mut self.lock().config);
        Ok(())
    }

    async fn query_logs(&self, query: &AuditLogQuery) -> Result<AuditLogPage> {
        self.begin(CollectorOp::Query).await?;
        let state = self.lock();

        // Newest first, like the server
        let matching: Vec<&AuditLogEntry> = state
            .entries
            .iter()
            .rev()
            .filter(|e| query.matches(e))
            .collect();

        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(50).max(1);
        let skip = usize::try_from(u64::from(page - 1) * u64::from(limit)).unwrap_or(usize::MAX);

        Ok(AuditLogPage {
            logs: matching
                .iter()
                .skip(skip)
                .take(limit as usize)
                .map(|e| (*e).clone())
                .collect(),
            total: matching.len() as u64,
            page,
            limit,
        })
    }

    async fn stats(&self, query: &StatsQuery) -> Result<AuditStats> {
        self.begin(CollectorOp::Query).await?;
        let state = self.lock();
        let now = Utc::now();
        let today = now - Duration::days(1);
        let week = now - Duration::days(7);
        let month = now - Duration::days(30);

        let entries: Vec<&AuditLogEntry> = state
            .entries
            .iter()
            .filter(|e| query.start_date.map_or(true, |d| e.timestamp >= d))
            .filter(|e| query.end_date.map_or(true, |d| e.timestamp <= d))
            .collect();

        let mut stats = AuditStats::default();
        let mut users: HashMap<&str, (&str, u64)> = HashMap::new();
        let mut failures = 0u64;

        for entry in &entries {
            stats.total_logs += 1;
            if entry.timestamp >= today {
                stats.today_logs += 1;
            }
            if entry.timestamp >= week {
                stats.week_logs += 1;
            }
            if entry.timestamp >= month {
                stats.month_logs += 1;
            }
            *stats
                .action_breakdown
                .entry(entry.action.to_string())
                .or_insert(0) += 1;
            *stats
                .resource_breakdown
                .entry(entry.resource.to_string())
                .or_insert(0) += 1;
            *stats
                .severity_breakdown
                .entry(entry.severity.to_string())
                .or_insert(0) += 1;
            users
                .entry(entry.actor.user_id.as_str())
                .or_insert((entry.actor.user_name.as_str(), 0))
                .1 += 1;
            if !entry.success {
                failures += 1;
            }
        }

        let mut top_users: Vec<UserCount> = users
            .into_iter()
            .map(|(id, (name, count))| UserCount {
                user_id: id.to_string(),
                user_name: name.to_string(),
                count,
            })
            .collect();
        top_users.sort_by(|a, b| b.count.cmp(&a.count).then(a.user_id.cmp(&b.user_id)));
        top_users.truncate(10);
        stats.top_users = top_users;

        if stats.total_logs > 0 {
            stats.failure_rate = failures as f64 / stats.total_logs as f64;
        }
        Ok(stats)
    }

    async fn security_alerts(&self, resolved: Option<bool>) -> Result<Vec<SecurityAlert>> {
        self.begin(CollectorOp::Query).await?;
        Ok(self
            .lock()
            .alerts
            .iter()
            .filter(|a| resolved.map_or(true, |r| a.resolved == r))
            .cloned()
            .collect())
    }

    async fn acknowledge_alert(&self, alert_id: &str) -> Result<()> {
        self.begin(CollectorOp::Query).await?;
        let mut state = self.lock();
        let alert = state
            .alerts
            .iter_mut()
            .find(|a| a.id == alert_id)
            .ok_or_else(|| AuditError::NotFound(format!("Security alert not found: {}", alert_id)))?;
        alert.acknowledged = true;
        Ok(())
    }

    async fn resolve_alert(&self, alert_id: &str, resolution: &str) -> Result<()> {
        self.begin(CollectorOp::Query).await?;
        let mut state = self.lock();
        let alert = state
            .alerts
            .iter_mut()
            .find(|a| a.id == alert_id)
            .ok_or_else(|| AuditError::NotFound(format!("Security alert not found: {}", alert_id)))?;
        alert.resolved = true;
        alert.acknowledged = true;
        alert.resolved_at = Some(Utc::now());
        alert.resolution = Some(resolution.to_string());
        Ok(())
    }

    async fn user_activity(&self, user_id: &str, days: Option<u32>) -> Result<UserActivity> {
        self.begin(CollectorOp::Query).await?;
        let state = self.lock();
        let since = days.map(|d| Utc::now() - Duration::days(i64::from(d)));

        let mut activity = UserActivity {
            user_id: user_id.to_string(),
            ..Default::default()
        };
        for entry in state.entries.iter().rev() {
            if entry.actor.user_id != user_id || since.is_some_and(|s| entry.timestamp < s) {
                continue;
            }
            activity.total_actions += 1;
            if !entry.success {
                activity.failed_actions += 1;
            }
            if activity.last_activity.map_or(true, |t| entry.timestamp > t) {
                activity.last_activity = Some(entry.timestamp);
            }
            *activity
                .action_breakdown
                .entry(entry.action.to_string())
                .or_insert(0) += 1;
            if activity.recent_logs.len() < 10 {
                activity.recent_logs.push(entry.clone());
            }
        }
        Ok(activity)
    }

    fn name(&self) -> &str {
        "memory"
    }
}
