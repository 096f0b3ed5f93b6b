//! Query and reporting types for the collector's read API
//!
//! These mirror what the server returns for the admin views; the client
//! only forwards filters and deserializes the answers.

use crate::types::{AuditAction, AuditLogEntry, AuditResource, AuditSeverity};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Filters for `GET /audit/logs`
///
/// Serialized as a query string; unset filters are omitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<AuditAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<AuditResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<AuditSeverity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    /// Free-text search over descriptions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    /// Comma-separated tag list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<String>,
}

impl AuditLogQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: u32, limit: u32) -> Self {
        self.page = Some(page);
        self.limit = Some(limit);
        self
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn resource(mut self, resource: AuditResource) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start_date = Some(start);
        self.end_date = Some(end);
        self
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = tags
            .into_iter()
            .map(|t| t.as_ref().to_string())
            .collect::<Vec<_>>()
            .join(",");
        self.tags = (!joined.is_empty()).then_some(joined);
        self
    }

    /// Whether an entry satisfies every filter except paging
    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        self.action.map_or(true, |a| entry.action == a)
            && self.resource.map_or(true, |r| entry.resource == r)
            && self.severity.map_or(true, |s| entry.severity == s)
            && self
                .user_id
                .as_deref()
                .map_or(true, |u| entry.actor.user_id == u)
            && self.success.map_or(true, |s| entry.success == s)
            && self.start_date.map_or(true, |d| entry.timestamp >= d)
            && self.end_date.map_or(true, |d| entry.timestamp <= d)
            && self.search.as_deref().map_or(true, |q| {
                entry
                    .description
                    .to_lowercase()
                    .contains(&q.to_lowercase())
            })
            && self.tags.as_deref().map_or(true, |tags| {
                tags.split(',')
                    .filter(|t| !t.is_empty())
                    .all(|t| entry.has_tag(t))
            })
    }
}

/// One page of `GET /audit/logs`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogPage {
    pub logs: Vec<AuditLogEntry>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl AuditLogPage {
    pub fn total_pages(&self) -> u64 {
        if self.limit == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.limit))
    }

    pub fn has_more(&self) -> bool {
        u64::from(self.page) < self.total_pages()
    }
}

/// Date range for `GET /audit/stats`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserCount {
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    pub count: u64,
}

/// Aggregate counters from `GET /audit/stats`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuditStats {
    pub total_logs: u64,
    pub today_logs: u64,
    pub week_logs: u64,
    pub month_logs: u64,
    pub action_breakdown: HashMap<String, u64>,
    pub resource_breakdown: HashMap<String, u64>,
    pub severity_breakdown: HashMap<String, u64>,
    pub top_users: Vec<UserCount>,
    /// Fraction of entries with `success = false`, in [0, 1]
    pub failure_rate: f64,
}

/// A server-raised alert from `GET /audit/security-alerts`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityAlert {
    pub id: String,
    #[serde(rename = "type")]
    pub alert_type: String,
    pub severity: AuditSeverity,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub triggered_at: DateTime<Utc>,
    #[serde(default)]
    pub acknowledged: bool,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub related_log_ids: Vec<String>,
}

/// Per-user summary from `GET /audit/users/{id}/activity`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserActivity {
    pub user_id: String,
    pub total_actions: u64,
    pub failed_actions: u64,
    pub last_activity: Option<DateTime<Utc>>,
    pub action_breakdown: HashMap<String, u64>,
    pub recent_logs: Vec<AuditLogEntry>,
}
