//! Core audit types for the a3s-audit system
//!
//! All types use camelCase JSON serialization for wire compatibility
//! with the collector.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

/// What happened
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Read,
    Update,
    Delete,
    Login,
    Logout,
    PasswordChange,
    RoleChange,
    PermissionChange,
    Export,
    Import,
    Backup,
    Restore,
    SettingsChange,
    IntegrationChange,
    Upload,
    Download,
    Publish,
    Unpublish,
}

impl AuditAction {
    /// Wire name of the action
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Read => "read",
            AuditAction::Update => "update",
            AuditAction::Delete => "delete",
            AuditAction::Login => "login",
            AuditAction::Logout => "logout",
            AuditAction::PasswordChange => "password_change",
            AuditAction::RoleChange => "role_change",
            AuditAction::PermissionChange => "permission_change",
            AuditAction::Export => "export",
            AuditAction::Import => "import",
            AuditAction::Backup => "backup",
            AuditAction::Restore => "restore",
            AuditAction::SettingsChange => "settings_change",
            AuditAction::IntegrationChange => "integration_change",
            AuditAction::Upload => "upload",
            AuditAction::Download => "download",
            AuditAction::Publish => "publish",
            AuditAction::Unpublish => "unpublish",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What kind of object was affected
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResource {
    User,
    Role,
    Permission,
    Content,
    Media,
    Settings,
    Integration,
    Backup,
    System,
}

impl AuditResource {
    /// Wire name of the resource
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditResource::User => "user",
            AuditResource::Role => "role",
            AuditResource::Permission => "permission",
            AuditResource::Content => "content",
            AuditResource::Media => "media",
            AuditResource::Settings => "settings",
            AuditResource::Integration => "integration",
            AuditResource::Backup => "backup",
            AuditResource::System => "system",
        }
    }
}

impl fmt::Display for AuditResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered urgency classification: low < medium < high < critical
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AuditSeverity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl AuditSeverity {
    /// Numeric rank on the {low=0, medium=1, high=2, critical=3} scale
    pub fn rank(&self) -> u8 {
        match self {
            AuditSeverity::Low => 0,
            AuditSeverity::Medium => 1,
            AuditSeverity::High => 2,
            AuditSeverity::Critical => 3,
        }
    }

    /// High and critical entries are forwarded for alert evaluation
    pub fn is_alertable(&self) -> bool {
        *self >= AuditSeverity::High
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditSeverity::Low => "low",
            AuditSeverity::Medium => "medium",
            AuditSeverity::High => "high",
            AuditSeverity::Critical => "critical",
        }
    }
}

impl fmt::Display for AuditSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who performed the action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Actor {
    pub user_id: String,
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    pub user_role: String,
}

impl Actor {
    pub const ANONYMOUS_ID: &'static str = "anonymous";

    /// Placeholder used when no session user is known
    pub fn anonymous() -> Self {
        Self {
            user_id: Self::ANONYMOUS_ID.to_string(),
            user_name: "Anonymous".to_string(),
            user_email: None,
            user_role: "anonymous".to_string(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.user_id == Self::ANONYMOUS_ID
    }
}

/// Delivery context captured alongside an entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Duration of the audited operation in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// One field-level change for update-like actions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldChange {
    pub field: String,
    pub old_value: Value,
    pub new_value: Value,
}

impl FieldChange {
    pub fn new(field: impl Into<String>, old_value: impl Serialize, new_value: impl Serialize) -> Self {
        Self {
            field: field.into(),
            old_value: serde_json::to_value(old_value).unwrap_or(Value::Null),
            new_value: serde_json::to_value(new_value).unwrap_or(Value::Null),
        }
    }
}

/// Action-specific key/value data attached to an entry
///
/// Keys are kept in sorted order. A built entry carries at most
/// [`AuditDetails::MAX_KEYS`] keys and [`AuditDetails::MAX_BYTES`] bytes of
/// serialized JSON; see [`AuditDetails::bounded`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditDetails(Map<String, Value>);

impl AuditDetails {
    pub const MAX_KEYS: usize = 64;
    pub const MAX_BYTES: usize = 16 * 1024;
    pub const TRUNCATED_KEY: &'static str = "_truncated";

    pub fn new() -> Self {
        Self::default()
    }

    /// Add a value; values that fail to serialize are stored as `null`
    pub fn with(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.0
            .insert(key.into(), serde_json::to_value(value).unwrap_or(Value::Null));
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_truncated(&self) -> bool {
        self.0.contains_key(Self::TRUNCATED_KEY)
    }

    /// Enforce the size contract
    ///
    /// Maps within both limits are returned unchanged. Oversize maps keep
    /// their leading keys (in key order) that fit and gain a
    /// `"_truncated": true` marker.
    pub fn bounded(self) -> Self {
        let size = serde_json::to_string(&self.0)
            .map(|s| s.len())
            .unwrap_or(usize::MAX);
        if self.0.len() <= Self::MAX_KEYS && size <= Self::MAX_BYTES {
            return self;
        }

        // Room for the marker entry and the surrounding braces
        let budget = Self::MAX_BYTES - 32;
        let mut kept = Map::new();
        let mut used = 2;
        for (key, value) in self.0 {
            if kept.len() + 1 >= Self::MAX_KEYS {
                break;
            }
            // Escaped key and value, plus `:` and `,`
            let cost = match (serde_json::to_string(&key), serde_json::to_string(&value)) {
                (Ok(k), Ok(v)) => k.len() + v.len() + 2,
                _ => usize::MAX,
            };
            if cost > budget.saturating_sub(used) {
                continue;
            }
            used += cost;
            kept.insert(key, value);
        }
        kept.insert(Self::TRUNCATED_KEY.to_string(), Value::Bool(true));
        Self(kept)
    }
}

impl From<Map<String, Value>> for AuditDetails {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

fn default_success() -> bool {
    true
}

/// The immutable record of one audit event
///
/// Built once by the event builder and never modified afterwards.
/// Whether it has been delivered is tracked by the fallback queue, not here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    /// Unique entry identifier (audit-<millis>-<random>)
    pub id: String,

    /// Capture time
    pub timestamp: DateTime<Utc>,

    pub action: AuditAction,

    pub resource: AuditResource,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,

    #[serde(flatten)]
    pub actor: Actor,

    pub severity: AuditSeverity,

    /// Human-readable summary
    pub description: String,

    #[serde(default, skip_serializing_if = "AuditDetails::is_empty")]
    pub details: AuditDetails,

    /// Ordered field changes for update-like actions
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<FieldChange>,

    #[serde(default)]
    pub metadata: AuditMetadata,

    #[serde(default)]
    pub tags: BTreeSet<String>,

    /// Whether the audited business operation succeeded
    #[serde(default = "default_success")]
    pub success: bool,

    /// Present only when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AuditLogEntry {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

/// Optional inputs to an audit call
#[derive(Debug, Clone, Default)]
pub struct AuditOptions {
    pub resource_id: Option<String>,
    pub severity: Option<AuditSeverity>,
    pub details: AuditDetails,
    pub changes: Vec<FieldChange>,
    pub tags: Vec<String>,
    pub success: Option<bool>,
    pub error_message: Option<String>,
    pub duration_ms: Option<u64>,
}

impl AuditOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    pub fn severity(mut self, severity: AuditSeverity) -> Self {
        self.severity = Some(severity);
        self
    }

    pub fn details(mut self, details: AuditDetails) -> Self {
        self.details = details;
        self
    }

    pub fn detail(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        self.details = self.details.with(key, value);
        self
    }

    pub fn changes(mut self, changes: Vec<FieldChange>) -> Self {
        self.changes = changes;
        self
    }

    pub fn change(mut self, change: FieldChange) -> Self {
        self.changes.push(change);
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    /// Mark the operation as failed with the given message
    pub fn failed(mut self, error_message: impl Into<String>) -> Self {
        self.success = Some(false);
        self.error_message = Some(error_message.into());
        self
    }

    pub fn duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Severity used when none was given explicitly
    pub fn effective_severity(&self) -> AuditSeverity {
        self.severity.unwrap_or_default()
    }
}

/// Alert threshold counts, evaluated server-side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertThresholds {
    pub failed_logins: u32,
    pub data_exports: u32,
    pub privilege_changes: u32,
    pub system_changes: u32,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            failed_logins: 5,
            data_exports: 10,
            privilege_changes: 3,
            system_changes: 10,
        }
    }
}

/// Process-wide audit policy, owned by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuditConfiguration {
    /// Global kill switch
    pub enabled: bool,
    pub retention_days: u32,
    pub archive_after_days: u32,
    pub anonymize_after_days: u32,
    /// Minimum severity to record
    pub log_level: AuditSeverity,
    pub excluded_actions: BTreeSet<AuditAction>,
    pub excluded_resources: BTreeSet<AuditResource>,
    pub alert_thresholds: AlertThresholds,
    pub enable_real_time_alerts: bool,
    pub enable_data_export_tracking: bool,
    pub enable_performance_tracking: bool,
    pub enable_detailed_changes: bool,
}

impl Default for AuditConfiguration {
    fn default() -> Self {
        Self {
            enabled: true,
            retention_days: 365,
            archive_after_days: 90,
            anonymize_after_days: 730,
            log_level: AuditSeverity::Low,
            excluded_actions: BTreeSet::new(),
            excluded_resources: BTreeSet::new(),
            alert_thresholds: AlertThresholds::default(),
            enable_real_time_alerts: true,
            enable_data_export_tracking: true,
            enable_performance_tracking: true,
            enable_detailed_changes: true,
        }
    }
}

/// Partial configuration update sent with `PUT /audit/config`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditConfigurationUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_after_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anonymize_after_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<AuditSeverity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excluded_actions: Option<BTreeSet<AuditAction>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excluded_resources: Option<BTreeSet<AuditResource>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alert_thresholds: Option<AlertThresholds>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_real_time_alerts: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_data_export_tracking: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_performance_tracking: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_detailed_changes: Option<bool>,
}

impl AuditConfigurationUpdate {
    /// Merge the present fields into `config`
    pub fn apply_to(&self, config: &mut AuditConfiguration) {
        if let Some(v) = self.enabled {
            config.enabled = v;
        }
        if let Some(v) = self.retention_days {
            config.retention_days = v;
        }
        if let Some(v) = self.archive_after_days {
            config.archive_after_days = v;
        }
        if let Some(v) = self.anonymize_after_days {
            config.anonymize_after_days = v;
        }
        if let Some(v) = self.log_level {
            config.log_level = v;
        }
        if let Some(ref v) = self.excluded_actions {
            config.excluded_actions = v.clone();
        }
        if let Some(ref v) = self.excluded_resources {
            config.excluded_resources = v.clone();
        }
        if let Some(v) = self.alert_thresholds {
            config.alert_thresholds = v;
        }
        if let Some(v) = self.enable_real_time_alerts {
            config.enable_real_time_alerts = v;
        }
        if let Some(v) = self.enable_data_export_tracking {
            config.enable_data_export_tracking = v;
        }
        if let Some(v) = self.enable_performance_tracking {
            config.enable_performance_tracking = v;
        }
        if let Some(v) = self.enable_detailed_changes {
            config.enable_detailed_changes = v;
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Timing report for one domain operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceRecord {
    pub operation: String,
    pub duration_ms: u64,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> AuditLogEntry {
        AuditLogEntry {
            id: "audit-1-abc".to_string(),
            timestamp: DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
            action: AuditAction::RoleChange,
            resource: AuditResource::User,
            resource_id: Some("u-42".to_string()),
            actor: Actor {
                user_id: "u-1".to_string(),
                user_name: "Ada".to_string(),
                user_email: Some("ada@example.com".to_string()),
                user_role: "admin".to_string(),
            },
            severity: AuditSeverity::High,
            description: "Changed role".to_string(),
            details: AuditDetails::new().with("newRole", "editor"),
            changes: vec![FieldChange::new("role", "viewer", "editor")],
            metadata: AuditMetadata {
                session_id: Some("s-1".to_string()),
                ..Default::default()
            },
            tags: ["security".to_string()].into_iter().collect(),
            success: true,
            error_message: None,
        }
    }

    #[test]
    fn test_severity_ordering() {
        assert!(AuditSeverity::Low < AuditSeverity::Medium);
        assert!(AuditSeverity::Medium < AuditSeverity::High);
        assert!(AuditSeverity::High < AuditSeverity::Critical);
        assert_eq!(AuditSeverity::Critical.rank(), 3);
        assert!(!AuditSeverity::Medium.is_alertable());
        assert!(AuditSeverity::High.is_alertable());
    }

    #[test]
    fn test_action_wire_names() {
        let json = serde_json::to_string(&AuditAction::PasswordChange).unwrap();
        assert_eq!(json, "\"password_change\"");
        assert_eq!(AuditAction::IntegrationChange.to_string(), "integration_change");

        let parsed: AuditAction = serde_json::from_str("\"unpublish\"").unwrap();
        assert_eq!(parsed, AuditAction::Unpublish);
    }

    #[test]
    fn test_entry_serialization_flattens_actor() {
        let json = serde_json::to_value(sample_entry()).unwrap();

        assert_eq!(json["userId"], "u-1");
        assert_eq!(json["userRole"], "admin");
        assert_eq!(json["action"], "role_change");
        assert_eq!(json["resourceId"], "u-42");
        assert_eq!(json["severity"], "high");
        assert_eq!(json["changes"][0]["oldValue"], "viewer");
        assert_eq!(json["metadata"]["sessionId"], "s-1");
        assert!(json.get("errorMessage").is_none());

        let parsed: AuditLogEntry = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, sample_entry());
    }

    #[test]
    fn test_entry_defaults_success_when_missing() {
        let json = r#"{
            "id": "audit-1",
            "timestamp": "2024-01-01T00:00:00Z",
            "action": "login",
            "resource": "user",
            "userId": "anonymous",
            "userName": "Anonymous",
            "userRole": "anonymous",
            "severity": "low",
            "description": "Logged in"
        }"#;

        let entry: AuditLogEntry = serde_json::from_str(json).unwrap();
        assert!(entry.success);
        assert!(entry.tags.is_empty());
        assert!(entry.actor.is_anonymous());
    }

    #[test]
    fn test_configuration_defaults() {
        let config = AuditConfiguration::default();
        assert!(config.enabled);
        assert_eq!(config.log_level, AuditSeverity::Low);
        assert!(config.excluded_actions.is_empty());
        assert!(config.enable_real_time_alerts);
        assert_eq!(config.alert_thresholds.failed_logins, 5);
    }

    #[test]
    fn test_configuration_partial_payload_fills_defaults() {
        let config: AuditConfiguration =
            serde_json::from_str(r#"{"logLevel": "high", "excludedActions": ["read"]}"#).unwrap();
        assert_eq!(config.log_level, AuditSeverity::High);
        assert!(config.excluded_actions.contains(&AuditAction::Read));
        assert!(config.enabled);
        assert_eq!(config.retention_days, 365);
    }

    #[test]
    fn test_configuration_update_apply() {
        let mut config = AuditConfiguration::default();
        let update = AuditConfigurationUpdate {
            log_level: Some(AuditSeverity::Medium),
            enable_real_time_alerts: Some(false),
            ..Default::default()
        };

        update.apply_to(&mut config);
        assert_eq!(config.log_level, AuditSeverity::Medium);
        assert!(!config.enable_real_time_alerts);
        assert!(config.enabled);

        let json = serde_json::to_string(&update).unwrap();
        assert_eq!(json, r#"{"logLevel":"medium","enableRealTimeAlerts":false}"#);
    }

    #[test]
    fn test_details_within_limits_unchanged() {
        let details = AuditDetails::new().with("a", 1).with("b", "two");
        let bounded = details.clone().bounded();
        assert_eq!(bounded, details);
        assert!(!bounded.is_truncated());
    }

    #[test]
    fn test_details_too_many_keys_truncated() {
        let mut details = AuditDetails::new();
        for i in 0..100 {
            details = details.with(format!("k{:03}", i), i);
        }

        let bounded = details.bounded();
        assert!(bounded.is_truncated());
        assert!(bounded.len() <= AuditDetails::MAX_KEYS);
        assert_eq!(bounded.get("k000"), Some(&Value::from(0)));
    }

    #[test]
    fn test_details_too_large_truncated() {
        let big = "x".repeat(AuditDetails::MAX_BYTES);
        let details = AuditDetails::new().with("big", big).with("small", 1);

        let bounded = details.bounded();
        assert!(bounded.is_truncated());
        assert!(bounded.get("big").is_none());
        assert_eq!(bounded.get("small"), Some(&Value::from(1)));
        assert!(serde_json::to_string(&bounded).unwrap().len() <= AuditDetails::MAX_BYTES);
    }

    #[test]
    fn test_details_escaped_keys_counted() {
        let mut details = AuditDetails::new();
        for i in 0..40 {
            details = details.with(format!("{:02}{}", i, "\u{1}".repeat(100)), "x");
        }
        assert!(serde_json::to_string(&details).unwrap().len() > AuditDetails::MAX_BYTES);

        let bounded = details.bounded();
        assert!(bounded.is_truncated());
        assert!(bounded.len() > 1);
        assert!(serde_json::to_string(&bounded).unwrap().len() <= AuditDetails::MAX_BYTES);
    }

    #[test]
    fn test_options_failed_sets_success_false() {
        let opts = AuditOptions::new().failed("bad password");
        assert_eq!(opts.success, Some(false));
        assert_eq!(opts.error_message.as_deref(), Some("bad password"));
        assert_eq!(opts.effective_severity(), AuditSeverity::Low);
    }
}
