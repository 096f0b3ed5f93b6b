//! Severity/exclusion filter, evaluated before an entry is built

use crate::types::{AuditAction, AuditConfiguration, AuditResource, AuditSeverity};

/// Why an audit call was dropped by policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    Disabled,
    ExcludedAction,
    ExcludedResource,
    BelowLogLevel,
    /// Export events while `enableDataExportTracking` is off
    ExportTrackingDisabled,
}

impl FilterReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterReason::Disabled => "disabled",
            FilterReason::ExcludedAction => "excluded_action",
            FilterReason::ExcludedResource => "excluded_resource",
            FilterReason::BelowLogLevel => "below_log_level",
            FilterReason::ExportTrackingDisabled => "export_tracking_disabled",
        }
    }
}

/// First policy rule that rejects the call, or `None` if it should be logged
pub fn rejection(
    config: &AuditConfiguration,
    action: AuditAction,
    resource: AuditResource,
    severity: AuditSeverity,
) -> Option<FilterReason> {
    if !config.enabled {
        Some(FilterReason::Disabled)
    } else if config.excluded_actions.contains(&action) {
        Some(FilterReason::ExcludedAction)
    } else if config.excluded_resources.contains(&resource) {
        Some(FilterReason::ExcludedResource)
    } else if severity.rank() < config.log_level.rank() {
        Some(FilterReason::BelowLogLevel)
    } else {
        None
    }
}

/// Whether an event with these attributes should be processed at all
pub fn should_log(
    config: &AuditConfiguration,
    action: AuditAction,
    resource: AuditResource,
    severity: AuditSeverity,
) -> bool {
    rejection(config, action, resource, severity).is_none()
}
