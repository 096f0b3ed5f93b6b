//! Convenience loggers for common domain events
//!
//! Each helper fixes the action, resource, severity and tags for one kind
//! of event so call sites stay consistent. All of them go through
//! [`AuditService::log`] and share its never-fail contract.

use crate::filter::FilterReason;
use crate::service::{AuditOutcome, AuditService};
use crate::types::{AuditAction, AuditOptions, AuditResource, AuditSeverity, FieldChange};
use serde_json::Value;

/// Kind of content-side operation for [`AuditService::log_content`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentOperation {
    Create,
    Update,
    Delete,
    Publish,
    Unpublish,
}

impl ContentOperation {
    fn action(self) -> AuditAction {
        match self {
            ContentOperation::Create => AuditAction::Create,
            ContentOperation::Update => AuditAction::Update,
            ContentOperation::Delete => AuditAction::Delete,
            ContentOperation::Publish => AuditAction::Publish,
            ContentOperation::Unpublish => AuditAction::Unpublish,
        }
    }

    fn verb(self) -> &'static str {
        match self {
            ContentOperation::Create => "Created",
            ContentOperation::Update => "Updated",
            ContentOperation::Delete => "Deleted",
            ContentOperation::Publish => "Published",
            ContentOperation::Unpublish => "Unpublished",
        }
    }

    fn severity(self) -> AuditSeverity {
        match self {
            ContentOperation::Delete => AuditSeverity::Medium,
            _ => AuditSeverity::Low,
        }
    }
}

/// Kind of user-account operation for [`AuditService::log_user_management`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserOperation {
    Create,
    Update,
    Delete,
}

impl AuditService {
    /// Login attempt; failures are medium severity
    pub async fn log_login(&self, success: bool, error_message: Option<&str>) -> AuditOutcome {
        let options = AuditOptions::new().tags(["authentication", "login"]);
        let (description, options) = if success {
            ("User logged in", options.severity(AuditSeverity::Low))
        } else {
            (
                "Failed login attempt",
                options
                    .severity(AuditSeverity::Medium)
                    .tag("security")
                    .failed(error_message.unwrap_or("Login failed")),
            )
        };
        self.log(AuditAction::Login, AuditResource::User, description, options)
            .await
    }

    pub async fn log_logout(&self) -> AuditOutcome {
        self.log(
            AuditAction::Logout,
            AuditResource::User,
            "User logged out",
            AuditOptions::new().tags(["authentication", "logout"]),
        )
        .await
    }

    pub async fn log_password_change(&self, user_id: &str, success: bool) -> AuditOutcome {
        let options = AuditOptions::new()
            .resource_id(user_id)
            .severity(AuditSeverity::Medium)
            .tags(["security", "password"]);
        let (description, options) = if success {
            ("Password changed", options)
        } else {
            (
                "Failed password change",
                options.failed("Password change failed"),
            )
        };
        self.log(
            AuditAction::PasswordChange,
            AuditResource::User,
            description,
            options,
        )
        .await
    }

    /// Role assignment change; always high severity
    pub async fn log_role_change(
        &self,
        user_id: &str,
        old_role: &str,
        new_role: &str,
    ) -> AuditOutcome {
        self.log(
            AuditAction::RoleChange,
            AuditResource::User,
            format!("Changed role from {} to {}", old_role, new_role),
            AuditOptions::new()
                .resource_id(user_id)
                .severity(AuditSeverity::High)
                .detail("oldRole", old_role)
                .detail("newRole", new_role)
                .change(FieldChange::new("role", old_role, new_role))
                .tags(["security", "role", "privilege"]),
        )
        .await
    }

    pub async fn log_permission_change(
        &self,
        role_id: &str,
        granted: &[&str],
        revoked: &[&str],
    ) -> AuditOutcome {
        self.log(
            AuditAction::PermissionChange,
            AuditResource::Role,
            format!(
                "Updated permissions ({} granted, {} revoked)",
                granted.len(),
                revoked.len()
            ),
            AuditOptions::new()
                .resource_id(role_id)
                .severity(AuditSeverity::High)
                .detail("granted", granted)
                .detail("revoked", revoked)
                .tags(["security", "permission", "privilege"]),
        )
        .await
    }

    /// Data export; filtered out while export tracking is disabled
    pub async fn log_data_export(
        &self,
        resource: AuditResource,
        format: &str,
        record_count: u64,
    ) -> AuditOutcome {
        if !self.config().enable_data_export_tracking {
            return AuditOutcome::Filtered(FilterReason::ExportTrackingDisabled);
        }
        self.log(
            AuditAction::Export,
            resource,
            format!("Exported {} {} records as {}", record_count, resource, format),
            AuditOptions::new()
                .severity(AuditSeverity::Medium)
                .detail("format", format)
                .detail("recordCount", record_count)
                .tags(["data", "export"]),
        )
        .await
    }

    pub async fn log_data_import(
        &self,
        resource: AuditResource,
        record_count: u64,
        success: bool,
    ) -> AuditOutcome {
        let options = AuditOptions::new()
            .severity(AuditSeverity::Medium)
            .detail("recordCount", record_count)
            .tags(["data", "import"]);
        let (description, options) = if success {
            (format!("Imported {} {} records", record_count, resource), options)
        } else {
            (
                format!("Failed to import {} {} records", record_count, resource),
                options.failed("Import failed"),
            )
        };
        self.log(AuditAction::Import, resource, description, options)
            .await
    }

    pub async fn log_backup(&self, backup_id: &str, success: bool) -> AuditOutcome {
        let options = AuditOptions::new()
            .resource_id(backup_id)
            .severity(AuditSeverity::Medium)
            .tags(["system", "backup"]);
        let (description, options) = if success {
            ("Created backup", options)
        } else {
            ("Failed backup", options.failed("Backup failed"))
        };
        self.log(AuditAction::Backup, AuditResource::Backup, description, options)
            .await
    }

    /// Restore from backup; always high severity
    pub async fn log_restore(&self, backup_id: &str, success: bool) -> AuditOutcome {
        let options = AuditOptions::new()
            .resource_id(backup_id)
            .severity(AuditSeverity::High)
            .tags(["system", "backup", "restore"]);
        let (description, options) = if success {
            ("Restored from backup", options)
        } else {
            ("Failed restore from backup", options.failed("Restore failed"))
        };
        self.log(AuditAction::Restore, AuditResource::Backup, description, options)
            .await
    }

    pub async fn log_settings_change(
        &self,
        setting: &str,
        old_value: Value,
        new_value: Value,
    ) -> AuditOutcome {
        self.log(
            AuditAction::SettingsChange,
            AuditResource::Settings,
            format!("Changed setting {}", setting),
            AuditOptions::new()
                .resource_id(setting)
                .severity(AuditSeverity::Medium)
                .change(FieldChange::new(setting, old_value, new_value))
                .tags(["settings", "configuration"]),
        )
        .await
    }

    pub async fn log_integration_change(
        &self,
        integration: &str,
        enabled: bool,
    ) -> AuditOutcome {
        let state = if enabled { "Enabled" } else { "Disabled" };
        self.log(
            AuditAction::IntegrationChange,
            AuditResource::Integration,
            format!("{} integration {}", state, integration),
            AuditOptions::new()
                .resource_id(integration)
                .severity(AuditSeverity::Medium)
                .detail("enabled", enabled)
                .tags(["integration", "configuration"]),
        )
        .await
    }

    pub async fn log_content(
        &self,
        operation: ContentOperation,
        content_id: &str,
        title: &str,
    ) -> AuditOutcome {
        self.log(
            operation.action(),
            AuditResource::Content,
            format!("{} content \"{}\"", operation.verb(), title),
            AuditOptions::new()
                .resource_id(content_id)
                .severity(operation.severity())
                .detail("title", title)
                .tags(["content", operation.action().as_str()]),
        )
        .await
    }

    pub async fn log_media_upload(
        &self,
        media_id: &str,
        file_name: &str,
        size_bytes: u64,
    ) -> AuditOutcome {
        self.log(
            AuditAction::Upload,
            AuditResource::Media,
            format!("Uploaded {}", file_name),
            AuditOptions::new()
                .resource_id(media_id)
                .detail("fileName", file_name)
                .detail("sizeBytes", size_bytes)
                .tags(["media", "upload"]),
        )
        .await
    }

    pub async fn log_media_download(&self, media_id: &str, file_name: &str) -> AuditOutcome {
        self.log(
            AuditAction::Download,
            AuditResource::Media,
            format!("Downloaded {}", file_name),
            AuditOptions::new()
                .resource_id(media_id)
                .detail("fileName", file_name)
                .tags(["media", "download"]),
        )
        .await
    }

    /// Account lifecycle; deletions are high severity
    pub async fn log_user_management(
        &self,
        operation: UserOperation,
        user_id: &str,
        changes: Vec<FieldChange>,
    ) -> AuditOutcome {
        let (action, verb, severity) = match operation {
            UserOperation::Create => (AuditAction::Create, "Created", AuditSeverity::Medium),
            UserOperation::Update => (AuditAction::Update, "Updated", AuditSeverity::Medium),
            UserOperation::Delete => (AuditAction::Delete, "Deleted", AuditSeverity::High),
        };
        self.log(
            action,
            AuditResource::User,
            format!("{} user {}", verb, user_id),
            AuditOptions::new()
                .resource_id(user_id)
                .severity(severity)
                .changes(changes)
                .tags(["user-management", action.as_str()]),
        )
        .await
    }
}
