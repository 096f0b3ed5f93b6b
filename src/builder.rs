//! Event builder, pure construction of audit entries
//!
//! Building never fails and never performs I/O beyond reading the
//! already-available session and ambient context. A missing user resolves
//! to the anonymous actor.

use crate::context::{Clock, ContextAccumulator, SessionProvider};
use crate::types::{Actor, AuditAction, AuditLogEntry, AuditMetadata, AuditOptions, AuditResource};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Generate an entry id from the capture time and a random suffix
pub fn generate_entry_id(timestamp: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("audit-{}-{}", timestamp.timestamp_millis(), &suffix[..9])
}

/// Builds fully populated `AuditLogEntry` values
pub struct EventBuilder {
    clock: Arc<dyn Clock>,
    session: Arc<dyn SessionProvider>,
    context: Arc<ContextAccumulator>,
    default_user_agent: Option<String>,
}

impl EventBuilder {
    pub fn new(
        clock: Arc<dyn Clock>,
        session: Arc<dyn SessionProvider>,
        context: Arc<ContextAccumulator>,
    ) -> Self {
        Self {
            clock,
            session,
            context,
            default_user_agent: None,
        }
    }

    /// User agent recorded when the ambient context has none
    pub fn with_default_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.default_user_agent = Some(user_agent.into());
        self
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Resolve the acting user: context, then session, then anonymous
    pub fn resolve_actor(&self) -> Actor {
        self.context
            .snapshot()
            .resolve_actor(self.session.current_user())
            .unwrap_or_else(Actor::anonymous)
    }

    /// Current session id: context first, then the session provider
    pub fn session_id(&self) -> Option<String> {
        self.context
            .snapshot()
            .session_id
            .or_else(|| self.session.session_id())
    }

    /// Construct an entry
    ///
    /// `include_changes` reflects the `enableDetailedChanges` toggle;
    /// when false the field-level change list is omitted.
    pub fn build(
        &self,
        action: AuditAction,
        resource: AuditResource,
        description: impl Into<String>,
        options: AuditOptions,
        include_changes: bool,
    ) -> AuditLogEntry {
        let timestamp = self.clock.now();
        let context = self.context.snapshot();
        let actor = context
            .resolve_actor(self.session.current_user())
            .unwrap_or_else(Actor::anonymous);

        let metadata = AuditMetadata {
            ip_address: context.ip_address,
            user_agent: context.user_agent.or_else(|| self.default_user_agent.clone()),
            session_id: context.session_id.or_else(|| self.session.session_id()),
            request_id: context.request_id,
            duration_ms: options.duration_ms,
        };

        let severity = options.effective_severity();
        let success = options.success.unwrap_or(true);
        let error_message = if success { None } else { options.error_message };

        let tags: BTreeSet<String> = options
            .tags
            .into_iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect();

        AuditLogEntry {
            id: generate_entry_id(timestamp),
            timestamp,
            action,
            resource,
            resource_id: options.resource_id,
            actor,
            severity,
            description: description.into(),
            details: options.details.bounded(),
            changes: if include_changes {
                options.changes
            } else {
                Vec::new()
            },
            metadata,
            tags,
            success,
            error_message,
        }
    }
}
