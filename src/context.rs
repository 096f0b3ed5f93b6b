//! Ambient context for entry construction
//!
//! The `ContextAccumulator` holds request/session/actor identifiers so call
//! sites don't have to thread them through every audit call. `Clock` and
//! `SessionProvider` stand in for the wall clock and the logged-in user so
//! the builder can be driven by fakes.

use crate::error::Result;
use crate::storage::{DurableStore, CURRENT_USER_KEY, SESSION_ID_KEY};
use crate::types::Actor;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut current) = self.now.write() {
            *current = now;
        }
    }

    pub fn advance(&self, by: chrono::Duration) {
        if let Ok(mut current) = self.now.write() {
            *current += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.read().map(|t| *t).unwrap_or_else(|_| Utc::now())
    }
}

/// Source of the authenticated user and session
pub trait SessionProvider: Send + Sync {
    /// The logged-in user, if any
    fn current_user(&self) -> Option<Actor>;

    /// The current session identifier, if any
    fn session_id(&self) -> Option<String>;
}

/// Shape of the user blob the host application stores under `auth_user`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredUser {
    #[serde(alias = "userId")]
    id: String,
    #[serde(default, alias = "username", alias = "displayName")]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

impl From<StoredUser> for Actor {
    fn from(user: StoredUser) -> Self {
        Actor {
            user_name: user.name.unwrap_or_else(|| user.id.clone()),
            user_id: user.id,
            user_email: user.email,
            user_role: user.role.unwrap_or_else(|| "user".to_string()),
        }
    }
}

/// Session provider reading the host's persisted login state
///
/// Read-only: this crate never writes `auth_user` or `session_id`.
/// Missing or malformed values resolve to `None`.
pub struct StoredSessionProvider {
    store: Arc<dyn DurableStore>,
}

impl StoredSessionProvider {
    pub fn new(store: Arc<dyn DurableStore>) -> Self {
        Self { store }
    }

    fn read(&self, key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(key, error = %e, "Failed to read session state");
                None
            }
        }
    }
}

impl SessionProvider for StoredSessionProvider {
    fn current_user(&self) -> Option<Actor> {
        let blob = self.read(CURRENT_USER_KEY)?;
        match serde_json::from_str::<StoredUser>(&blob) {
            Ok(user) => Some(user.into()),
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring malformed stored user");
                None
            }
        }
    }

    fn session_id(&self) -> Option<String> {
        self.read(SESSION_ID_KEY)
            .map(|s| s.trim().trim_matches('"').to_string())
            .filter(|s| !s.is_empty())
    }
}

/// Fixed session, for tests and hosts that resolve the user elsewhere
#[derive(Debug, Clone, Default)]
pub struct StaticSession {
    pub user: Option<Actor>,
    pub session_id: Option<String>,
}

impl StaticSession {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn user(user: Actor, session_id: impl Into<String>) -> Self {
        Self {
            user: Some(user),
            session_id: Some(session_id.into()),
        }
    }
}

impl SessionProvider for StaticSession {
    fn current_user(&self) -> Option<Actor> {
        self.user.clone()
    }

    fn session_id(&self) -> Option<String> {
        self.session_id.clone()
    }
}

/// Ambient request/session/actor identifiers
///
/// Every field is optional; `merge` is last-write-wins per field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl AuditContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, actor: &Actor) -> Self {
        self.user_id = Some(actor.user_id.clone());
        self.user_name = Some(actor.user_name.clone());
        self.user_email = actor.user_email.clone();
        self.user_role = Some(actor.user_role.clone());
        self
    }

    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    pub fn request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn ip_address(mut self, ip: impl Into<String>) -> Self {
        self.ip_address = Some(ip.into());
        self
    }

    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Overlay the fields set in `other`
    pub fn merge(&mut self, other: AuditContext) {
        fn take(slot: &mut Option<String>, value: Option<String>) {
            if value.is_some() {
                *slot = value;
            }
        }
        take(&mut self.user_id, other.user_id);
        take(&mut self.user_name, other.user_name);
        take(&mut self.user_email, other.user_email);
        take(&mut self.user_role, other.user_role);
        take(&mut self.session_id, other.session_id);
        take(&mut self.request_id, other.request_id);
        take(&mut self.ip_address, other.ip_address);
        take(&mut self.user_agent, other.user_agent);
    }

    /// Actor fields from the context layered over `base`
    ///
    /// Returns `None` when neither the context nor `base` names a user.
    pub fn resolve_actor(&self, base: Option<Actor>) -> Option<Actor> {
        let user_id = self.user_id.clone().or_else(|| base.as_ref().map(|a| a.user_id.clone()))?;
        let base = base.filter(|b| b.user_id == user_id);
        Some(Actor {
            user_name: self
                .user_name
                .clone()
                .or_else(|| base.as_ref().map(|b| b.user_name.clone()))
                .unwrap_or_else(|| user_id.clone()),
            user_email: self
                .user_email
                .clone()
                .or_else(|| base.as_ref().and_then(|b| b.user_email.clone())),
            user_role: self
                .user_role
                .clone()
                .or_else(|| base.as_ref().map(|b| b.user_role.clone()))
                .unwrap_or_else(|| "user".to_string()),
            user_id,
        })
    }
}

/// Shared, mutable ambient context
#[derive(Debug, Default)]
pub struct ContextAccumulator {
    context: RwLock<AuditContext>,
}

impl ContextAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge fields into the ambient context (last write wins)
    pub fn set_context(&self, partial: AuditContext) {
        if let Ok(mut context) = self.context.write() {
            context.merge(partial);
        }
    }

    /// Reset to empty
    pub fn clear_context(&self) {
        if let Ok(mut context) = self.context.write() {
            *context = AuditContext::default();
        }
    }

    /// Copy of the current context
    pub fn snapshot(&self) -> AuditContext {
        self.context.read().map(|c| c.clone()).unwrap_or_default()
    }
}

/// Persist a session id the way the host application would
pub fn store_session_id(store: &dyn DurableStore, session_id: &str) -> Result<()> {
    store.set(SESSION_ID_KEY, session_id)
}
