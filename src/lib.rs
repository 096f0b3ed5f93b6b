//! # a3s-audit
//!
//! Durable client-side audit capture, delivery, and reconciliation for the A3S ecosystem.
//!
//! ## Overview
//!
//! `a3s-audit` records security- and business-relevant events from a running
//! application and delivers them to a remote collector. Entries that cannot
//! be delivered are kept in a bounded local queue and re-sent later, so an
//! unavailable backend delays audit records instead of losing them. Audit
//! failures never reach the business code being audited.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use a3s_audit::{AuditService, ClientConfig, MemoryCollector};
//!
//! # async fn example() -> a3s_audit::Result<()> {
//! let service = AuditService::builder(ClientConfig::default())
//!     .collector(Arc::new(MemoryCollector::new()))
//!     .build()?;
//!
//! // Failed login: medium severity, queued if the collector is down
//! let outcome = service.log_login(false, Some("bad password")).await;
//! println!("Audit outcome: {:?}", outcome);
//!
//! // Retry anything that was queued
//! service.sync().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Collectors
//!
//! - **http** — REST collector over reqwest
//! - **memory** — In-memory collector for testing and single-process use
//!
//! ## Architecture
//!
//! - **AuditService** — entry point: filter, build, deliver, queue, forward
//! - **Collector** trait — remote side all backends implement
//! - **PendingQueue** — bounded, ordered fallback queue over a `DurableStore`
//! - **Reconciler** — flushes the queue and clears only what was delivered
//! - **DiagnosticSink** — where failures of the audit subsystem itself go

pub mod alert;
pub mod builder;
pub mod collector;
pub mod config;
pub mod context;
pub mod convenience;
pub mod delivery;
pub mod diagnostics;
pub mod error;
pub mod filter;
pub mod perf;
pub mod query;
pub mod queue;
pub mod reconcile;
pub mod service;
pub mod storage;
pub mod types;

// Re-export core types
pub use error::{AuditError, Result};
pub use service::{AuditOutcome, AuditService, AuditServiceBuilder};
pub use types::{
    Actor, AlertThresholds, AuditAction, AuditConfiguration, AuditConfigurationUpdate,
    AuditDetails, AuditLogEntry, AuditMetadata, AuditOptions, AuditResource, AuditSeverity,
    FieldChange, PerformanceRecord,
};
pub use query::{
    AuditLogPage, AuditLogQuery, AuditStats, SecurityAlert, StatsQuery, UserActivity, UserCount,
};

// Re-export building blocks
pub use alert::SecurityAlertForwarder;
pub use builder::EventBuilder;
pub use collector::{Collector, CollectorOp, Failure, HttpCollector, MemoryCollector};
pub use config::{ClientConfig, ConfigStore};
pub use context::{
    AuditContext, Clock, ContextAccumulator, ManualClock, SessionProvider, StaticSession,
    StoredSessionProvider, SystemClock,
};
pub use convenience::{ContentOperation, UserOperation};
pub use delivery::{DeliveryPipeline, DeliveryTimeouts};
pub use diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, MemorySink, TracingSink};
pub use filter::{should_log, FilterReason};
pub use perf::PerformanceRecorder;
pub use queue::{PendingQueue, DEFAULT_QUEUE_CAPACITY};
pub use reconcile::{PeriodicSync, Reconciler, SyncOutcome};
pub use storage::{DurableStore, FileStore, MemoryStore};
