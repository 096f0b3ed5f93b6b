//! AuditService, the entry point instrumented code talks to
//!
//! Wires configuration, context, builder, delivery, fallback queue,
//! reconciler, alert forwarder and performance recorder into one
//! explicitly constructed, cheaply cloneable handle.
//!
//! ```rust,ignore
//! use a3s_audit::{AuditAction, AuditOptions, AuditResource, AuditService, ClientConfig};
//!
//! let service = AuditService::new(ClientConfig::new("https://cms.example.com/api"))?;
//! service.start().await;
//!
//! service
//!     .log(
//!         AuditAction::Publish,
//!         AuditResource::Content,
//!         "Published article",
//!         AuditOptions::new().resource_id("post-42"),
//!     )
//!     .await;
//! ```

use crate::alert::SecurityAlertForwarder;
use crate::builder::EventBuilder;
use crate::collector::{with_deadline, Collector, HttpCollector};
use crate::config::{ClientConfig, ConfigStore};
use crate::context::{
    AuditContext, Clock, ContextAccumulator, SessionProvider, StoredSessionProvider, SystemClock,
};
use crate::delivery::{DeliveryPipeline, DeliveryTimeouts};
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink, TracingSink};
use crate::error::Result;
use crate::filter::{self, FilterReason};
use crate::perf::PerformanceRecorder;
use crate::query::{
    AuditLogPage, AuditLogQuery, AuditStats, SecurityAlert, StatsQuery, UserActivity,
};
use crate::queue::PendingQueue;
use crate::reconcile::{PeriodicSync, Reconciler, SyncOutcome};
use crate::storage::{DurableStore, FileStore, MemoryStore};
use crate::types::{
    AuditAction, AuditConfiguration, AuditConfigurationUpdate, AuditLogEntry, AuditOptions,
    AuditResource,
};
use futures::FutureExt;
use std::any::Any;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Terminal state of one `log` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditOutcome {
    /// Dropped by policy before anything was built
    Filtered(FilterReason),
    /// Accepted by the collector; `forwarded` if sent for alert evaluation
    Delivered { forwarded: bool },
    /// Delivery failed; entry is in the fallback queue
    Queued,
    /// Delivery failed and the entry could not be kept
    Dropped,
}

impl AuditOutcome {
    /// Whether the entry reached the collector or the fallback queue
    pub fn is_recorded(&self) -> bool {
        matches!(self, AuditOutcome::Delivered { .. } | AuditOutcome::Queued)
    }
}

/// Fire-and-forget work spawned by the service
#[derive(Default)]
struct BackgroundTasks {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl BackgroundTasks {
    fn track(&self, handle: JoinHandle<()>) {
        let mut handles = self.handles.lock().unwrap_or_else(|p| p.into_inner());
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Await everything tracked, including tasks spawned while waiting
    async fn flush(&self) {
        loop {
            let batch = {
                let mut handles = self.handles.lock().unwrap_or_else(|p| p.into_inner());
                std::mem::take(&mut *handles)
            };
            if batch.is_empty() {
                return;
            }
            for handle in batch {
                if let Err(e) = handle.await {
                    tracing::error!(error = %e, "Audit background task failed");
                }
            }
        }
    }
}

struct ServiceInner {
    config: Arc<ConfigStore>,
    context: Arc<ContextAccumulator>,
    builder: Arc<EventBuilder>,
    delivery: Arc<DeliveryPipeline>,
    queue: Arc<PendingQueue>,
    reconciler: Arc<Reconciler>,
    forwarder: Arc<SecurityAlertForwarder>,
    perf: Arc<PerformanceRecorder>,
    collector: Arc<dyn Collector>,
    diagnostics: Arc<dyn DiagnosticSink>,
    tasks: BackgroundTasks,
    periodic: tokio::sync::Mutex<Option<PeriodicSync>>,
    sync_interval: Option<Duration>,
    sync_on_delivery: bool,
    retry_client_errors: bool,
    query_timeout: Duration,
}

/// Audit capture service
///
/// Cloning shares the same queue, configuration and context.
#[derive(Clone)]
pub struct AuditService {
    inner: Arc<ServiceInner>,
}

impl AuditService {
    /// Service with an HTTP collector and default collaborators
    pub fn new(config: ClientConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: ClientConfig) -> AuditServiceBuilder {
        AuditServiceBuilder::new(config)
    }

    /// Refresh the policy, flush anything left from a previous run and
    /// start the periodic sync loop if one is configured
    pub async fn start(&self) {
        self.refresh_config().await;
        self.sync().await;
        if let Some(interval) = self.inner.sync_interval {
            self.start_periodic_sync(interval).await;
        }
    }

    /// Stop the periodic loop (with a final sync) and wait for background work
    pub async fn shutdown(&self) {
        if let Some(periodic) = self.inner.periodic.lock().await.take() {
            periodic.shutdown().await;
        }
        self.flush_background().await;
    }

    /// Run `sync` every `interval`, replacing any loop already running
    pub async fn start_periodic_sync(&self, interval: Duration) {
        let mut periodic = self.inner.periodic.lock().await;
        if let Some(previous) = periodic.take() {
            previous.shutdown().await;
        }
        *periodic = Some(self.inner.reconciler.spawn_periodic(interval));
    }

    // ========================================================================
    // Capture
    // ========================================================================

    /// Record one event
    ///
    /// Never fails: filtering, delivery, queueing and forwarding failures
    /// end in an `AuditOutcome` and, where relevant, a diagnostic.
    pub async fn log(
        &self,
        action: AuditAction,
        resource: AuditResource,
        description: impl Into<String>,
        options: AuditOptions,
    ) -> AuditOutcome {
        let severity = options.effective_severity();
        let (rejection, include_changes) = self.inner.config.read(|c| {
            (
                filter::rejection(c, action, resource, severity),
                c.enable_detailed_changes,
            )
        });
        if let Some(reason) = rejection {
            tracing::trace!(
                action = %action,
                resource = %resource,
                reason = reason.as_str(),
                "Audit event filtered"
            );
            return AuditOutcome::Filtered(reason);
        }

        let entry = self
            .inner
            .builder
            .build(action, resource, description, options, include_changes);
        self.deliver(entry).await
    }

    /// Spawn `log` without waiting for it
    ///
    /// The task is tracked; `flush_background` waits for it. Called
    /// outside a Tokio runtime, nothing is logged and a
    /// `RuntimeUnavailable` diagnostic is reported.
    pub fn emit(
        &self,
        action: AuditAction,
        resource: AuditResource,
        description: impl Into<String>,
        options: AuditOptions,
    ) {
        let service = self.clone();
        let description = description.into();
        self.spawn_tracked("emit", async move {
            service.log(action, resource, description, options).await;
        });
    }

    /// Spawn on the current runtime and track the task
    fn spawn_tracked<F>(&self, what: &str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => self.inner.tasks.track(handle.spawn(future)),
            Err(e) => self.inner.diagnostics.report(Diagnostic::new(
                DiagnosticKind::RuntimeUnavailable,
                format!("{}: {}", what, e),
            )),
        }
    }

    /// Run `operation`, then record exactly one entry describing it
    ///
    /// The entry carries the elapsed time and whether the operation
    /// succeeded. The operation's own result is returned unchanged; a
    /// panic is recorded as a failure and then resumed.
    pub async fn with_audit_logging<T, E, F>(
        &self,
        action: AuditAction,
        resource: AuditResource,
        description: impl Into<String>,
        options: AuditOptions,
        operation: F,
    ) -> std::result::Result<T, E>
    where
        F: Future<Output = std::result::Result<T, E>>,
        E: Display,
    {
        let started = Instant::now();
        let result = AssertUnwindSafe(operation).catch_unwind().await;
        let elapsed = started.elapsed();

        let error_message = match &result {
            Ok(Ok(_)) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(panic) => Some(panic_message(panic.as_ref())),
        };

        let options = options.duration_ms(elapsed.as_millis() as u64);
        let options = match &error_message {
            None => options.success(true),
            Some(message) => options.failed(message.clone()),
        };
        self.log(action, resource, description, options).await;
        self.record_performance(
            format!("{}:{}", action, resource),
            elapsed,
            error_message,
        );

        match result {
            Ok(outcome) => outcome,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    async fn deliver(&self, entry: AuditLogEntry) -> AuditOutcome {
        let inner = &self.inner;
        match inner.delivery.send(&entry).await {
            Ok(()) => {
                let (alerts_enabled, thresholds) = inner
                    .config
                    .read(|c| (c.enable_real_time_alerts, c.alert_thresholds));
                let forwarded = alerts_enabled && entry.severity.is_alertable();
                if forwarded {
                    inner.tasks.track(inner.forwarder.forward(entry, thresholds));
                }
                if inner.sync_on_delivery && !inner.queue.is_empty().await {
                    let reconciler = Arc::clone(&inner.reconciler);
                    inner.tasks.track(tokio::spawn(async move {
                        reconciler.sync().await;
                    }));
                }
                AuditOutcome::Delivered { forwarded }
            }
            Err(e) if e.is_permanent() && !inner.retry_client_errors => {
                inner.diagnostics.report(Diagnostic::for_entry(
                    DiagnosticKind::DeliveryRejected,
                    &entry.id,
                    e.to_string(),
                ));
                AuditOutcome::Dropped
            }
            Err(e) => {
                inner.diagnostics.report(Diagnostic::for_entry(
                    DiagnosticKind::DeliveryFailed,
                    &entry.id,
                    e.to_string(),
                ));
                if inner.queue.enqueue(entry).await {
                    AuditOutcome::Queued
                } else {
                    AuditOutcome::Dropped
                }
            }
        }
    }

    /// Report an operation's timing in the background
    ///
    /// No-op while performance tracking is disabled. Outside a Tokio
    /// runtime the record is dropped with a `RuntimeUnavailable` diagnostic.
    pub fn record_performance(
        &self,
        operation: impl Into<String>,
        duration: Duration,
        error_message: Option<String>,
    ) {
        let perf = Arc::clone(&self.inner.perf);
        if !perf.is_enabled() {
            return;
        }
        let record = perf.sample(operation, duration, error_message.is_none(), error_message);
        self.spawn_tracked("record_performance", async move {
            perf.record(&record).await;
        });
    }

    /// Wait for every tracked background task (forwarding, performance
    /// reports, emitted logs, opportunistic syncs)
    pub async fn flush_background(&self) {
        self.inner.tasks.flush().await;
    }

    // ========================================================================
    // Context
    // ========================================================================

    pub fn set_context(&self, context: AuditContext) {
        self.inner.context.set_context(context);
    }

    pub fn clear_context(&self) {
        self.inner.context.clear_context();
    }

    pub fn context(&self) -> AuditContext {
        self.inner.context.snapshot()
    }

    // ========================================================================
    // Queue & reconciliation
    // ========================================================================

    /// Flush the fallback queue to the collector
    pub async fn sync(&self) -> SyncOutcome {
        self.inner.reconciler.sync().await
    }

    /// Entries currently waiting in the fallback queue, oldest first
    pub async fn pending(&self) -> Vec<AuditLogEntry> {
        self.inner.queue.drain().await
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.queue.len().await
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    pub fn config(&self) -> AuditConfiguration {
        self.inner.config.get()
    }

    /// Replace the local policy with the server's; keeps the old one on failure
    pub async fn refresh_config(&self) -> bool {
        self.inner.config.refresh().await
    }

    /// Send a partial policy update; merged locally only on success
    pub async fn update_config(&self, update: AuditConfigurationUpdate) -> Result<()> {
        self.inner.config.update(update).await
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn query_logs(&self, query: &AuditLogQuery) -> Result<AuditLogPage> {
        let collector = &self.inner.collector;
        with_deadline(self.inner.query_timeout, "query logs", collector.query_logs(query)).await
    }

    pub async fn stats(&self, query: &StatsQuery) -> Result<AuditStats> {
        let collector = &self.inner.collector;
        with_deadline(self.inner.query_timeout, "stats", collector.stats(query)).await
    }

    /// Alerts, optionally only resolved (`Some(true)`) or open (`Some(false)`)
    pub async fn security_alerts(&self, resolved: Option<bool>) -> Result<Vec<SecurityAlert>> {
        let collector = &self.inner.collector;
        with_deadline(
            self.inner.query_timeout,
            "security alerts",
            collector.security_alerts(resolved),
        )
        .await
    }

    pub async fn acknowledge_alert(&self, alert_id: &str) -> Result<()> {
        let collector = &self.inner.collector;
        with_deadline(
            self.inner.query_timeout,
            "acknowledge alert",
            collector.acknowledge_alert(alert_id),
        )
        .await
    }

    pub async fn resolve_alert(&self, alert_id: &str, resolution: &str) -> Result<()> {
        let collector = &self.inner.collector;
        with_deadline(
            self.inner.query_timeout,
            "resolve alert",
            collector.resolve_alert(alert_id, resolution),
        )
        .await
    }

    pub async fn user_activity(&self, user_id: &str, days: Option<u32>) -> Result<UserActivity> {
        let collector = &self.inner.collector;
        with_deadline(
            self.inner.query_timeout,
            "user activity",
            collector.user_activity(user_id, days),
        )
        .await
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Assembles an `AuditService`; every collaborator can be replaced
pub struct AuditServiceBuilder {
    config: ClientConfig,
    collector: Option<Arc<dyn Collector>>,
    store: Option<Arc<dyn DurableStore>>,
    clock: Option<Arc<dyn Clock>>,
    session: Option<Arc<dyn SessionProvider>>,
    diagnostics: Option<Arc<dyn DiagnosticSink>>,
    initial_policy: Option<AuditConfiguration>,
}

impl AuditServiceBuilder {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            collector: None,
            store: None,
            clock: None,
            session: None,
            diagnostics: None,
            initial_policy: None,
        }
    }

    pub fn collector(mut self, collector: Arc<dyn Collector>) -> Self {
        self.collector = Some(collector);
        self
    }

    pub fn store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn session(mut self, session: Arc<dyn SessionProvider>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn diagnostics(mut self, diagnostics: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = Some(diagnostics);
        self
    }

    /// Policy used until the first successful refresh
    pub fn initial_policy(mut self, policy: AuditConfiguration) -> Self {
        self.initial_policy = Some(policy);
        self
    }

    pub fn build(self) -> Result<AuditService> {
        let config = self.config;
        config.validate()?;

        let collector: Arc<dyn Collector> = match self.collector {
            Some(collector) => collector,
            None => Arc::new(HttpCollector::new(&config)?),
        };
        let store: Arc<dyn DurableStore> = match (self.store, &config.storage_dir) {
            (Some(store), _) => store,
            (None, Some(dir)) => Arc::new(FileStore::new(dir)),
            (None, None) => Arc::new(MemoryStore::new()),
        };
        let diagnostics = self
            .diagnostics
            .unwrap_or_else(|| Arc::new(TracingSink) as Arc<dyn DiagnosticSink>);
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let session = self.session.unwrap_or_else(|| {
            Arc::new(StoredSessionProvider::new(store.clone())) as Arc<dyn SessionProvider>
        });

        let policy = Arc::new(ConfigStore::with_initial(
            self.initial_policy.unwrap_or_default(),
            collector.clone(),
            diagnostics.clone(),
            config.query_timeout_duration(),
        ));
        let context = Arc::new(ContextAccumulator::new());
        let builder = Arc::new(
            EventBuilder::new(clock, session, context.clone())
                .with_default_user_agent(config.user_agent.clone()),
        );
        let delivery = Arc::new(DeliveryPipeline::new(
            collector.clone(),
            DeliveryTimeouts::from(&config),
        ));
        let queue = Arc::new(PendingQueue::with_capacity(
            store,
            config.queue_capacity,
            diagnostics.clone(),
        ));
        let reconciler = Arc::new(Reconciler::new(
            queue.clone(),
            delivery.clone(),
            diagnostics.clone(),
        ));
        let forwarder = Arc::new(SecurityAlertForwarder::new(
            collector.clone(),
            diagnostics.clone(),
            config.alert_timeout_duration(),
        ));
        let perf = Arc::new(PerformanceRecorder::new(
            delivery.clone(),
            policy.clone(),
            builder.clone(),
            diagnostics.clone(),
        ));

        tracing::info!(
            collector = collector.name(),
            base_url = %config.base_url,
            queue_capacity = queue.capacity(),
            "Audit service created"
        );

        Ok(AuditService {
            inner: Arc::new(ServiceInner {
                config: policy,
                context,
                builder,
                delivery,
                queue,
                reconciler,
                forwarder,
                perf,
                collector,
                diagnostics,
                tasks: BackgroundTasks::default(),
                periodic: tokio::sync::Mutex::new(None),
                sync_interval: config.sync_interval_secs.map(Duration::from_secs),
                sync_on_delivery: config.sync_on_delivery,
                retry_client_errors: config.retry_client_errors,
                query_timeout: config.query_timeout_duration(),
            }),
        })
    }
}
