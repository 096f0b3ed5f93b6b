//! Configuration for a3s-audit
//!
//! Two layers:
//! - `ClientConfig` is how this process reaches the collector (URL, token,
//!   timeouts, local queue). Passed programmatically via
//!   `ClientConfig::new()` + builder methods, or loaded from a JSON file.
//! - `ConfigStore` is the server-owned `AuditConfiguration` policy. Starts
//!   from safe defaults, is replaced by a successful `refresh()`, and is
//!   merged in place by a successful `update()`. Never persisted locally.

use crate::collector::{with_deadline, Collector};
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink};
use crate::error::{AuditError, Result};
use crate::queue::DEFAULT_QUEUE_CAPACITY;
use crate::types::{AuditConfiguration, AuditConfigurationUpdate};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

// ============================================================================
// Client Configuration
// ============================================================================

fn default_user_agent() -> String {
    format!("a3s-audit/{}", env!("CARGO_PKG_VERSION"))
}

/// Connection and local-storage settings for the audit client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    /// Collector base URL; endpoint paths (`/audit/...`) are appended
    pub base_url: String,
    /// Bearer token sent with every request
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    pub user_agent: String,
    pub entry_timeout_ms: u64,
    pub batch_timeout_ms: u64,
    pub performance_timeout_ms: u64,
    pub alert_timeout_ms: u64,
    pub query_timeout_ms: u64,
    /// Maximum pending entries kept locally
    pub queue_capacity: usize,
    /// Directory for the file store; in-memory storage when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<PathBuf>,
    /// Run a background sync on this interval when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_interval_secs: Option<u64>,
    /// Trigger a background sync after a successful single-entry delivery
    pub sync_on_delivery: bool,
    /// Queue 4xx-rejected entries for retry instead of dropping them
    pub retry_client_errors: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000/api".to_string(),
            auth_token: None,
            user_agent: default_user_agent(),
            entry_timeout_ms: 5_000,
            batch_timeout_ms: 10_000,
            performance_timeout_ms: 2_000,
            alert_timeout_ms: 5_000,
            query_timeout_ms: 10_000,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            storage_dir: None,
            sync_interval_secs: None,
            sync_on_delivery: true,
            retry_client_errors: false,
        }
    }
}

impl ClientConfig {
    /// Create a configuration for the given collector base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            AuditError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: ClientConfig = serde_json::from_str(&content).map_err(|e| {
            AuditError::Config(format!("Failed to parse config file {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval_secs = Some(interval.as_secs().max(1));
        self
    }

    pub fn sync_on_delivery(mut self, enabled: bool) -> Self {
        self.sync_on_delivery = enabled;
        self
    }

    pub fn retry_client_errors(mut self, enabled: bool) -> Self {
        self.retry_client_errors = enabled;
        self
    }

    pub fn entry_timeout(mut self, timeout: Duration) -> Self {
        self.entry_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn batch_timeout(mut self, timeout: Duration) -> Self {
        self.batch_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Check the configuration for obviously unusable values
    pub fn validate(&self) -> Result<()> {
        let url = self.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(AuditError::Config(format!(
                "baseUrl must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        let timeouts = [
            ("entryTimeoutMs", self.entry_timeout_ms),
            ("batchTimeoutMs", self.batch_timeout_ms),
            ("performanceTimeoutMs", self.performance_timeout_ms),
            ("alertTimeoutMs", self.alert_timeout_ms),
            ("queryTimeoutMs", self.query_timeout_ms),
        ];
        if let Some((name, _)) = timeouts.iter().find(|(_, ms)| *ms == 0) {
            return Err(AuditError::Config(format!("{} must be greater than 0", name)));
        }
        if self.queue_capacity == 0 {
            return Err(AuditError::Config("queueCapacity must be greater than 0".to_string()));
        }
        Ok(())
    }

    pub fn entry_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.entry_timeout_ms)
    }

    pub fn batch_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    pub fn performance_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.performance_timeout_ms)
    }

    pub fn alert_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.alert_timeout_ms)
    }

    pub fn query_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

// ============================================================================
// Configuration Store
// ============================================================================

/// Holds the mutable audit policy every other component reads
pub struct ConfigStore {
    current: RwLock<AuditConfiguration>,
    collector: Arc<dyn Collector>,
    diagnostics: Arc<dyn DiagnosticSink>,
    timeout: Duration,
}

impl ConfigStore {
    /// Create a store holding the default policy
    pub fn new(
        collector: Arc<dyn Collector>,
        diagnostics: Arc<dyn DiagnosticSink>,
        timeout: Duration,
    ) -> Self {
        Self::with_initial(AuditConfiguration::default(), collector, diagnostics, timeout)
    }

    pub fn with_initial(
        initial: AuditConfiguration,
        collector: Arc<dyn Collector>,
        diagnostics: Arc<dyn DiagnosticSink>,
        timeout: Duration,
    ) -> Self {
        Self {
            current: RwLock::new(initial),
            collector,
            diagnostics,
            timeout,
        }
    }

    /// Current policy
    pub fn get(&self) -> AuditConfiguration {
        self.read(Clone::clone)
    }

    /// Read the current policy without cloning it
    pub fn read<R>(&self, f: impl FnOnce(&AuditConfiguration) -> R) -> R {
        match self.current.read() {
            Ok(config) => f(&config),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    /// Replace the local policy with the server's
    ///
    /// On failure the prior policy is kept and the failure is reported.
    /// Returns whether the refresh succeeded.
    pub async fn refresh(&self) -> bool {
        match with_deadline(self.timeout, "fetch config", self.collector.fetch_config()).await {
            Ok(config) => {
                tracing::info!(
                    enabled = config.enabled,
                    log_level = %config.log_level,
                    "Audit configuration refreshed"
                );
                self.replace(config);
                true
            }
            Err(e) => {
                self.diagnostics.report(Diagnostic::new(
                    DiagnosticKind::ConfigRefreshFailed,
                    e.to_string(),
                ));
                false
            }
        }
    }

    /// Send a partial update; merge it locally only once the server accepts it
    pub async fn update(&self, update: AuditConfigurationUpdate) -> Result<()> {
        with_deadline(self.timeout, "update config", self.collector.update_config(&update)).await?;

        match self.current.write() {
            Ok(mut config) => update.apply_to(&mut config),
            Err(poisoned) => update.apply_to(&mut poisoned.into_inner()),
        }
        tracing::info!(?update, "Audit configuration updated");
        Ok(())
    }

    fn replace(&self, config: AuditConfiguration) {
        match self.current.write() {
            Ok(mut current) => *current = config,
            Err(poisoned) => *poisoned.into_inner() = config,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{CollectorOp, Failure, MemoryCollector};
    use crate::diagnostics::MemorySink;
    use crate::types::AuditSeverity;

    fn store(collector: Arc<MemoryCollector>) -> (ConfigStore, MemorySink) {
        let sink = MemorySink::new();
        let store = ConfigStore::new(collector, Arc::new(sink.clone()), Duration::from_secs(1));
        (store, sink)
    }

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.entry_timeout_ms, 5_000);
        assert_eq!(config.performance_timeout_ms, 2_000);
        assert_eq!(config.queue_capacity, 100);
        assert!(config.sync_on_delivery);
        assert!(!config.retry_client_errors);
        assert!(config.user_agent.starts_with("a3s-audit/"));
        config.validate().unwrap();
    }

    #[test]
    fn test_client_config_builder() {
        let config = ClientConfig::new("https://audit.example.com/api")
            .auth_token("tok")
            .queue_capacity(10)
            .sync_interval(Duration::from_secs(30))
            .entry_timeout(Duration::from_millis(250));

        assert_eq!(config.auth_token.as_deref(), Some("tok"));
        assert_eq!(config.queue_capacity, 10);
        assert_eq!(config.sync_interval_secs, Some(30));
        assert_eq!(config.entry_timeout_duration(), Duration::from_millis(250));
    }

    #[test]
    fn test_client_config_validate_rejects_bad_values() {
        assert!(ClientConfig::new("ftp://x").validate().is_err());
        assert!(ClientConfig::default().queue_capacity(0).validate().is_err());
        assert!(ClientConfig::default()
            .entry_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_client_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.json");
        std::fs::write(
            &path,
            r#"{"baseUrl": "https://collector.internal", "queueCapacity": 25, "syncIntervalSecs": 60}"#,
        )
        .unwrap();

        let config = ClientConfig::from_file(&path).unwrap();
        assert_eq!(config.base_url, "https://collector.internal");
        assert_eq!(config.queue_capacity, 25);
        assert_eq!(config.sync_interval_secs, Some(60));
        assert_eq!(config.entry_timeout_ms, 5_000);
    }

    #[test]
    fn test_client_config_from_missing_file() {
        let err = ClientConfig::from_file("/nonexistent/a3s-audit.json").unwrap_err();
        assert!(matches!(err, AuditError::Config(_)));
    }

    #[tokio::test]
    async fn test_refresh_replaces_config() {
        let collector = Arc::new(MemoryCollector::new());
        collector.set_config(AuditConfiguration {
            log_level: AuditSeverity::High,
            ..Default::default()
        });
        let (store, _) = store(collector);

        assert_eq!(store.get().log_level, AuditSeverity::Low);
        assert!(store.refresh().await);
        assert_eq!(store.get().log_level, AuditSeverity::High);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_prior_config() {
        let collector = Arc::new(MemoryCollector::new());
        collector.fail(CollectorOp::Config, Some(Failure::Network));
        let (store, sink) = store(collector);

        assert!(!store.refresh().await);
        assert_eq!(store.get(), AuditConfiguration::default());
        assert_eq!(sink.count(DiagnosticKind::ConfigRefreshFailed), 1);
    }

    #[tokio::test]
    async fn test_update_merges_only_on_success() {
        let collector = Arc::new(MemoryCollector::new());
        let (store, _) = store(collector.clone());

        let update = AuditConfigurationUpdate {
            log_level: Some(AuditSeverity::Medium),
            ..Default::default()
        };

        collector.fail(CollectorOp::Config, Some(Failure::Status(500)));
        assert!(store.update(update.clone()).await.is_err());
        assert_eq!(store.get().log_level, AuditSeverity::Low);

        collector.fail(CollectorOp::Config, None);
        store.update(update).await.unwrap();
        assert_eq!(store.get().log_level, AuditSeverity::Medium);
        assert_eq!(collector.config().log_level, AuditSeverity::Medium);
    }
}
