//! HTTP collector backed by reqwest
//!
//! Speaks the collector's REST surface under a configurable base URL.
//! Responses may be either the bare payload or a `{ success, data }`
//! envelope; both are accepted.

use crate::collector::Collector;
use crate::config::ClientConfig;
use crate::error::{AuditError, Result};
use crate::query::{
    AuditLogPage, AuditLogQuery, AuditStats, SecurityAlert, StatsQuery, UserActivity,
};
use crate::types::{
    AlertThresholds, AuditConfiguration, AuditConfigurationUpdate, AuditLogEntry,
    PerformanceRecord,
};
use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

/// Longest response body echoed into an error message
const MAX_ERROR_BODY: usize = 512;

/// Collector reached over HTTP
pub struct HttpCollector {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpCollector {
    /// Build a collector from client configuration
    ///
    /// The reqwest-level timeout is the query timeout; capture calls are
    /// additionally bounded by their own, shorter deadlines.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.query_timeout_duration())
            .build()
            .map_err(|e| AuditError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self::with_client(client, config))
    }

    /// Use a preconfigured reqwest client
    pub fn with_client(client: reqwest::Client, config: &ClientConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.authorize(self.client.request(method, url))
    }

    /// Request to `segments` under the base URL, each one percent-encoded
    ///
    /// Caller-supplied ids go through here so `/`, `?` and `#` stay
    /// inside their segment.
    fn segment_request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder> {
        if let Some(bad) = segments
            .iter()
            .find(|s| s.is_empty() || **s == "." || **s == "..")
        {
            return Err(AuditError::Config(format!("Invalid path segment: {:?}", bad)));
        }
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| AuditError::Config(format!("Invalid base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| {
                AuditError::Config(format!("Base URL cannot carry a path: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(self.authorize(self.client.request(method, url)))
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = extract_message(&body)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
        Err(AuditError::Status {
            status: status.as_u16(),
            message,
        })
    }

    /// Send and ignore the body, except for an explicit `success: false`
    async fn execute(&self, builder: RequestBuilder) -> Result<()> {
        let response = self.send(builder).await?;
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(());
        }
        // Non-JSON 2xx bodies count as accepted
        if let Ok(value) = serde_json::from_str::<Value>(&body) {
            check_envelope(&value)?;
        }
        Ok(())
    }

    /// Send and decode the payload, unwrapping an envelope if present
    async fn fetch<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let response = self.send(builder).await?;
        let value: Value = response.json().await?;
        check_envelope(&value)?;
        let payload = match value {
            Value::Object(mut map) if map.contains_key("data") && map.contains_key("success") => {
                map.remove("data").unwrap_or(Value::Null)
            }
            other => other,
        };
        Ok(serde_json::from_value(payload)?)
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        self.execute(self.request(Method::POST, path).json(body))
            .await
    }
}

/// Map `{ "success": false, "message": .. }` to `Rejected`
fn check_envelope(value: &Value) -> Result<()> {
    if value.get("success").and_then(Value::as_bool) == Some(false) {
        let message = value
            .get("message")
            .or_else(|| value.get("error"))
            .and_then(Value::as_str)
            .unwrap_or("request rejected");
        return Err(AuditError::Rejected(message.to_string()));
    }
    Ok(())
}

/// Pull a human message out of an error body
fn extract_message(body: &str) -> Option<String> {
    let body = body.trim();
    if body.is_empty() {
        return None;
    }
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.to_string());
    Some(truncate(message, MAX_ERROR_BODY))
}

fn truncate(mut s: String, max: usize) -> String {
    if s.len() > max {
        let mut cut = max;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        s.truncate(cut);
        s.push_str("...");
    }
    s
}

#[async_trait]
impl Collector for HttpCollector {
    async fn submit(&self, entry: &AuditLogEntry) -> Result<()> {
        self.post("/audit/logs", entry).await
    }

    async fn submit_batch(&self, entries: &[AuditLogEntry]) -> Result<()> {
        self.post("/audit/logs/batch", &json!({ "logs": entries }))
            .await
    }

    async fn submit_performance(&self, record: &PerformanceRecord) -> Result<()> {
        self.post("/audit/performance", record).await
    }

    async fn security_check(
        &self,
        entry: &AuditLogEntry,
        thresholds: &AlertThresholds,
    ) -> Result<()> {
        self.post(
            "/audit/security-check",
            &json!({ "log": entry, "thresholds": thresholds }),
        )
        .await
    }

    async fn fetch_config(&self) -> Result<AuditConfiguration> {
        self.fetch(self.request(Method::GET, "/audit/config")).await
    }

    async fn update_config(&self, update: &AuditConfigurationUpdate) -> Result<()> {
        self.execute(self.request(Method::PUT, "/audit/config").json(update))
            .await
    }

    async fn query_logs(&self, query: &AuditLogQuery) -> Result<AuditLogPage> {
        self.fetch(self.request(Method::GET, "/audit/logs").query(query))
            .await
    }

    async fn stats(&self, query: &StatsQuery) -> Result<AuditStats> {
        self.fetch(self.request(Method::GET, "/audit/stats").query(query))
            .await
    }

    async fn security_alerts(&self, resolved: Option<bool>) -> Result<Vec<SecurityAlert>> {
        let mut builder = self.request(Method::GET, "/audit/security-alerts");
        if let Some(resolved) = resolved {
            builder = builder.query(&[("resolved", resolved)]);
        }
        self.fetch(builder).await
    }

    async fn acknowledge_alert(&self, alert_id: &str) -> Result<()> {
        let builder = self.segment_request(
            Method::POST,
            &["audit", "security-alerts", alert_id, "acknowledge"],
        )?;
        self.execute(builder).await
    }

    async fn resolve_alert(&self, alert_id: &str, resolution: &str) -> Result<()> {
        let builder = self.segment_request(
            Method::POST,
            &["audit", "security-alerts", alert_id, "resolve"],
        )?;
        self.execute(builder.json(&json!({ "resolution": resolution })))
            .await
    }

    async fn user_activity(&self, user_id: &str, days: Option<u32>) -> Result<UserActivity> {
        let mut builder =
            self.segment_request(Method::GET, &["audit", "users", user_id, "activity"])?;
        if let Some(days) = days {
            builder = builder.query(&[("days", days)]);
        }
        self.fetch(builder).await
    }

    fn name(&self) -> &str {
        "http"
    }
}
