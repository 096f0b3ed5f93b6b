//! HttpCollector tests against a mock HTTP server
//!
//! Verifies paths, bodies, bearer auth, envelope handling and status
//! mapping of the REST collector.

use a3s_audit::{
    Actor, AlertThresholds, AuditAction, AuditError, AuditLogEntry, AuditLogQuery,
    AuditResource, AuditService, AuditSeverity, ClientConfig, Collector, HttpCollector,
    MemorySink, MemoryStore,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn entry(id: &str, severity: AuditSeverity) -> AuditLogEntry {
    AuditLogEntry {
        id: id.to_string(),
        timestamp: chrono::Utc::now(),
        action: AuditAction::Login,
        resource: AuditResource::User,
        resource_id: None,
        actor: Actor::anonymous(),
        severity,
        description: "Login".to_string(),
        details: Default::default(),
        changes: Vec::new(),
        metadata: Default::default(),
        tags: Default::default(),
        success: true,
        error_message: None,
    }
}

fn config(server: &MockServer) -> ClientConfig {
    ClientConfig::new(format!("{}/api", server.uri())).auth_token("secret")
}

#[tokio::test]
async fn test_submit_posts_entry_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/audit/logs"))
        .and(header("authorization", "Bearer secret"))
        .and(body_partial_json(json!({
            "id": "audit-1",
            "action": "login",
            "resource": "user",
            "userId": "anonymous"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "success": true })))
        .expect(1)
        .mount(&server)
        .await;

    let collector = HttpCollector::new(&config(&server)).unwrap();
    collector
        .submit(&entry("audit-1", AuditSeverity::Low))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_batch_and_security_check_bodies() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/audit/logs/batch"))
        .and(body_partial_json(json!({ "logs": [{ "id": "a" }, { "id": "b" }] })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/audit/security-check"))
        .and(body_partial_json(json!({
            "log": { "id": "c", "severity": "critical" },
            "thresholds": { "failedLogins": 5, "privilegeChanges": 3 }
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let collector = HttpCollector::new(&config(&server)).unwrap();
    collector
        .submit_batch(&[entry("a", AuditSeverity::Low), entry("b", AuditSeverity::Low)])
        .await
        .unwrap();
    collector
        .security_check(
            &entry("c", AuditSeverity::Critical),
            &AlertThresholds::default(),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn test_error_status_maps_to_status_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/audit/logs"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({ "message": "invalid action" })),
        )
        .mount(&server)
        .await;

    let collector = HttpCollector::new(&config(&server)).unwrap();
    let err = collector
        .submit(&entry("x", AuditSeverity::Low))
        .await
        .unwrap_err();

    match err {
        AuditError::Status { status, message } => {
            assert_eq!(status, 422);
            assert_eq!(message, "invalid action");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_envelope_rejection_and_unwrapping() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/audit/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": { "enabled": true, "logLevel": "high", "excludedActions": ["read"] }
        })))
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/audit/config"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": false,
            "message": "read-only policy"
        })))
        .mount(&server)
        .await;

    let collector = HttpCollector::new(&config(&server)).unwrap();
    let policy = collector.fetch_config().await.unwrap();
    assert_eq!(policy.log_level, AuditSeverity::High);
    assert!(policy.excluded_actions.contains(&AuditAction::Read));
    assert_eq!(policy.retention_days, 365);

    let err = collector
        .update_config(&Default::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AuditError::Rejected(m) if m == "read-only policy"));
}

#[tokio::test]
async fn test_query_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/audit/logs"))
        .and(query_param("action", "login"))
        .and(query_param("page", "2"))
        .and(query_param("limit", "25"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "logs": [],
            "total": 30,
            "page": 2,
            "limit": 25
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/audit/security-alerts"))
        .and(query_param("resolved", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/audit/security-alerts/al-1/resolve"))
        .and(body_partial_json(json!({ "resolution": "rotated keys" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let collector = HttpCollector::new(&config(&server)).unwrap();
    let page = collector
        .query_logs(&AuditLogQuery::new().action(AuditAction::Login).page(2, 25))
        .await
        .unwrap();
    assert_eq!(page.total, 30);
    assert!(!page.has_more());

    assert!(collector.security_alerts(Some(false)).await.unwrap().is_empty());
    collector.resolve_alert("al-1", "rotated keys").await.unwrap();
}

#[tokio::test]
async fn test_ids_stay_inside_their_path_segment() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/audit/users/jo%23hn/activity"))
        .and(query_param("days", "7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "userId": "jo#hn",
            "totalActions": 3
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/audit/security-alerts/..%2F..%2Fstats%3F/acknowledge"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let collector = HttpCollector::new(&config(&server)).unwrap();
    let activity = collector.user_activity("jo#hn", Some(7)).await.unwrap();
    assert_eq!(activity.user_id, "jo#hn");
    assert_eq!(activity.total_actions, 3);

    collector.acknowledge_alert("../../stats?").await.unwrap();

    let err = collector.resolve_alert("..", "n/a").await.unwrap_err();
    assert!(matches!(err, AuditError::Config(_)));
}

#[tokio::test]
async fn test_service_queues_when_server_is_slow() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/audit/logs"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
        .mount(&server)
        .await;

    let service = AuditService::builder(
        config(&server).entry_timeout(Duration::from_millis(200)),
    )
    .store(Arc::new(MemoryStore::new()))
    .diagnostics(Arc::new(MemorySink::new()))
    .build()
    .unwrap();

    let outcome = service.log_logout().await;
    assert!(outcome.is_recorded());
    assert_eq!(service.pending_count().await, 1);
}
