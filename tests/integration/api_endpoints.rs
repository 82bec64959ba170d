//! Integration tests for the query API
//!
//! These tests verify that:
//! - Every endpoint answers with the documented shape
//! - Unknown metric categories are reported as 404 with an error body
//! - Status health follows critical alerts

use pretty_assertions::assert_eq;
use reqwest::StatusCode;
use serde_json::{Map, json};
use swarm_dashboard::{FnSource, alerts::Severity, monitors::system::SYSTEM_CATEGORY};

use crate::helpers::*;

async fn empty_metrics() -> anyhow::Result<swarm_dashboard::ComponentMetrics> {
    Ok(Default::default())
}

#[tokio::test]
async fn test_health_endpoint_returns_ok() {
    let (dashboard, addr) = start_dashboard().await;

    let (status, body) = get_json(addr, "/api/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_string());

    dashboard.stop().await.unwrap();
}

#[tokio::test]
async fn test_status_endpoint_shape() {
    let (dashboard, addr) = start_dashboard().await;
    dashboard.tick_now().await.unwrap();

    let (status, body) = get_json(addr, "/api/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["healthy"], true);
    assert!(body["uptime"].is_u64());
    assert!(body["system"]["cpu"].is_number());
    assert!(body["system"]["memory"].is_number());
    assert_eq!(body["components"], json!([]));
    assert_eq!(body["alerts"], json!([]));

    dashboard.stop().await.unwrap();
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (dashboard, addr) = start_dashboard().await;
    dashboard.tick_now().await.unwrap();
    dashboard.tick_now().await.unwrap();

    let (status, body) = get_json(addr, &format!("/api/metrics/{SYSTEM_CATEGORY}")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["category"], SYSTEM_CATEGORY);
    let cpu = &body["metrics"]["cpu"];
    assert_eq!(cpu["count"], 2);
    assert_eq!(cpu["points"].as_array().unwrap().len(), 2);
    assert!(cpu["latest"].is_number());
    assert!(cpu["average"].is_number());

    dashboard.stop().await.unwrap();
}

#[tokio::test]
async fn test_unknown_category_is_not_found() {
    let (dashboard, addr) = start_dashboard().await;

    let (status, body) = get_json(addr, "/api/metrics/does-not-exist").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("does-not-exist"));

    dashboard.stop().await.unwrap();
}

#[tokio::test]
async fn test_alerts_endpoint_and_health() {
    let (dashboard, addr) = start_dashboard().await;
    let alerts = &dashboard.state().alerts;

    alerts
        .create_alert("disk", Severity::Warning, "disk filling up", Map::new())
        .await;
    let (_, status) = get_json(addr, "/api/status").await;
    assert_eq!(status["healthy"], true);

    alerts
        .create_alert("memory", Severity::Critical, "out of memory", Map::new())
        .await;
    alerts.clear_alert("disk").await;

    let (code, body) = get_json(addr, "/api/alerts").await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["active"].as_array().unwrap().len(), 1);
    assert_eq!(body["active"][0]["id"], "memory");
    assert_eq!(body["active"][0]["severity"], "critical");
    assert!(body["active"][0]["createdAt"].is_string());

    let history: Vec<(String, String)> = body["history"]
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| {
            (
                entry["id"].as_str().unwrap().to_string(),
                entry["status"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    assert_eq!(
        history,
        vec![
            ("disk".to_string(), "created".to_string()),
            ("memory".to_string(), "created".to_string()),
            ("disk".to_string(), "cleared".to_string()),
        ]
    );

    let (_, status) = get_json(addr, "/api/status").await;
    assert_eq!(status["healthy"], false);

    dashboard.stop().await.unwrap();
}

#[tokio::test]
async fn test_components_endpoint() {
    let (dashboard, addr) = start_dashboard().await;
    dashboard
        .register_component("swarm-b", "Swarm B", "swarm", FnSource::new(empty_metrics))
        .await
        .unwrap();
    dashboard
        .register_component("agents", "Agent pool", "agents", FnSource::new(empty_metrics))
        .await
        .unwrap();

    let (status, body) = get_json(addr, "/api/components").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([
            { "id": "agents", "name": "Agent pool", "type": "agents" },
            { "id": "swarm-b", "name": "Swarm B", "type": "swarm" },
        ])
    );

    dashboard.stop().await.unwrap();
}

#[tokio::test]
async fn test_index_page_is_served() {
    let (dashboard, addr) = start_dashboard().await;

    let response = reqwest::get(url(addr, "/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/html"));
    assert!(response.text().await.unwrap().contains("/ws"));

    dashboard.stop().await.unwrap();
}

#[tokio::test]
async fn test_static_dir_replaces_index() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<h1>custom viewer</h1>").unwrap();

    let config = swarm_dashboard::DashboardConfig {
        static_dir: Some(dir.path().to_path_buf()),
        ..test_config()
    };
    let dashboard = swarm_dashboard::Dashboard::new(config).unwrap();
    let addr = dashboard.start().await.unwrap();

    let body = reqwest::get(url(addr, "/")).await.unwrap().text().await.unwrap();
    assert_eq!(body, "<h1>custom viewer</h1>");

    dashboard.stop().await.unwrap();
}
