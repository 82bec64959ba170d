//! Integration tests for the WebSocket gateway
//!
//! These tests verify that:
//! - Every connection starts with a consistent `init` snapshot
//! - Broadcasts only reach clients subscribed to their channel
//! - Commands and errors are answered to the sender only
//! - Connections are tracked from connect to disconnect and closed on stop

use std::time::Duration;

use futures::StreamExt;
use pretty_assertions::assert_eq;
use serde_json::{Map, Value, json};
use swarm_dashboard::alerts::Severity;
use tokio_tungstenite::tungstenite::Message;

use crate::helpers::*;

fn ids(values: &Value) -> Vec<String> {
    values
        .as_array()
        .unwrap()
        .iter()
        .map(|value| value["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn test_init_message_on_connect() {
    let (dashboard, addr) = start_dashboard().await;
    dashboard.tick_now().await.unwrap();

    let (_ws, init) = connect(addr).await;
    let data = &init["data"];

    assert_eq!(data["status"]["healthy"], true);
    assert!(data["metrics"]["system"]["cpu"]["latest"].is_number());
    assert_eq!(data["components"], json!([]));
    assert_eq!(data["alerts"], json!({ "active": [], "history": [] }));

    dashboard.stop().await.unwrap();
}

#[tokio::test]
async fn test_init_matches_status_endpoint() {
    let (dashboard, addr) = start_dashboard().await;
    dashboard
        .register_component("swarm-1", "Swarm", "swarm", SwarmSim::new(1.0, 3))
        .await
        .unwrap();
    dashboard
        .state()
        .alerts
        .create_alert("memory", Severity::Critical, "out of memory", Map::new())
        .await;

    let (_ws, init) = connect(addr).await;
    let (_, status) = get_json(addr, "/api/status").await;

    let snapshot_status = &init["data"]["status"];
    assert_eq!(ids(&snapshot_status["alerts"]), ids(&status["alerts"]));
    assert_eq!(snapshot_status["components"], status["components"]);
    assert_eq!(snapshot_status["healthy"], status["healthy"]);
    assert_eq!(init["data"]["components"], status["components"]);
    assert_eq!(ids(&init["data"]["alerts"]["active"]), vec!["memory".to_string()]);

    dashboard.stop().await.unwrap();
}

#[tokio::test]
async fn test_broadcast_scoping() {
    let (dashboard, addr) = start_dashboard().await;

    let (mut system_client, _) = connect(addr).await;
    let (mut alerts_client, _) = connect(addr).await;
    subscribe(&mut system_client, &["system"]).await;
    subscribe(&mut alerts_client, &["alerts"]).await;

    dashboard.tick_now().await.unwrap();

    let update = next_json(&mut system_client).await;
    assert_eq!(update["type"], "system-metrics");
    assert!(update["data"]["cpu"].is_number());
    assert!(update["data"]["timestamp"].is_i64());
    expect_silence(&mut alerts_client, Duration::from_millis(200)).await;

    dashboard
        .state()
        .alerts
        .create_alert("manual", Severity::Info, "operator note", Map::new())
        .await;

    let alert = next_json(&mut alerts_client).await;
    assert_eq!(alert["type"], "alert-created");
    assert_eq!(alert["data"]["id"], "manual");
    expect_silence(&mut system_client, Duration::from_millis(200)).await;

    dashboard.stop().await.unwrap();
}

#[tokio::test]
async fn test_subscriptions_accumulate_and_unsubscribe() {
    let (dashboard, addr) = start_dashboard().await;

    let (mut ws, _) = connect(addr).await;
    subscribe(&mut ws, &["system"]).await;
    subscribe(&mut ws, &["alerts"]).await;

    dashboard.tick_now().await.unwrap();
    assert_eq!(next_json(&mut ws).await["type"], "system-metrics");

    send_json(&mut ws, json!({ "type": "unsubscribe", "channels": ["system"] })).await;
    sync(&mut ws).await;

    dashboard.tick_now().await.unwrap();
    dashboard
        .state()
        .alerts
        .create_alert("manual", Severity::Info, "still subscribed", Map::new())
        .await;

    assert_eq!(next_json(&mut ws).await["type"], "alert-created");

    dashboard.stop().await.unwrap();
}

#[tokio::test]
async fn test_snapshot_command() {
    let (dashboard, addr) = start_dashboard().await;
    dashboard
        .register_component("swarm-1", "Swarm", "swarm", SwarmSim::new(1.0, 3))
        .await
        .unwrap();
    dashboard.tick_now().await.unwrap();

    let (mut ws, _) = connect(addr).await;
    let (mut bystander, _) = connect(addr).await;

    send_json(&mut ws, json!({ "type": "command", "command": "snapshot" })).await;
    let reply = next_json(&mut ws).await;

    assert_eq!(reply["type"], "command-result");
    assert_eq!(reply["command"], "snapshot");
    assert_eq!(reply["result"]["metrics"]["swarm"]["activeAgents"]["latest"], 3.0);
    assert_eq!(ids(&reply["result"]["components"]), vec!["swarm-1".to_string()]);
    assert!(reply["result"]["alerts"]["active"].is_array());

    expect_silence(&mut bystander, Duration::from_millis(200)).await;

    dashboard.stop().await.unwrap();
}

#[tokio::test]
async fn test_malformed_message_keeps_connection_open() {
    let (dashboard, addr) = start_dashboard().await;
    let (mut ws, _) = connect(addr).await;

    ws_send_raw(&mut ws, "definitely not json").await;
    let error = next_json(&mut ws).await;
    assert_eq!(error["type"], "error");
    assert!(error["message"].is_string());

    send_json(&mut ws, json!({ "type": "command", "command": "self-destruct" })).await;
    let error = next_json(&mut ws).await;
    assert_eq!(error["type"], "error");
    assert_eq!(error["message"], "unknown command: self-destruct");

    sync(&mut ws).await;
    assert_eq!(dashboard.state().gateway.client_count().await, 1);

    dashboard.stop().await.unwrap();
}

async fn ws_send_raw(ws: &mut WsClient, text: &str) {
    use futures::SinkExt;
    ws.send(Message::Text(text.to_string())).await.unwrap();
}

#[tokio::test]
async fn test_connection_lifecycle() {
    let (dashboard, addr) = start_dashboard().await;
    let gateway = dashboard.state().gateway.clone();

    let mut clients = vec![];
    for _ in 0..10 {
        clients.push(connect(addr).await.0);
    }
    assert_eq!(gateway.client_count().await, 10);

    for mut ws in clients {
        ws.close(None).await.unwrap();
    }

    wait_until(|| {
        let gateway = gateway.clone();
        async move { gateway.client_count().await == 0 }
    })
    .await;

    dashboard.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_closes_every_client() {
    let (dashboard, addr) = start_dashboard().await;

    let mut clients = vec![];
    for _ in 0..3 {
        clients.push(connect(addr).await.0);
    }

    dashboard.stop().await.unwrap();
    assert_eq!(dashboard.state().gateway.client_count().await, 0);

    for mut ws in clients {
        let ended = tokio::time::timeout(WAIT, async {
            loop {
                match ws.next().await {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => continue,
                }
            }
        })
        .await;
        assert!(ended.is_ok(), "client was not disconnected");
    }
}
