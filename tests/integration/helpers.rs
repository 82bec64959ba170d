//! Helper functions for integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use swarm_dashboard::{
    ComponentMetrics, Dashboard, DashboardConfig, MetricValue, MetricsSource,
    alerts::{AlertRule, Comparison, Severity},
};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound for anything the tests wait on
pub const WAIT: Duration = Duration::from_secs(5);

pub fn low_success_rule() -> AlertRule {
    AlertRule {
        id: "low-success".to_string(),
        category: "swarm".to_string(),
        metric: "successRate".to_string(),
        window: 3,
        threshold: 0.9,
        comparison: Comparison::Below,
        severity: Severity::Critical,
        message: "Swarm success rate dropped below 90%".to_string(),
    }
}

/// Port 0, a timer that never fires during a test, and one swarm rule
pub fn test_config() -> DashboardConfig {
    DashboardConfig {
        port: 0,
        update_interval_ms: 3_600_000,
        component_timeout_ms: 300,
        alerts: vec![low_success_rule()],
        ..DashboardConfig::default()
    }
}

pub async fn start_dashboard() -> (Dashboard, SocketAddr) {
    let dashboard = Dashboard::new(test_config()).unwrap();
    let addr = dashboard.start().await.unwrap();
    (dashboard, addr)
}

pub fn url(addr: SocketAddr, path: &str) -> String {
    format!("http://{addr}{path}")
}

pub async fn get_json(addr: SocketAddr, path: &str) -> (reqwest::StatusCode, Value) {
    let response = reqwest::get(url(addr, path)).await.unwrap();
    let status = response.status();
    (status, response.json().await.unwrap())
}

/// Connect and consume the `init` message
pub async fn connect(addr: SocketAddr) -> (WsClient, Value) {
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    let init = next_json(&mut ws).await;
    assert_eq!(init["type"], "init");
    (ws, init)
}

pub async fn send_json(ws: &mut WsClient, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

/// Next text frame as JSON, failing after [`WAIT`]
pub async fn next_json(ws: &mut WsClient) -> Value {
    tokio::time::timeout(WAIT, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
                Some(Ok(_)) => continue,
                other => panic!("connection ended while waiting for a message: {other:?}"),
            }
        }
    })
    .await
    .expect("timed out waiting for a message")
}

/// Skip messages until one of `message_type` arrives
pub async fn next_of_type(ws: &mut WsClient, message_type: &str) -> Value {
    loop {
        let message = next_json(ws).await;
        if message["type"] == message_type {
            return message;
        }
    }
}

/// Round-trip a ping so every earlier message from this client is applied
pub async fn sync(ws: &mut WsClient) {
    send_json(ws, json!({ "type": "ping" })).await;
    next_of_type(ws, "pong").await;
}

pub async fn subscribe(ws: &mut WsClient, channels: &[&str]) {
    send_json(ws, json!({ "type": "subscribe", "channels": channels })).await;
    sync(ws).await;
}

/// Assert that no text frame arrives within `within`
pub async fn expect_silence(ws: &mut WsClient, within: Duration) {
    let result = tokio::time::timeout(within, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return text,
                Some(Ok(_)) => continue,
                _ => std::future::pending::<()>().await,
            }
        }
    })
    .await;

    if let Ok(text) = result {
        panic!("expected no message, got {text}");
    }
}

/// Poll `check` until it returns true or [`WAIT`] elapses
pub async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    tokio::time::timeout(WAIT, async {
        while !check().await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Simulated swarm whose success rate the test controls
#[derive(Clone, Default)]
pub struct SwarmSim {
    success_rate_bits: Arc<AtomicU64>,
    active_agents: Arc<AtomicU64>,
}

impl SwarmSim {
    pub fn new(success_rate: f64, active_agents: u64) -> Self {
        let sim = Self::default();
        sim.set_success_rate(success_rate);
        sim.active_agents.store(active_agents, Ordering::SeqCst);
        sim
    }

    pub fn set_success_rate(&self, rate: f64) {
        self.success_rate_bits.store(rate.to_bits(), Ordering::SeqCst);
    }
}

#[async_trait]
impl MetricsSource for SwarmSim {
    async fn get_metrics(&self) -> anyhow::Result<ComponentMetrics> {
        let success_rate = f64::from_bits(self.success_rate_bits.load(Ordering::SeqCst));
        let active_agents = self.active_agents.load(Ordering::SeqCst);

        Ok(ComponentMetrics::from([
            ("successRate".to_string(), MetricValue::from(success_rate)),
            ("activeAgents".to_string(), MetricValue::from(active_agents)),
            (
                "tokens".to_string(),
                MetricValue::Object(
                    [
                        ("input".to_string(), MetricValue::from(1200u64)),
                        ("output".to_string(), MetricValue::from(300u64)),
                    ]
                    .into(),
                ),
            ),
        ]))
    }
}

/// Always fails
pub struct BrokenSource;

#[async_trait]
impl MetricsSource for BrokenSource {
    async fn get_metrics(&self) -> anyhow::Result<ComponentMetrics> {
        anyhow::bail!("coordinator unreachable")
    }
}

/// Never answers
pub struct HangingSource;

#[async_trait]
impl MetricsSource for HangingSource {
    async fn get_metrics(&self) -> anyhow::Result<ComponentMetrics> {
        std::future::pending().await
    }
}

/// Reports a value that cannot be stored
pub struct MalformedSource;

#[async_trait]
impl MetricsSource for MalformedSource {
    async fn get_metrics(&self) -> anyhow::Result<ComponentMetrics> {
        Ok(ComponentMetrics::from([(
            "queueDepth".to_string(),
            MetricValue::from(f64::NAN),
        )]))
    }
}
