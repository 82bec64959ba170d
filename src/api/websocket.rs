//! WebSocket handler for live dashboard updates
//!
//! ## Protocol
//!
//! - On connect the server sends `{type: "init", data: <snapshot>}`.
//! - `{type: "subscribe", channels}` / `{type: "unsubscribe", channels}`
//!   change which broadcasts the connection receives.
//! - `{type: "command", command: "snapshot"}` is answered with a
//!   `command-result` for this connection only.
//! - `{type: "ping"}` is answered with `{type: "pong"}`.
//! - Anything else gets `{type: "error", message}`; the connection stays up.

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use futures::{SinkExt, stream::StreamExt};
use tracing::{debug, info, trace};

use super::gateway::ClientId;
use super::state::DashboardState;
use super::types::{ClientMessage, SNAPSHOT_COMMAND, ServerMessage, SnapshotResult};

/// WebSocket upgrade handler
///
/// GET /ws
pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<DashboardState>) -> Response {
    ws.on_upgrade(|socket| handle_websocket(socket, state))
}

async fn handle_websocket(socket: WebSocket, state: DashboardState) {
    let (client_id, mut outbound) = state.gateway.register().await;
    info!("WebSocket client {client_id} connected");

    let snapshot = state.snapshot().await;
    state
        .gateway
        .send_to(client_id, &ServerMessage::Init { data: snapshot })
        .await;

    let (mut sender, mut receiver) = socket.split();

    // Drain the client's queue into the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let closing = matches!(message, Message::Close(_));
            if sender.send(message).await.is_err() {
                debug!("WebSocket send failed, client disconnected");
                break;
            }
            if closing {
                break;
            }
        }
    });

    let recv_state = state.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => handle_client_message(&recv_state, client_id, &text).await,
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    state.gateway.unregister(client_id).await;
    info!("WebSocket client {client_id} disconnected");
}

/// Apply one inbound text frame; replies go to `client_id` only
pub(crate) async fn handle_client_message(state: &DashboardState, client_id: ClientId, text: &str) {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            debug!("client {client_id} sent an invalid message: {e}");
            reply_error(state, client_id, format!("invalid message: {e}")).await;
            return;
        }
    };

    trace!("client {client_id} sent {message:?}");

    match message {
        ClientMessage::Subscribe { channels } => {
            state.gateway.subscribe(client_id, &channels).await;
        }
        ClientMessage::Unsubscribe { channels } => {
            state.gateway.unsubscribe(client_id, &channels).await;
        }
        ClientMessage::Command { command } if command == SNAPSHOT_COMMAND => {
            let result = SnapshotResult::from(state.snapshot().await);
            state
                .gateway
                .send_to(client_id, &ServerMessage::CommandResult { command, result })
                .await;
        }
        ClientMessage::Command { command } => {
            reply_error(state, client_id, format!("unknown command: {command}")).await;
        }
        ClientMessage::Ping => {
            state.gateway.send_to(client_id, &ServerMessage::Pong).await;
        }
    }
}

async fn reply_error(state: &DashboardState, client_id: ClientId, message: String) {
    state
        .gateway
        .send_to(client_id, &ServerMessage::Error { message })
        .await;
}
