//! HTTP query API and WebSocket gateway
//!
//! Both surfaces read from the same [`DashboardState`], so the HTTP view and
//! the live view never diverge.
//!
//! ## Endpoints
//!
//! - `GET /` - Viewer page (built in, or `static_dir` if configured)
//! - `GET /api/health` - Liveness check
//! - `GET /api/status` - Overall status
//! - `GET /api/metrics/:category` - Series summaries for one category
//! - `GET /api/alerts` - Active alerts and history
//! - `GET /api/components` - Registered components
//! - `WS /ws` - Live updates, see [`websocket`]

pub mod error;
pub mod gateway;
pub mod routes;
pub mod state;
pub mod types;
pub mod websocket;

pub use error::{ApiError, ApiResult};
pub use gateway::{ALERTS_CHANNEL, ClientId, Gateway};
pub use state::DashboardState;
pub use types::{
    ClientMessage, DashboardSnapshot, DashboardStatus, HealthResponse, MetricsResponse,
    ServerMessage, SnapshotResult, SystemMetricsPayload,
};

use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;
use axum::{Router, routing::get};
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::DashboardConfig;

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Bind address (e.g., "0.0.0.0:8080")
    pub bind_addr: SocketAddr,

    /// Enable CORS for browser clients on other origins
    pub enable_cors: bool,

    /// Directory served at `/` instead of the built-in page
    pub static_dir: Option<PathBuf>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self::from(&DashboardConfig::default())
    }
}

impl From<&DashboardConfig> for ApiConfig {
    fn from(config: &DashboardConfig) -> Self {
        Self {
            bind_addr: config.socket_addr(),
            enable_cors: config.enable_cors,
            static_dir: config.static_dir.clone(),
        }
    }
}

/// Build the router with all routes
pub fn router(config: &ApiConfig, state: DashboardState) -> Router {
    let mut app = Router::new()
        .route("/api/health", get(routes::health::health_check))
        .route("/api/status", get(routes::status::get_status))
        .route("/api/metrics/:category", get(routes::metrics::get_category))
        .route("/api/alerts", get(routes::alerts::list_alerts))
        .route("/api/components", get(routes::components::list_components))
        .route("/ws", get(websocket::websocket_handler));

    app = match &config.static_dir {
        Some(dir) => {
            info!("serving dashboard assets from {}", dir.display());
            app.fallback_service(ServeDir::new(dir))
        }
        None => app.route("/", get(routes::index::index)),
    };

    let mut app = app.with_state(state).layer(TraceLayer::new_for_http());

    if config.enable_cors {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }

    app
}

/// Spawn the API server
///
/// The listener is bound before this returns, so the returned address is
/// ready to accept connections. The server stops once `shutdown` resolves;
/// the returned handle completes after the listening socket is released.
pub async fn spawn_api_server<F>(
    config: ApiConfig,
    state: DashboardState,
    shutdown: F,
) -> anyhow::Result<(SocketAddr, JoinHandle<()>)>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!("starting API server on {}", config.bind_addr);

    let app = router(&config, state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    let addr = listener.local_addr()?;

    info!("API server listening on {}", addr);

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!("API server error: {}", e);
        }
        info!("API server on {addr} stopped");
    });

    Ok((addr, server))
}
