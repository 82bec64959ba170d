use std::path::PathBuf;

use async_trait::async_trait;
use clap::Parser;
use swarm_dashboard::{
    ComponentMetrics, Dashboard, DashboardConfig, MetricValue, MetricsSource,
    api::DashboardState,
};
use tracing::{info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file (TOML)
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Port to listen on, overrides the config file
    #[arg(long)]
    port: Option<u16>,

    /// Log at trace level instead of info
    #[arg(short, long)]
    verbose: bool,
}

fn init(verbose: bool) {
    let level = if verbose {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };
    let filter = filter::Targets::new().with_targets(vec![
        ("swarm_dashboard", level),
        ("dashboard", level),
        ("tower_http", level),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

/// Reports the dashboard's own load as the `dashboard` component
struct SelfMetrics {
    state: DashboardState,
}

#[async_trait]
impl MetricsSource for SelfMetrics {
    async fn get_metrics(&self) -> anyhow::Result<ComponentMetrics> {
        let clients = self.state.gateway.client_count().await;
        let series = self.state.metrics.len().await;
        let active_alerts = self.state.alerts.active_alerts().await.len();

        Ok(ComponentMetrics::from([
            ("connectedClients".to_string(), MetricValue::from(clients as u64)),
            ("series".to_string(), MetricValue::from(series as u64)),
            ("activeAlerts".to_string(), MetricValue::from(active_alerts as u64)),
        ]))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    let mut config = DashboardConfig::load(args.file.as_deref())?;
    config.apply_env();
    if let Some(port) = args.port {
        config.port = port;
    }

    let dashboard = Dashboard::new(config)?;
    dashboard
        .register_component(
            "dashboard",
            "Dashboard",
            "dashboard",
            SelfMetrics {
                state: dashboard.state().clone(),
            },
        )
        .await?;

    let addr = dashboard.start().await?;
    info!("open http://{addr} to view the dashboard");

    tokio::signal::ctrl_c().await?;
    info!("received ctrl-c, shutting down");

    dashboard.stop().await
}
