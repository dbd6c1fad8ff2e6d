use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tokio::net::TcpListener;
use tracing::{info, warn};
use webagent_kernel::llm::build_llm_provider;
use webagent_kernel::{
    build_orchestrator, build_router, spawn_session_sweeper, Config, ServeHealth, ServeState,
};

#[derive(Args, Clone)]
pub struct ServeArgs {
    /// Interface to bind (defaults to server.host from the config)
    #[arg(long)]
    pub host: Option<IpAddr>,

    /// Port to listen on (defaults to server.port from the config)
    #[arg(long)]
    pub port: Option<u16>,

    /// Model name override for this run
    #[arg(long)]
    pub model: Option<String>,
}

pub async fn cmd_serve(args: ServeArgs, mut config: Config) -> Result<()> {
    if let Some(model) = args.model.clone() {
        config.llm.model = model;
    }
    let host = match args.host {
        Some(host) => host,
        None => config
            .server
            .host
            .parse()
            .with_context(|| format!("invalid server.host '{}'", config.server.host))?,
    };
    let port = args.port.unwrap_or(config.server.port);

    let provider = build_llm_provider(&config).context("failed to configure model backend")?;
    let orchestrator = Arc::new(
        build_orchestrator(&config, provider).context("invalid agent configuration")?,
    );
    let health = Arc::new(ServeHealth::default());
    let state = ServeState::with_health(Arc::clone(&orchestrator), Arc::clone(&health));

    let _sweeper = spawn_session_sweeper(
        Arc::clone(&orchestrator),
        Duration::from_secs(config.server.sweep_interval_secs),
        config.agent.session_grace(),
    );

    let addr = SocketAddr::new(host, port);
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind step server on {}", addr))?;
    info!("Step server available at http://{}:{}", addr.ip(), port);
    if host.is_unspecified() {
        info!(
            "Listening on all interfaces; try http://127.0.0.1:{} locally",
            port
        );
    }
    info!(
        model = %config.llm.model,
        max_steps = config.agent.max_steps,
        "Server starting, waiting for requests..."
    );

    health.mark_live();
    health.mark_ready();
    let router = build_router(state);
    let served = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("step server exited unexpectedly");
    health.mark_unready("shutting down");
    served
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested; draining in-flight steps"),
        Err(err) => warn!(?err, "failed to listen for ctrl-c"),
    }
}
