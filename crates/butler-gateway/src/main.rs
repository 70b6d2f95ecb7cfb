//! Binary entry point: wires config, persistence, the pipeline's shared
//! state, and every background task (stats bridge, automation scheduler,
//! rate-limit sweepers) behind one Axum server, grounded on
//! `skynet_gateway::main`'s startup sequence.

mod app;
mod auth;
mod http;
mod middleware;
mod rate_limit;
mod ws;

use std::net::SocketAddr;
use std::sync::Arc;

use butler_automation::{LiveActionDispatcher, SchedulerConfig, SchedulerEngine};
use butler_core::config::ButlerConfig;
use butler_events::StatsBridge;
use butler_persistence::Repositories;
use tokio::sync::watch;
use tracing::info;

use crate::app::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config_path = std::env::var("BUTLER_CONFIG").ok();
    let config = ButlerConfig::load(config_path.as_deref())?;
    info!(port = config.gateway.port, "starting butler gateway");

    let repos = Arc::new(Repositories::open(&config.database.path)?);
    let state = Arc::new(AppState::new(config.clone(), repos.clone()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let stats_bridge = StatsBridge::new(repos.clone(), state.clone());
    let events_for_stats = state.events.clone();
    let stats_handle = tokio::spawn(async move { stats_bridge.run(&events_for_stats).await });

    let dispatcher = Arc::new(LiveActionDispatcher::new(repos.clone(), state.registry.clone()));
    let scheduler = SchedulerEngine::new(repos.clone(), dispatcher, state.registry.clone(), SchedulerConfig::default());
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx.clone()));

    let auth_sweeper = state.auth_limiter.clone();
    let auth_sweeper_handle = tokio::spawn(auth_sweeper.run_sweeper());
    let general_sweeper = state.general_limiter.clone();
    let general_sweeper_handle = tokio::spawn(general_sweeper.run_sweeper());

    let router = app::build_router(state);
    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "butler gateway listening");

    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    stats_handle.abort();
    scheduler_handle.abort();
    auth_sweeper_handle.abort();
    general_sweeper_handle.abort();

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
