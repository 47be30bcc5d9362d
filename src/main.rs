//! Process entrypoint: load configuration, build the component graph, and
//! serve the combined HTTP + WebSocket listener (spec §6).
//!
//! Tracing setup follows the teacher's `main.rs` (`FmtSubscriber`-style
//! initialization via `tracing-subscriber`).

use matchmaking_broker::server::{build_router, spawn_background_tasks, AppState};
use matchmaking_broker::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    tracing::info!(
        port = config.port,
        distributed = config.is_distributed(),
        "starting matchmaking broker"
    );

    let state = AppState::build(config.clone()).await?;
    spawn_background_tasks(state.clone());

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, router).await?;

    Ok(())
}
