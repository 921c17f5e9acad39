//! CivicStake API server
//!
//! Citizens stake civic points on public questions to politicians. This binary serves:
//! - Supabase-backed registration and login
//! - Questions, bounties and escrow, answers and staker votes
//! - The politician leaderboard, rated with a Plackett-Luce model
//! - A background sweep that refunds bounties on expired questions

mod app;
mod config;
mod http;
mod services;
mod store;
mod util;

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::AppState;
use crate::config::Config;
use crate::http::build_router;
use crate::services::escrow::run_refund_sweeper;
use crate::util::time::init_server_time;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level, config.log_json);

    // Initialize server time tracking
    init_server_time();

    info!("Starting CivicStake API");
    info!("Server address: {}", config.server_addr);

    if !config.supabase_configured() {
        warn!("SUPABASE_URL / SUPABASE_ANON_KEY not set, database calls will fail");
    }
    if !config.ai_configured() {
        warn!("GEMINI_API_KEY not set, answers get a neutral directness score");
    }

    // Create application state
    let state = AppState::new(config.clone());

    // Spawn the escrow refund sweep
    if config.escrow_sweep_interval_secs > 0 {
        let escrow = state.escrow.clone();
        let interval = config.escrow_sweep_interval_secs;
        tokio::spawn(async move {
            run_refund_sweeper(escrow, interval).await;
        });
    } else {
        info!("Escrow refund sweep disabled");
    }

    // Build router
    let router = build_router(state);

    // Start server
    let addr: SocketAddr = config.server_addr;
    let listener = TcpListener::bind(addr).await?;

    info!("Server listening on {}", addr);
    info!("Health check: http://{}/health", addr);
    info!("API docs: http://{}/docs", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str, json: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init();
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        }
    }
}
