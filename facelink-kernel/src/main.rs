/**
 * FACELINK KERNEL - Point d'entrée du service de synchronisation
 *
 * RÔLE : Bootstrap config, registre des devices, health et API HTTP.
 * L'UI opérateur et le device ne se parlent jamais directement : tout passe
 * par ici (files de commandes, dernier status, dernier résultat).
 *
 * ÉTAT : tout en mémoire, perdu au redémarrage.
 */

mod config;
mod devices;
mod error;
mod health;
mod http;
mod models;
mod queue;
mod state;
mod store;

use crate::config::load_config;
use crate::http::{build_router, AppState};
use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env optionnel
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cfg = load_config().await;
    let addr = cfg.bind_addr();
    let health_log_secs = cfg.health_log_secs;
    let auth = cfg.api_key.is_some();

    let app_state = AppState::new(cfg);
    app_state
        .health_tracker
        .spawn_health_logger(app_state.devices.clone(), health_log_secs);

    tracing::info!(
        default_device = %app_state.devices.default_device(),
        auth,
        "kernel starting"
    );

    let app = build_router(app_state);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    tracing::info!(addr = %addr, "HTTP listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server")?;

    tracing::info!("kernel stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "ctrl-c handler failed");
    }
}
