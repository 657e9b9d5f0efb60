use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use delivery_tracker::error::AppError;
use delivery_tracker::{api, config, jobs, state};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = config::Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false)
        .compact()
        .init();

    let shared_state = Arc::new(state::AppState::new(config.clone()));
    let restored = shared_state.sessions.restore().await?;

    tracing::info!(
        active_sessions = restored,
        geofence_radius_meters = config.geofence_radius_meters,
        customer_delay_minutes = config.customer_delay_minutes,
        "tracking state ready"
    );

    tokio::spawn(jobs::cleanup::run_cleanup_job(shared_state.clone()));

    let app = api::rest::router(shared_state.clone());

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(http_port = config.http_port, "http server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
