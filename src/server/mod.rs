//! HTTP surface for the billing functions.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tokio::signal::ctrl_c;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tracing::{error, info};

use crate::config::Config;
use crate::service::Services;

mod guard;
pub mod routes;

pub use guard::{INVOICE_SIGNATURE_HEADER, RequestGuard, SIGNATURE_HEADER, TIMESTAMP_HEADER};

const LIMITER_CLEANUP_EVERY: Duration = Duration::from_secs(60);
const LIMITER_HORIZON: Duration = Duration::from_secs(5 * 60);

#[derive(Clone)]
pub struct AppState {
    pub services: Services,
    pub guard: Arc<RequestGuard>,
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/functions/generate-invoice", post(routes::generate_invoice))
        .route("/functions/resend-invoice", post(routes::resend_invoice))
        .route("/functions/get-logs", post(routes::get_logs))
        .route("/health", get(routes::health))
        .with_state(state)
}

pub async fn start_server(config: &Config, services: Services) -> anyhow::Result<()> {
    let guard = Arc::new(RequestGuard::from_config(config)?);
    let cleanup = guard.limiter().spawn_cleanup(LIMITER_CLEANUP_EVERY, LIMITER_HORIZON);

    if config.hmac_secret.is_none() {
        info!("HMAC_SECRET not set, request signatures are not checked");
    }

    let app = build_router(AppState { services, guard });

    info!("Binding to {}", config.bind_address);
    let listener = TcpListener::bind(&config.bind_address).await?;
    info!("Server running on {}", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    cleanup.abort();
    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => error!(error = %e, "failed to listen for Ctrl+C"),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
