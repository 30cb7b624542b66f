//! Session Gateway
//!
//! Single-binary service that:
//! 1. Holds one user session (access + refresh token)
//! 2. Forwards every inbound request upstream with the session's bearer token
//! 3. Refreshes the token once when upstream answers 401, however many
//!    requests fail together, and replays them
//! 4. Ends the session (and reports unauthenticated) when refresh is impossible

mod admin;
mod config;
mod metrics;
mod proxy;
mod session;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use auth_client::{AuthClient, AuthClientConfig, ReqwestTransport};
use metrics_exporter_prometheus::PrometheusHandle;
use session_auth::{CredentialStore, FileCredentialStore, MemoryCredentialStore};

use crate::admin::{AdminState, build_admin_router};
use crate::config::Config;
use crate::proxy::ProxyState;
use crate::session::SessionStatus;

/// How long in-flight requests may run after a shutdown signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared application state accessible from all handlers
#[derive(Clone)]
struct AppState {
    proxy: ProxyState,
    session: Arc<SessionStatus>,
    started_at: Instant,
    prometheus: PrometheusHandle,
}

/// Build the main axum router. `max_connections` bounds concurrent requests.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .fallback(proxy_handler)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

/// Open the configured credential store. No path means memory only.
async fn open_store(config: &Config) -> Result<Arc<dyn CredentialStore>> {
    match &config.session.credentials_path {
        Some(path) => {
            let store = FileCredentialStore::load(path.clone())
                .await
                .with_context(|| format!("failed to open credentials at {}", path.display()))?;
            info!(path = %store.path().display(), "using file credential store");
            Ok(Arc::new(store))
        }
        None => {
            warn!("no credentials_path configured, session will not survive restarts");
            Ok(Arc::new(MemoryCredentialStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting session-gateway");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.gateway.listen_addr,
        admin_addr = %config.gateway.admin_addr,
        upstream_url = %config.gateway.upstream_url,
        refresh_url = %config.session.refresh_url,
        "configuration loaded"
    );

    let store = open_store(&config).await?;
    let active = store
        .get()
        .await
        .is_some_and(|pair| pair.has_access_token() || pair.has_refresh_token());
    let session = Arc::new(SessionStatus::new(config.session.login_url.clone(), active));
    if !active {
        warn!(
            login_url = session.login_url().unwrap_or("<not configured>"),
            "no stored session, POST /admin/session to sign in"
        );
    }

    let transport = ReqwestTransport::new(reqwest::Client::new(), config.gateway.timeout());
    let client = AuthClient::new(
        AuthClientConfig::new(config.session.refresh_url.clone())
            .with_refresh_timeout(config.session.refresh_timeout()),
        Arc::new(transport),
        store,
        session.clone(),
    );

    let in_flight = Arc::new(AtomicU64::new(0));
    let app_state = AppState {
        proxy: ProxyState {
            client: client.clone(),
            upstream_url: config.gateway.upstream_url.clone(),
            requests_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
            in_flight: in_flight.clone(),
        },
        session: session.clone(),
        started_at: Instant::now(),
        prometheus: prometheus_handle,
    };

    let app = build_router(app_state, config.gateway.max_connections);
    let admin_app = build_admin_router(AdminState::new(client, session));

    let listener = TcpListener::bind(config.gateway.listen_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.gateway.listen_addr))?;
    let admin_listener = TcpListener::bind(config.gateway.admin_addr)
        .await
        .with_context(|| format!("failed to bind admin to {}", config.gateway.admin_addr))?;

    info!(
        addr = %config.gateway.listen_addr,
        admin_addr = %config.gateway.admin_addr,
        "accepting requests"
    );

    // Both listeners drain on the same signal; DRAIN_TIMEOUT starts at signal receipt.
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let server_handle = tokio::spawn(serve(listener, app, shutdown_rx.clone()));
    let admin_handle = tokio::spawn(serve(admin_listener, admin_app, shutdown_rx));

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    match tokio::time::timeout(DRAIN_TIMEOUT, async {
        let _ = admin_handle.await;
        server_handle.await
    })
    .await
    {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            let remaining = in_flight.load(Ordering::Relaxed);
            warn!(
                remaining,
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

async fn serve(
    listener: TcpListener,
    app: Router,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> std::io::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
}

/// Health endpoint: 200 while the session is usable, 503 `unauthenticated`
/// once it has ended and nobody has signed in again.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.started_at.elapsed().as_secs();
    let requests = state.proxy.requests_total.load(Ordering::Relaxed);
    let errors = state.proxy.errors_total.load(Ordering::Relaxed);

    let (status_code, body) = if state.session.is_active() {
        (
            axum::http::StatusCode::OK,
            serde_json::json!({
                "status": "healthy",
                "session": "active",
                "refresh_state": state.proxy.client.refresh_state().label(),
                "uptime_seconds": uptime,
                "requests_served": requests,
                "errors_total": errors,
            }),
        )
    } else {
        (
            axum::http::StatusCode::SERVICE_UNAVAILABLE,
            serde_json::json!({
                "status": "unauthenticated",
                "session": "ended",
                "login_url": state.session.login_url(),
                "uptime_seconds": uptime,
                "requests_served": requests,
                "errors_total": errors,
            }),
        )
    };

    (
        status_code,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        axum::http::StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.prometheus.render(),
    )
}

/// Catch-all handler that forwards all other requests upstream.
async fn proxy_handler(
    State(state): State<AppState>,
    request: axum::http::Request<axum::body::Body>,
) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    proxy::proxy_request(&state.proxy, request, request_id).await
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
