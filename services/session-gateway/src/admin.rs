//! Admin API for the gateway's session
//!
//! Runs on a separate listener (default 127.0.0.1:9090) and is the only way
//! credentials enter or leave the gateway. Tokens are accepted here but never
//! returned.
//!
//! Endpoints:
//! - POST   /admin/session: store credentials from a completed login
//! - DELETE /admin/session: end the session (logout)
//! - GET    /admin/session: session status and refresh statistics

use std::sync::Arc;

use auth_client::AuthClient;
use axum::Router;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Json;
use serde::Deserialize;
use session_auth::{CredentialPair, now_millis};
use tracing::{error, info};

use crate::session::SessionStatus;

/// Shared state for admin API handlers.
#[derive(Clone)]
pub struct AdminState {
    client: AuthClient,
    session: Arc<SessionStatus>,
}

impl AdminState {
    pub fn new(client: AuthClient, session: Arc<SessionStatus>) -> Self {
        Self { client, session }
    }
}

/// Build the admin axum router.
pub fn build_admin_router(state: AdminState) -> Router {
    Router::new()
        .route(
            "/admin/session",
            get(session_status).post(login).delete(logout),
        )
        .with_state(state)
}

/// Request body for POST /admin/session.
///
/// Expiries are absolute unix milliseconds. When omitted they are read from
/// the tokens' `exp` claims if the tokens are JWTs.
#[derive(Debug, Deserialize)]
struct LoginRequest {
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    access_expires: Option<u64>,
    #[serde(default)]
    refresh_expires: Option<u64>,
}

impl LoginRequest {
    fn into_pair(self) -> CredentialPair {
        let mut pair = CredentialPair::from_tokens(self.access_token, self.refresh_token);
        if let Some(expires) = self.access_expires {
            pair.access_expires = expires;
        }
        if let Some(expires) = self.refresh_expires {
            pair.refresh_expires = expires;
        }
        pair
    }
}

fn json_response(status: StatusCode, body: serde_json::Value) -> axum::response::Response {
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

fn admin_error(status: StatusCode, message: &str) -> axum::response::Response {
    json_response(
        status,
        serde_json::json!({
            "error": {
                "type": "admin_error",
                "message": message,
            }
        }),
    )
}

/// POST /admin/session: store a new credential pair and mark the session active.
async fn login(
    State(state): State<AdminState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(request) = match payload {
        Ok(request) => request,
        Err(rejection) => {
            return admin_error(StatusCode::BAD_REQUEST, &rejection.body_text());
        }
    };

    if request.access_token.trim().is_empty() {
        return admin_error(StatusCode::BAD_REQUEST, "access_token must not be empty");
    }

    let pair = request.into_pair();
    let has_refresh_token = pair.has_refresh_token();
    let access_expires = pair.access_expires;

    if let Err(e) = state.client.login(pair).await {
        error!(error = %e, "failed to store credentials");
        return admin_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("failed to store credentials: {e}"),
        );
    }

    info!(has_refresh_token, "credentials stored via admin API");

    json_response(
        StatusCode::OK,
        serde_json::json!({
            "status": "active",
            "has_refresh_token": has_refresh_token,
            "access_expires": access_expires,
        }),
    )
}

/// DELETE /admin/session: clear credentials and signal session end.
async fn logout(State(state): State<AdminState>) -> impl IntoResponse {
    state.client.logout().await;
    info!("session ended via admin API");

    json_response(StatusCode::OK, serde_json::json!({ "status": "ended" }))
}

/// GET /admin/session: session status. Never exposes tokens.
async fn session_status(State(state): State<AdminState>) -> impl IntoResponse {
    let credentials = state.client.credentials().await;
    let claims = state.client.access_claims().await;
    let now = now_millis();

    let body = serde_json::json!({
        "active": state.session.is_active(),
        "has_access_token": credentials.as_ref().is_some_and(|p| p.has_access_token()),
        "has_refresh_token": credentials.as_ref().is_some_and(|p| p.has_refresh_token()),
        "access_expires": credentials.as_ref().map(|p| p.access_expires),
        "access_expired": credentials.as_ref().is_some_and(|p| p.access_expired(now)),
        "refresh_expires": credentials.as_ref().map(|p| p.refresh_expires),
        "subject": claims.as_ref().and_then(|c| c.subject()),
        "refresh_state": state.client.refresh_state().label(),
        "refresh_cycles": state.client.refresh_cycles(),
        "pending_waiters": state.client.pending_waiters(),
        "login_url": state.session.login_url(),
    });

    json_response(StatusCode::OK, body)
}
