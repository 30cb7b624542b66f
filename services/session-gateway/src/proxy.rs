//! HTTP forwarding through the authenticated client
//!
//! Receives inbound requests, strips hop-by-hop headers and any caller
//! credentials, and sends them upstream through `AuthClient`, which owns the
//! bearer token and its refresh. Upstream responses come back verbatim
//! (including error statuses); client-side failures are mapped to JSON errors.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use auth_client::{AuthClient, Error, RequestDescriptor, TransportError, TransportResponse};
use axum::http::StatusCode;
use axum::http::header::{AUTHORIZATION, HOST};
use axum::response::{IntoResponse, Response};
use tracing::{error, instrument, warn};

/// Headers to strip before forwarding (hop-by-hop per RFC 2616 Section 13.5.1)
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Largest inbound body the gateway buffers.
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Shared state passed to the proxy handler via axum State extractor
#[derive(Clone)]
pub struct ProxyState {
    pub client: AuthClient,
    pub upstream_url: String,
    pub requests_total: Arc<AtomicU64>,
    pub errors_total: Arc<AtomicU64>,
    pub in_flight: Arc<AtomicU64>,
}

/// Decrements the in-flight counter when the request finishes, however it finishes.
struct InFlightGuard(Arc<AtomicU64>);

impl InFlightGuard {
    fn enter(counter: &Arc<AtomicU64>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter.clone())
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

/// JSON error body: {"error":{"type":"...","message":"...","request_id":"req_..."}}
pub fn error_response(
    status: StatusCode,
    error_type: &str,
    message: &str,
    request_id: &str,
) -> Response {
    let body = serde_json::json!({
        "error": {
            "type": error_type,
            "message": message,
            "request_id": request_id,
        }
    });
    (
        status,
        [(axum::http::header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

/// Forward an inbound request upstream with the session's credentials.
#[instrument(skip_all, fields(request_id = %request_id, method = %request.method(), path = %request.uri().path()))]
pub async fn proxy_request(
    state: &ProxyState,
    request: axum::http::Request<axum::body::Body>,
    request_id: String,
) -> Response {
    let _in_flight = InFlightGuard::enter(&state.in_flight);
    state.requests_total.fetch_add(1, Ordering::Relaxed);
    let started = Instant::now();
    let method = request.method().clone();

    let response = forward(state, request, &request_id).await;

    if response.status().is_server_error() || response.status() == StatusCode::BAD_REQUEST {
        state.errors_total.fetch_add(1, Ordering::Relaxed);
    }
    crate::metrics::record_request(
        response.status().as_u16(),
        method.as_str(),
        started.elapsed().as_secs_f64(),
    );
    response
}

async fn forward(
    state: &ProxyState,
    request: axum::http::Request<axum::body::Body>,
    request_id: &str,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    // Build the upstream URL by appending the request path and query
    let upstream_url = if let Some(pq) = uri.path_and_query() {
        format!("{}{}", state.upstream_url.trim_end_matches('/'), pq)
    } else {
        state.upstream_url.clone()
    };

    let mut headers = reqwest::header::HeaderMap::new();
    for (name, value) in request.headers() {
        if !is_hop_by_hop(name.as_str()) && name != AUTHORIZATION && name != HOST {
            headers.append(name.clone(), value.clone());
        }
    }

    let body = match axum::body::to_bytes(request.into_body(), MAX_BODY_BYTES).await {
        Ok(b) => b,
        Err(e) => {
            warn!(error = %e, "failed to read request body");
            return error_response(
                StatusCode::BAD_REQUEST,
                "invalid_request",
                &format!("invalid request body: {e}"),
                request_id,
            );
        }
    };

    let descriptor = RequestDescriptor {
        method,
        url: upstream_url,
        headers,
        body,
    };

    match state.client.execute(descriptor).await {
        Ok(response) => upstream_response(response, request_id),
        Err(Error::NoRefreshAvailable(response)) | Err(Error::RetryExhausted(response)) => {
            warn!("upstream rejected the session's credentials");
            upstream_response(response, request_id)
        }
        Err(Error::RefreshFailed(e)) => {
            warn!(error = %e, "session expired while refreshing credentials");
            error_response(
                StatusCode::UNAUTHORIZED,
                "session_expired",
                &e.to_string(),
                request_id,
            )
        }
        Err(Error::Transport(e)) => {
            crate::metrics::record_upstream_error(e.kind());
            error!(error = %e, "upstream request failed");
            let status = match e {
                TransportError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                _ => StatusCode::BAD_GATEWAY,
            };
            error_response(status, "upstream_error", &e.to_string(), request_id)
        }
    }
}

/// Rebuild an upstream response for the inbound caller, dropping hop-by-hop headers.
fn upstream_response(upstream: TransportResponse, request_id: &str) -> Response {
    let mut response = Response::builder().status(upstream.status);
    for (name, value) in &upstream.headers {
        if !is_hop_by_hop(name.as_str()) {
            response = response.header(name, value);
        }
    }
    response
        .body(axum::body::Body::from(upstream.body))
        .unwrap_or_else(|e| {
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "gateway_error",
                &format!("response build error: {e}"),
                request_id,
            )
        })
}

/// Check if a header is hop-by-hop (should be stripped before forwarding)
pub fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS
        .iter()
        .any(|h| h.eq_ignore_ascii_case(name))
}
