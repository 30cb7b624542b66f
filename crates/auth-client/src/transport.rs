//! Outbound call abstraction
//!
//! The client never talks to reqwest directly: it hands a `RequestDescriptor`
//! to a `Transport` and gets a `TransportResponse` back. That keeps the
//! refresh machinery testable with scripted transports, and lets the refresh
//! exchange travel the same path as every other call.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use session_auth::BoxFuture;

use crate::error::TransportError;

/// Prefix of the Authorization header value carrying an access token.
pub const BEARER_PREFIX: &str = "Bearer ";

/// Everything needed to send (and resend) one call.
///
/// Cheap to clone: the body is reference-counted.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl RequestDescriptor {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Token from an `Authorization: Bearer` header, if one is attached.
    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix(BEARER_PREFIX))
    }
}

/// Response to one call, fully buffered.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TransportResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

/// Performs one outbound call.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn Transport>`).
/// Implementations own timeouts; a timed-out call is a `TransportError::Timeout`.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: RequestDescriptor,
    ) -> BoxFuture<'_, std::result::Result<TransportResponse, TransportError>>;
}

/// Transport backed by a shared `reqwest::Client` with a per-call timeout.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

impl Transport for ReqwestTransport {
    fn send(
        &self,
        request: RequestDescriptor,
    ) -> BoxFuture<'_, std::result::Result<TransportResponse, TransportError>> {
        Box::pin(async move {
            let response = self
                .client
                .request(request.method, &request.url)
                .headers(request.headers)
                .timeout(self.timeout)
                .body(request.body)
                .send()
                .await
                .map_err(classify_send_error)?;

            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(|e| {
                if e.is_timeout() {
                    TransportError::Timeout(e.to_string())
                } else {
                    TransportError::Body(e.to_string())
                }
            })?;

            Ok(TransportResponse {
                status,
                headers,
                body,
            })
        })
    }
}

fn classify_send_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}
