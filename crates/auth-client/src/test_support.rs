//! Scripted collaborators shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use reqwest::StatusCode;
use session_auth::BoxFuture;
use tokio::sync::Notify;

use crate::error::TransportError;
use crate::terminator::{SessionExpiredHandler, TerminationReason};
use crate::transport::{RequestDescriptor, Transport, TransportResponse};

pub const API_BASE: &str = "http://api.test";
pub const REFRESH_URL: &str = "http://api.test/auth/refresh";

/// Records every signal it receives.
#[derive(Default)]
pub struct RecordingHandler {
    reasons: Mutex<Vec<TerminationReason>>,
    started: AtomicUsize,
}

impl RecordingHandler {
    pub fn expired_count(&self) -> usize {
        self.reasons.lock().unwrap().len()
    }

    pub fn started_count(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn reasons(&self) -> Vec<TerminationReason> {
        self.reasons.lock().unwrap().clone()
    }
}

impl SessionExpiredHandler for RecordingHandler {
    fn on_session_expired(&self, reason: TerminationReason) {
        self.reasons.lock().unwrap().push(reason);
    }

    fn on_session_started(&self) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
}

/// How the mock answers the next refresh exchange.
pub enum RefreshReply {
    /// 200 with new tokens. When `accepted`, `access` becomes the token the
    /// API accepts; otherwise the API keeps answering 401.
    Issue {
        access: String,
        refresh: Option<String>,
        accepted: bool,
    },
    Status(u16, String),
    TransportFailure,
    /// Never answers
    Hang,
    Panic,
}

impl RefreshReply {
    pub fn issue(access: &str, refresh: &str) -> Self {
        RefreshReply::Issue {
            access: access.to_string(),
            refresh: Some(refresh.to_string()),
            accepted: true,
        }
    }

    pub fn issue_unaccepted(access: &str, refresh: &str) -> Self {
        RefreshReply::Issue {
            access: access.to_string(),
            refresh: Some(refresh.to_string()),
            accepted: false,
        }
    }

    pub fn status(status: u16, body: &str) -> Self {
        RefreshReply::Status(status, body.to_string())
    }
}

/// In-process API plus refresh endpoint.
///
/// API routes (anything not at `REFRESH_URL`):
/// - `/boom` fails with a connection error
/// - `/status/{code}` answers `{code}` regardless of credentials
/// - anything else answers 200 `ok:{path}` when the bearer token matches the
///   currently valid token, 401 otherwise
pub struct MockTransport {
    valid_token: Mutex<String>,
    refresh_replies: Mutex<VecDeque<RefreshReply>>,
    refresh_gate: Mutex<Option<Arc<Notify>>>,
    refresh_calls: AtomicUsize,
    refresh_requests: Mutex<Vec<RequestDescriptor>>,
    requests: Mutex<Vec<RequestDescriptor>>,
}

impl MockTransport {
    pub fn new(valid_token: &str) -> Self {
        Self {
            valid_token: Mutex::new(valid_token.to_string()),
            refresh_replies: Mutex::new(VecDeque::new()),
            refresh_gate: Mutex::new(None),
            refresh_calls: AtomicUsize::new(0),
            refresh_requests: Mutex::new(Vec::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn push_refresh(&self, reply: RefreshReply) {
        self.refresh_replies.lock().unwrap().push_back(reply);
    }

    /// Make every refresh exchange wait for a permit on the returned `Notify`.
    pub fn gate_refresh(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.refresh_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// Stop accepting every token issued so far.
    pub fn expire_tokens(&self) {
        *self.valid_token.lock().unwrap() = "expired-everything".to_string();
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_requests(&self) -> Vec<RequestDescriptor> {
        self.refresh_requests.lock().unwrap().clone()
    }

    /// API calls received, in arrival order.
    pub fn requests(&self) -> Vec<RequestDescriptor> {
        self.requests.lock().unwrap().clone()
    }

    async fn refresh(&self, request: RequestDescriptor) -> Result<TransportResponse, TransportError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_requests.lock().unwrap().push(request);

        let gate = self.refresh_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let reply = self
            .refresh_replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| RefreshReply::status(500, "no scripted reply"));

        match reply {
            RefreshReply::Issue {
                access,
                refresh,
                accepted,
            } => {
                if accepted {
                    *self.valid_token.lock().unwrap() = access.clone();
                }
                let body = serde_json::json!({
                    "access_token": access,
                    "refresh_token": refresh,
                    "expires_in": 3600,
                });
                Ok(TransportResponse::new(StatusCode::OK, body.to_string()))
            }
            RefreshReply::Status(status, body) => Ok(TransportResponse::new(
                StatusCode::from_u16(status).unwrap(),
                body,
            )),
            RefreshReply::TransportFailure => {
                Err(TransportError::Connect("refresh endpoint unreachable".into()))
            }
            RefreshReply::Hang => std::future::pending().await,
            RefreshReply::Panic => panic!("scripted refresh panic"),
        }
    }

    fn api(&self, request: RequestDescriptor) -> Result<TransportResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let path = request.url.strip_prefix(API_BASE).unwrap_or(&request.url);

        if path == "/boom" {
            return Err(TransportError::Connect("connection refused".into()));
        }
        if let Some(code) = path.strip_prefix("/status/") {
            let status = StatusCode::from_u16(code.parse().unwrap()).unwrap();
            return Ok(TransportResponse::new(status, format!("status:{code}")));
        }

        let valid = self.valid_token.lock().unwrap().clone();
        if request.bearer_token() == Some(valid.as_str()) {
            Ok(TransportResponse::new(StatusCode::OK, format!("ok:{path}")))
        } else {
            Ok(TransportResponse::new(
                StatusCode::UNAUTHORIZED,
                r#"{"detail":"token expired"}"#,
            ))
        }
    }
}

impl Transport for MockTransport {
    fn send(
        &self,
        request: RequestDescriptor,
    ) -> BoxFuture<'_, Result<TransportResponse, TransportError>> {
        Box::pin(async move {
            if request.url == REFRESH_URL {
                self.refresh(request).await
            } else {
                self.api(request)
            }
        })
    }
}

/// Yield to the runtime until `condition` holds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}
