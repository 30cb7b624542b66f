//! Authorization-failure recovery around each dispatched call

use std::sync::Arc;

use reqwest::StatusCode;
use session_auth::CredentialStore;
use tracing::{debug, info, warn};

use crate::augmenter::RequestAugmenter;
use crate::coordinator::RefreshCoordinator;
use crate::error::{Error, Result};
use crate::terminator::{SessionTerminator, TerminationReason};
use crate::transport::{RequestDescriptor, Transport, TransportResponse};

/// Whether a response means the access token was not accepted.
pub fn is_authorization_failure(response: &TransportResponse) -> bool {
    response.status == StatusCode::UNAUTHORIZED
}

/// Sends a call, and on its first 401 refreshes credentials and replays it once.
///
/// Outcomes:
/// - anything but 401: returned as-is
/// - 401, no refresh token stored: session terminated, `Error::NoRefreshAvailable`
/// - 401, refresh fails: `Error::RefreshFailed` with the refresh error (not the 401)
/// - 401 again on the replay: `Error::RetryExhausted`
pub struct ResponseGuardian {
    augmenter: RequestAugmenter,
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    coordinator: Arc<RefreshCoordinator>,
    terminator: Arc<SessionTerminator>,
}

impl ResponseGuardian {
    pub fn new(
        augmenter: RequestAugmenter,
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        coordinator: Arc<RefreshCoordinator>,
        terminator: Arc<SessionTerminator>,
    ) -> Self {
        Self {
            augmenter,
            transport,
            store,
            coordinator,
            terminator,
        }
    }

    pub async fn execute(&self, request: RequestDescriptor) -> Result<TransportResponse> {
        let mut attempt = request.clone();
        self.augmenter.augment(&mut attempt).await;
        let mut already_retried = false;

        loop {
            let response = self.transport.send(attempt).await?;

            if !is_authorization_failure(&response) {
                return Ok(response);
            }

            if already_retried {
                warn!(url = %request.url, "still unauthorized after refresh, giving up");
                crate::metrics::record_retry_exhausted();
                return Err(Error::RetryExhausted(response));
            }

            let has_refresh_token = self
                .store
                .get()
                .await
                .is_some_and(|pair| pair.has_refresh_token());
            if !has_refresh_token {
                info!(url = %request.url, "unauthorized with no refresh token");
                self.terminator
                    .terminate(TerminationReason::NoRefreshToken)
                    .await;
                return Err(Error::NoRefreshAvailable(response));
            }

            already_retried = true;
            debug!(url = %request.url, "unauthorized, waiting for fresh credentials");
            let access_token = self.coordinator.ensure_fresh_token().await?;

            attempt = request.clone();
            self.augmenter.attach(&mut attempt, &access_token);
            crate::metrics::record_retry();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RefreshError;
    use crate::test_support::{API_BASE, MockTransport, RecordingHandler, RefreshReply, REFRESH_URL};
    use session_auth::{CredentialPair, MemoryCredentialStore};
    use std::time::Duration;

    struct Harness {
        guardian: ResponseGuardian,
        transport: Arc<MockTransport>,
        store: Arc<MemoryCredentialStore>,
        handler: Arc<RecordingHandler>,
    }

    fn harness(pair: Option<CredentialPair>) -> Harness {
        let store = Arc::new(match pair {
            Some(pair) => MemoryCredentialStore::with_pair(pair),
            None => MemoryCredentialStore::new(),
        });
        let handler = Arc::new(RecordingHandler::default());
        let transport = Arc::new(MockTransport::new("at_valid"));
        let terminator = Arc::new(SessionTerminator::new(store.clone(), handler.clone()));
        let coordinator = Arc::new(RefreshCoordinator::new(
            transport.clone(),
            store.clone(),
            terminator.clone(),
            REFRESH_URL.to_string(),
            Duration::from_secs(5),
        ));
        let guardian = ResponseGuardian::new(
            RequestAugmenter::new(store.clone()),
            transport.clone(),
            store.clone(),
            coordinator,
            terminator,
        );
        Harness {
            guardian,
            transport,
            store,
            handler,
        }
    }

    fn get(path: &str) -> RequestDescriptor {
        RequestDescriptor::get(format!("{API_BASE}{path}"))
    }

    #[test]
    fn only_401_is_an_authorization_failure() {
        assert!(is_authorization_failure(&TransportResponse::new(StatusCode::UNAUTHORIZED, "")));
        assert!(!is_authorization_failure(&TransportResponse::new(StatusCode::FORBIDDEN, "")));
        assert!(!is_authorization_failure(&TransportResponse::new(StatusCode::OK, "")));
    }

    #[tokio::test]
    async fn success_passes_through_without_refresh() {
        let h = harness(Some(CredentialPair::new("at_valid", 0, "rt_1", 0)));

        let response = h.guardian.execute(get("/companies")).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(&response.body[..], b"ok:/companies");
        assert_eq!(h.transport.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn non_401_errors_pass_through_unchanged() {
        let h = harness(Some(CredentialPair::new("at_1", 0, "rt_1", 0)));

        for code in [403u16, 404, 500] {
            let response = h.guardian.execute(get(&format!("/status/{code}"))).await.unwrap();
            assert_eq!(response.status.as_u16(), code);
        }
        assert_eq!(h.transport.refresh_calls(), 0);
        assert_eq!(h.handler.expired_count(), 0);
    }

    #[tokio::test]
    async fn transport_errors_propagate_without_refresh() {
        let h = harness(Some(CredentialPair::new("at_1", 0, "rt_1", 0)));

        let err = h.guardian.execute(get("/boom")).await.unwrap_err();

        assert!(matches!(err, Error::Transport(_)));
        assert!(!err.ended_session());
        assert_eq!(h.transport.refresh_calls(), 0);
        assert!(h.store.get().await.is_some());
    }

    #[tokio::test]
    async fn first_401_refreshes_and_replays_once() {
        let h = harness(Some(CredentialPair::new("at_1", 0, "rt_1", 0)));
        h.transport.push_refresh(RefreshReply::issue("at_2", "rt_2"));

        let response = h.guardian.execute(get("/employees")).await.unwrap();

        assert_eq!(response.status, StatusCode::OK);
        let sent = h.transport.requests();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].bearer_token(), Some("at_1"));
        assert_eq!(sent[1].bearer_token(), Some("at_2"));
    }

    #[tokio::test]
    async fn replay_keeps_method_body_and_headers() {
        let h = harness(Some(CredentialPair::new("at_1", 0, "rt_1", 0)));
        h.transport.push_refresh(RefreshReply::issue("at_2", "rt_2"));
        let request = RequestDescriptor::post(format!("{API_BASE}/forms"))
            .with_header(
                reqwest::header::CONTENT_TYPE,
                reqwest::header::HeaderValue::from_static("application/json"),
            )
            .with_body(r#"{"hours":8}"#);

        h.guardian.execute(request).await.unwrap();

        let replay = &h.transport.requests()[1];
        assert_eq!(replay.method, reqwest::Method::POST);
        assert_eq!(&replay.body[..], br#"{"hours":8}"#);
        assert_eq!(replay.headers["content-type"], "application/json");
    }

    #[tokio::test]
    async fn second_401_is_retry_exhausted() {
        let h = harness(Some(CredentialPair::new("at_1", 0, "rt_1", 0)));
        h.transport.push_refresh(RefreshReply::issue_unaccepted("at_2", "rt_2"));

        let err = h.guardian.execute(get("/employees")).await.unwrap_err();

        let Error::RetryExhausted(response) = &err else {
            panic!("expected RetryExhausted, got {err:?}");
        };
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(h.transport.requests().len(), 2, "original attempt plus one replay");
        assert_eq!(h.transport.refresh_calls(), 1);
        // The refresh itself succeeded: session stays
        assert_eq!(h.handler.expired_count(), 0);
        assert!(!err.ended_session());
    }

    #[tokio::test]
    async fn missing_refresh_token_terminates_and_returns_original_401() {
        let h = harness(Some(CredentialPair::new("at_1", 0, "", 0)));

        let err = h.guardian.execute(get("/employees")).await.unwrap_err();

        let response = err.unauthorized_response().expect("original 401 attached");
        assert_eq!(response.status, StatusCode::UNAUTHORIZED);
        assert_eq!(&response.body[..], br#"{"detail":"token expired"}"#);
        assert!(matches!(err, Error::NoRefreshAvailable(_)));
        assert!(h.store.get().await.is_none());
        assert_eq!(h.handler.reasons(), vec![TerminationReason::NoRefreshToken]);
        assert_eq!(h.transport.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn unauthenticated_calls_do_not_signal_again() {
        let h = harness(None);

        for _ in 0..3 {
            let err = h.guardian.execute(get("/employees")).await.unwrap_err();
            assert!(matches!(err, Error::NoRefreshAvailable(_)));
        }

        assert_eq!(h.handler.expired_count(), 1);
        let sent = h.transport.requests();
        assert!(sent.iter().all(|r| r.bearer_token().is_none()));
    }

    #[tokio::test]
    async fn refresh_failure_surfaces_refresh_error_not_401() {
        let h = harness(Some(CredentialPair::new("at_1", 0, "rt_1", 0)));
        h.transport
            .push_refresh(RefreshReply::status(400, r#"{"detail":"refresh token expired"}"#));

        let err = h.guardian.execute(get("/employees")).await.unwrap_err();

        assert!(
            matches!(err, Error::RefreshFailed(RefreshError::Rejected(_))),
            "got {err:?}"
        );
        assert!(err.unauthorized_response().is_none());
        assert_eq!(h.handler.reasons(), vec![TerminationReason::RefreshFailed]);
        assert!(h.store.get().await.is_none());
        assert_eq!(h.transport.requests().len(), 1, "no replay after a failed refresh");
    }
}
