//! Public entry point wiring the refresh machinery together

use std::sync::Arc;
use std::time::Duration;

use session_auth::{Claims, CredentialPair, CredentialStore};
use tracing::{info, instrument};

use crate::augmenter::RequestAugmenter;
use crate::coordinator::{RefreshCoordinator, RefreshState};
use crate::error::Result;
use crate::guardian::ResponseGuardian;
use crate::terminator::{SessionExpiredHandler, SessionTerminator, TerminationReason};
use crate::transport::{RequestDescriptor, Transport, TransportResponse};

/// Default upper bound on one refresh exchange.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// Where and how long to refresh.
#[derive(Debug, Clone)]
pub struct AuthClientConfig {
    /// Absolute URL of the refresh endpoint
    pub refresh_url: String,
    /// Bound on one refresh exchange, on top of the transport's own timeout.
    /// A cycle that exceeds it fails with `RefreshError::Timeout`.
    pub refresh_timeout: Duration,
}

impl AuthClientConfig {
    pub fn new(refresh_url: impl Into<String>) -> Self {
        Self {
            refresh_url: refresh_url.into(),
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
        }
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }
}

/// HTTP client that keeps a session's credentials fresh.
///
/// Cheap to clone; clones share the store, the refresh state and the
/// termination signal.
#[derive(Clone)]
pub struct AuthClient {
    guardian: Arc<ResponseGuardian>,
    coordinator: Arc<RefreshCoordinator>,
    terminator: Arc<SessionTerminator>,
    store: Arc<dyn CredentialStore>,
}

impl AuthClient {
    pub fn new(
        config: AuthClientConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        handler: Arc<dyn SessionExpiredHandler>,
    ) -> Self {
        let terminator = Arc::new(SessionTerminator::new(store.clone(), handler));
        let coordinator = Arc::new(RefreshCoordinator::new(
            transport.clone(),
            store.clone(),
            terminator.clone(),
            config.refresh_url,
            config.refresh_timeout,
        ));
        let guardian = Arc::new(ResponseGuardian::new(
            RequestAugmenter::new(store.clone()),
            transport,
            store.clone(),
            coordinator.clone(),
            terminator.clone(),
        ));
        Self {
            guardian,
            coordinator,
            terminator,
            store,
        }
    }

    /// Send a call with the session's credentials, refreshing and replaying
    /// once if the server answers 401.
    #[instrument(skip_all, fields(method = %request.method, url = %request.url))]
    pub async fn execute(&self, request: RequestDescriptor) -> Result<TransportResponse> {
        self.guardian.execute(request).await
    }

    /// Store the credentials from a fresh login and re-arm the session-expired signal.
    pub async fn login(&self, pair: CredentialPair) -> session_auth::Result<()> {
        self.store.set(pair).await?;
        self.terminator.session_started();
        info!("session started");
        Ok(())
    }

    /// End the session on the host's request.
    pub async fn logout(&self) {
        self.terminator.terminate(TerminationReason::Logout).await;
    }

    pub async fn credentials(&self) -> Option<CredentialPair> {
        self.store.get().await
    }

    /// Claims of the stored access token, if it is a JWT.
    pub async fn access_claims(&self) -> Option<Claims> {
        self.store.access_claims().await
    }

    pub fn session_ended(&self) -> bool {
        self.terminator.is_ended()
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.coordinator.state()
    }

    pub fn refresh_cycles(&self) -> u64 {
        self.coordinator.cycles()
    }

    pub fn pending_waiters(&self) -> usize {
        self.coordinator.pending_waiters()
    }
}
