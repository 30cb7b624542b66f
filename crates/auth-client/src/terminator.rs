//! Session teardown
//!
//! Two places end a session: the coordinator when a refresh cycle fails, and
//! the guardian when a 401 arrives with no refresh token to try. Both go
//! through `SessionTerminator::terminate`, which is idempotent: the store is
//! cleared every time, the host is told once per session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use session_auth::CredentialStore;
use tracing::{debug, info, warn};

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// 401 with no refresh token stored
    NoRefreshToken,
    /// The refresh exchange failed
    RefreshFailed,
    /// The host asked for it
    Logout,
}

impl TerminationReason {
    /// Label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            TerminationReason::NoRefreshToken => "no_refresh_token",
            TerminationReason::RefreshFailed => "refresh_failed",
            TerminationReason::Logout => "logout",
        }
    }
}

/// Host capability invoked when the session ends, typically to send the user
/// back to the login entry point.
pub trait SessionExpiredHandler: Send + Sync {
    fn on_session_expired(&self, reason: TerminationReason);

    /// Called when a new session is stored after login.
    fn on_session_started(&self) {}
}

/// Clears credentials and signals the host, at most once per session.
pub struct SessionTerminator {
    store: Arc<dyn CredentialStore>,
    handler: Arc<dyn SessionExpiredHandler>,
    ended: AtomicBool,
}

impl SessionTerminator {
    pub fn new(store: Arc<dyn CredentialStore>, handler: Arc<dyn SessionExpiredHandler>) -> Self {
        Self {
            store,
            handler,
            ended: AtomicBool::new(false),
        }
    }

    /// Clear the credential store and, if the session was still live, tell the host.
    pub async fn terminate(&self, reason: TerminationReason) {
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, reason = reason.label(), "failed to clear credential store");
        }

        if self.ended.swap(true, Ordering::AcqRel) {
            debug!(reason = reason.label(), "session already ended");
            return;
        }

        info!(reason = reason.label(), "session ended");
        crate::metrics::record_termination(reason);
        self.handler.on_session_expired(reason);
    }

    /// Re-arm after a new session has been stored.
    pub fn session_started(&self) {
        self.ended.store(false, Ordering::Release);
        self.handler.on_session_started();
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }
}
