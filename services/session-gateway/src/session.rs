//! Gateway side of the session lifecycle
//!
//! Receives the client's session signals and turns them into gateway state:
//! the `/health` verdict, the `gateway_session_active` gauge, and a log line
//! pointing the operator at the login entry point.

use std::sync::atomic::{AtomicBool, Ordering};

use auth_client::{SessionExpiredHandler, TerminationReason};
use tracing::{info, warn};

pub struct SessionStatus {
    active: AtomicBool,
    login_url: Option<String>,
}

impl SessionStatus {
    pub fn new(login_url: Option<String>, active: bool) -> Self {
        crate::metrics::set_session_active(active);
        Self {
            active: AtomicBool::new(active),
            login_url,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn login_url(&self) -> Option<&str> {
        self.login_url.as_deref()
    }
}

impl SessionExpiredHandler for SessionStatus {
    fn on_session_expired(&self, reason: TerminationReason) {
        self.active.store(false, Ordering::Release);
        crate::metrics::set_session_active(false);
        warn!(
            reason = reason.label(),
            login_url = self.login_url().unwrap_or("<not configured>"),
            "session ended, sign in again"
        );
    }

    fn on_session_started(&self) {
        self.active.store(true, Ordering::Release);
        crate::metrics::set_session_active(true);
        info!("session active");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_and_started_flip_active() {
        let status = SessionStatus::new(Some("https://app.example.com/login".into()), true);
        assert!(status.is_active());

        status.on_session_expired(TerminationReason::RefreshFailed);
        assert!(!status.is_active());

        status.on_session_started();
        assert!(status.is_active());
        assert_eq!(status.login_url(), Some("https://app.example.com/login"));
    }

    #[test]
    fn gauge_follows_session() {
        let (recorder, handle) = crate::metrics::isolated_recorder();
        let _guard = ::metrics::set_default_local_recorder(&recorder);

        let status = SessionStatus::new(None, true);
        assert!(handle.render().contains("gateway_session_active 1"));

        status.on_session_expired(TerminationReason::NoRefreshToken);
        assert!(handle.render().contains("gateway_session_active 0"));
    }
}
