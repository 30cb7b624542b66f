//! Single-flight refresh coordination
//!
//! The coordinator owns the refresh state machine:
//!
//! - Idle → Refreshing: first caller that needs a fresh token
//! - Refreshing → Idle: exchange succeeded (store replaced, waiters drained)
//! - Refreshing → Idle: exchange failed (session terminated, waiters drained)
//!
//! The state check and the transition happen under one lock with no `.await`
//! in between, so two callers can never both see Idle and both start a
//! refresh. Every caller, including the one that starts the cycle, parks on
//! the `RequestQueue` and receives the same outcome.
//!
//! The exchange runs on its own task. A caller that gives up does not take
//! the exchange down with it, and a drop guard on that task returns the state
//! to Idle and drains the queue even if the task never reaches the end.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use reqwest::header::{CONTENT_TYPE, HeaderValue};
use session_auth::{CredentialPair, CredentialStore, RefreshRequest, now_millis, parse_refresh_response};
use tracing::{debug, info, warn};

use crate::error::RefreshError;
use crate::queue::{RefreshOutcome, RequestQueue};
use crate::terminator::{SessionTerminator, TerminationReason};
use crate::transport::{RequestDescriptor, Transport};

/// Refresh state of one client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

impl RefreshState {
    /// Status label for health/logging.
    pub fn label(&self) -> &'static str {
        match self {
            RefreshState::Idle => "idle",
            RefreshState::Refreshing => "refreshing",
        }
    }
}

#[derive(Debug)]
struct Inner {
    state: RefreshState,
    queue: RequestQueue,
    cycles: u64,
}

/// Guarantees at most one refresh exchange in flight per client.
pub struct RefreshCoordinator {
    inner: Mutex<Inner>,
    transport: Arc<dyn Transport>,
    store: Arc<dyn CredentialStore>,
    terminator: Arc<SessionTerminator>,
    refresh_url: String,
    refresh_timeout: Duration,
}

impl RefreshCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn CredentialStore>,
        terminator: Arc<SessionTerminator>,
        refresh_url: String,
        refresh_timeout: Duration,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: RefreshState::Idle,
                queue: RequestQueue::new(),
                cycles: 0,
            }),
            transport,
            store,
            terminator,
            refresh_url,
            refresh_timeout,
        }
    }

    pub fn state(&self) -> RefreshState {
        self.lock().state
    }

    /// Number of refresh cycles started over the client's lifetime.
    pub fn cycles(&self) -> u64 {
        self.lock().cycles
    }

    /// Callers currently parked on the in-flight cycle.
    pub fn pending_waiters(&self) -> usize {
        self.lock().queue.len()
    }

    /// Get a fresh access token, joining the in-flight refresh if there is one.
    ///
    /// Only the call that finds the coordinator Idle starts an exchange; all
    /// others wait for that exchange's result. Must be called from within a
    /// tokio runtime.
    pub async fn ensure_fresh_token(self: &Arc<Self>) -> RefreshOutcome {
        let (receiver, starts_cycle) = {
            let mut inner = self.lock();
            let receiver = inner.queue.enqueue();
            let starts_cycle = inner.state == RefreshState::Idle;
            if starts_cycle {
                inner.state = RefreshState::Refreshing;
                inner.cycles += 1;
            }
            (receiver, starts_cycle)
        };

        if starts_cycle {
            debug!("starting refresh cycle");
            tokio::spawn(Arc::clone(self).run_cycle());
        } else {
            debug!("refresh already in flight, waiting for its result");
        }

        receiver.await.unwrap_or(Err(RefreshError::Aborted))
    }

    async fn run_cycle(self: Arc<Self>) {
        let cycle = CycleGuard {
            coordinator: &self,
            finished: false,
        };
        let started = Instant::now();

        let result = match tokio::time::timeout(self.refresh_timeout, self.exchange()).await {
            Ok(result) => result,
            Err(_) => Err(RefreshError::Timeout(self.refresh_timeout)),
        };
        crate::metrics::record_refresh(result.as_ref().err(), started.elapsed());

        let outcome = match result {
            Ok(pair) => {
                let access_token = pair.access_token.clone();
                if let Err(e) = self.store.set(pair).await {
                    warn!(error = %e, "failed to persist refreshed credentials");
                }
                info!("credential refresh succeeded");
                Ok(access_token)
            }
            Err(err) => {
                warn!(error = %err, reason = err.label(), "credential refresh failed, ending session");
                self.terminator
                    .terminate(TerminationReason::RefreshFailed)
                    .await;
                Err(err)
            }
        };

        cycle.finish(outcome);
    }

    /// One refresh exchange against the transport using the stored refresh token.
    async fn exchange(&self) -> std::result::Result<CredentialPair, RefreshError> {
        let previous = self
            .store
            .get()
            .await
            .filter(CredentialPair::has_refresh_token)
            .ok_or(RefreshError::MissingRefreshToken)?;

        let body = RefreshRequest::new(previous.refresh_token.expose()).to_json()?;
        let request = RequestDescriptor::post(self.refresh_url.as_str())
            .with_header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .with_body(body);

        let response = self.transport.send(request).await?;
        let token = parse_refresh_response(response.status.as_u16(), &response.body)?;
        Ok(token.into_credential_pair(&previous, now_millis()))
    }

    /// Drain the queue with `outcome` and go back to Idle, atomically with
    /// respect to `ensure_fresh_token`.
    fn complete(&self, outcome: &RefreshOutcome) {
        let drained = {
            let mut inner = self.lock();
            let drained = inner.queue.drain(outcome);
            inner.state = RefreshState::Idle;
            drained
        };
        crate::metrics::record_refresh_waiters(drained);
        debug!(drained, success = outcome.is_ok(), "refresh cycle complete");
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Finalizes a refresh cycle exactly once, whether or not the cycle task
/// reaches its end.
struct CycleGuard<'a> {
    coordinator: &'a RefreshCoordinator,
    finished: bool,
}

impl CycleGuard<'_> {
    fn finish(mut self, outcome: RefreshOutcome) {
        self.finished = true;
        self.coordinator.complete(&outcome);
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!("refresh cycle ended without an outcome, releasing waiters");
            self.coordinator.complete(&Err(RefreshError::Aborted));
        }
    }
}
