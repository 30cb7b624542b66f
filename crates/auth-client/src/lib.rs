//! Authenticated HTTP client with transparent token refresh
//!
//! Attaches the session's bearer token to every outgoing call, and when the
//! server answers 401 runs at most one refresh exchange at a time no matter
//! how many calls fail together. Calls that fail while a refresh is running
//! wait for it and are replayed once with the new token.
//!
//! Request lifecycle:
//! 1. `RequestAugmenter` attaches `Authorization: Bearer <access>` if a token is stored
//! 2. `Transport` sends the call
//! 3. `ResponseGuardian` passes anything but a 401 straight back
//! 4. First 401 with a refresh token stored → `RefreshCoordinator::ensure_fresh_token()`
//! 5. The caller joins the `RequestQueue`; one spawned task runs the exchange
//! 6. Success: store replaced, queue drained with the new token, call replayed once
//! 7. Failure: `SessionTerminator` clears the store and signals the host once,
//!    every queued caller gets the refresh error
//! 8. A 401 with no refresh token stored terminates the session and returns the 401

pub mod augmenter;
pub mod client;
pub mod coordinator;
pub mod error;
pub mod guardian;
pub mod metrics;
pub mod queue;
pub mod terminator;
pub mod transport;

#[cfg(test)]
mod test_support;

pub use augmenter::RequestAugmenter;
pub use client::{AuthClient, AuthClientConfig};
pub use coordinator::{RefreshCoordinator, RefreshState};
pub use error::{Error, RefreshError, Result, TransportError};
pub use guardian::{ResponseGuardian, is_authorization_failure};
pub use queue::{RefreshOutcome, RequestQueue};
pub use terminator::{SessionExpiredHandler, SessionTerminator, TerminationReason};
pub use transport::{ReqwestTransport, RequestDescriptor, Transport, TransportResponse};
