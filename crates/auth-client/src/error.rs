//! Error taxonomy for authenticated calls
//!
//! Only two outcomes end the session: `RefreshFailed` and `NoRefreshAvailable`.
//! Everything else stays scoped to the call that produced it.

use std::time::Duration;

use crate::transport::TransportResponse;

/// Failure to complete one outbound call, unrelated to authorization.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("reading response body failed: {0}")]
    Body(String),

    #[error("request failed: {0}")]
    Other(String),
}

impl TransportError {
    /// Label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TransportError::Timeout(_) => "timeout",
            TransportError::Connect(_) => "connection",
            TransportError::Body(_) => "body",
            TransportError::Other(_) => "other",
        }
    }
}

/// Why a refresh cycle did not produce a new access token.
///
/// Cloned to every caller waiting on the cycle, so all of them see the same
/// root cause.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RefreshError {
    #[error("refresh token rejected: {0}")]
    Rejected(String),

    #[error("refresh exchange failed: {0}")]
    Exchange(String),

    #[error("refresh request failed: {0}")]
    Transport(#[from] TransportError),

    #[error("refresh timed out after {0:?}")]
    Timeout(Duration),

    #[error("no refresh token stored")]
    MissingRefreshToken,

    #[error("refresh cycle ended without a result")]
    Aborted,
}

impl RefreshError {
    /// Label for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            RefreshError::Rejected(_) => "rejected",
            RefreshError::Exchange(_) => "exchange_error",
            RefreshError::Transport(_) => "transport_error",
            RefreshError::Timeout(_) => "timeout",
            RefreshError::MissingRefreshToken => "missing_refresh_token",
            RefreshError::Aborted => "aborted",
        }
    }
}

impl From<session_auth::Error> for RefreshError {
    fn from(err: session_auth::Error) -> Self {
        match err {
            session_auth::Error::InvalidCredentials(msg) => RefreshError::Rejected(msg),
            other => RefreshError::Exchange(other.to_string()),
        }
    }
}

/// Errors returned to the caller of `AuthClient::execute`.
///
/// HTTP error statuses other than 401 are not errors here; they come back as
/// an ordinary `TransportResponse`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// 401 with no refresh token stored. Carries the original response.
    #[error("unauthorized and no refresh token is available")]
    NoRefreshAvailable(TransportResponse),

    /// 401 on the replay after a successful refresh. Carries that response.
    #[error("still unauthorized after refreshing credentials")]
    RetryExhausted(TransportResponse),

    #[error("session expired: {0}")]
    RefreshFailed(#[from] RefreshError),
}

impl Error {
    /// The 401 response behind `NoRefreshAvailable` / `RetryExhausted`.
    pub fn unauthorized_response(&self) -> Option<&TransportResponse> {
        match self {
            Error::NoRefreshAvailable(response) | Error::RetryExhausted(response) => Some(response),
            _ => None,
        }
    }

    /// Whether the session was torn down on the way to this error.
    pub fn ended_session(&self) -> bool {
        matches!(self, Error::NoRefreshAvailable(_) | Error::RefreshFailed(_))
    }
}

/// Result alias for authenticated calls.
pub type Result<T> = std::result::Result<T, Error>;
