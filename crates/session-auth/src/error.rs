//! Error types for credential and token operations

/// Errors from credential storage and token handling.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("malformed token: {0}")]
    MalformedToken(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

/// Result alias for credential operations.
pub type Result<T> = std::result::Result<T, Error>;
