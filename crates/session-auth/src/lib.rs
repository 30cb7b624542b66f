//! Session credential library
//!
//! Owns everything the authenticated client needs to know about credentials
//! without touching the network: the access/refresh token pair, where it is
//! kept, what an access token claims about itself, and the wire shape of the
//! refresh exchange.
//!
//! Credential lifecycle:
//! 1. Login stores a `CredentialPair` via `CredentialStore::set()`
//! 2. Every outgoing request reads it via `CredentialStore::get()`
//! 3. A refresh exchange sends `RefreshRequest` and parses a `TokenResponse`
//! 4. The refreshed pair replaces the old one via `CredentialStore::set()`
//! 5. Session termination wipes it via `CredentialStore::clear()`

pub mod claims;
pub mod credentials;
pub mod error;
pub mod token;

pub use claims::{Claims, decode_claims};
pub use credentials::{
    BoxFuture, CredentialPair, CredentialStore, FileCredentialStore, MemoryCredentialStore,
    now_millis,
};
pub use error::{Error, Result};
pub use token::{RefreshRequest, TokenResponse, parse_refresh_response};
