//! Bearer credential attachment
//!
//! Never judges whether a token is still good: expiry is discovered only
//! through the server's 401.

use std::sync::Arc;

use common::Secret;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use session_auth::CredentialStore;
use tracing::warn;

use crate::transport::{BEARER_PREFIX, RequestDescriptor};

/// Attaches the stored access token to outgoing requests.
pub struct RequestAugmenter {
    store: Arc<dyn CredentialStore>,
}

impl RequestAugmenter {
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        Self { store }
    }

    /// Attach the currently stored access token. Requests are forwarded
    /// unmodified when no token is stored.
    pub async fn augment(&self, request: &mut RequestDescriptor) {
        let Some(pair) = self.store.get().await else {
            return;
        };
        if pair.has_access_token() {
            attach_bearer(request, pair.access_token.expose());
        }
    }

    /// Attach a specific token, used when replaying a call with the token a
    /// refresh cycle just produced.
    pub fn attach(&self, request: &mut RequestDescriptor, access_token: &Secret<String>) {
        attach_bearer(request, access_token.expose());
    }
}

fn attach_bearer(request: &mut RequestDescriptor, token: &str) {
    match HeaderValue::from_str(&format!("{BEARER_PREFIX}{token}")) {
        Ok(mut value) => {
            value.set_sensitive(true);
            request.headers.insert(AUTHORIZATION, value);
        }
        Err(e) => {
            warn!(error = %e, "stored access token is not a valid header value, sending without it");
        }
    }
}
