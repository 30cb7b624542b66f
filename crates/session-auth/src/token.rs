//! Refresh exchange wire format
//!
//! The refresh exchange is a single JSON POST carrying the current refresh
//! token. This module only knows the payloads and how to read a response;
//! sending it is the authenticated client's job, so the same transport (and
//! the same test doubles) carry both ordinary calls and refreshes.

use serde::{Deserialize, Serialize};

use crate::claims::decode_claims;
use crate::credentials::CredentialPair;
use crate::error::{Error, Result};

/// Body of the refresh request.
#[derive(Debug, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

impl<'a> RefreshRequest<'a> {
    pub fn new(refresh_token: &'a str) -> Self {
        Self { refresh_token }
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| Error::TokenExchange(format!("serializing refresh request: {e}")))
    }
}

/// Successful refresh response.
///
/// `expires_in` and `refresh_expires_in` are deltas in seconds from the
/// response time. A server that does not rotate refresh tokens omits
/// `refresh_token`; the previous one stays valid.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_expires_in: Option<u64>,
}

impl TokenResponse {
    /// Build the pair that replaces `previous` in the store.
    ///
    /// Absolute expirations are computed from `now_millis`. When the response
    /// leaves a field out, the access expiry falls back to the new token's
    /// `exp` claim and the refresh token/expiry carry over from `previous`.
    pub fn into_credential_pair(self, previous: &CredentialPair, now_millis: u64) -> CredentialPair {
        let access_expires = match self.expires_in {
            Some(secs) => secs.saturating_mul(1000).saturating_add(now_millis),
            None => decode_claims(&self.access_token)
                .ok()
                .and_then(|claims| claims.expires_at_millis())
                .unwrap_or(0),
        };

        let (refresh_token, rotated) = match self.refresh_token {
            Some(token) if !token.is_empty() => (token, true),
            _ => (previous.refresh_token.expose().clone(), false),
        };

        let refresh_expires = match self.refresh_expires_in {
            Some(secs) => secs.saturating_mul(1000).saturating_add(now_millis),
            None if rotated => decode_claims(&refresh_token)
                .ok()
                .and_then(|claims| claims.expires_at_millis())
                .unwrap_or(0),
            None => previous.refresh_expires,
        };

        CredentialPair::new(self.access_token, access_expires, refresh_token, refresh_expires)
    }
}

/// Interpret the refresh endpoint's answer.
///
/// 400/401/403 mean the refresh token itself was refused (expired, revoked,
/// or never valid); any other non-2xx is an exchange failure.
pub fn parse_refresh_response(status: u16, body: &[u8]) -> Result<TokenResponse> {
    if !(200..300).contains(&status) {
        let body = String::from_utf8_lossy(body);
        let body = if body.is_empty() { "<no body>".into() } else { body };

        if matches!(status, 400 | 401 | 403) {
            return Err(Error::InvalidCredentials(format!(
                "refresh token rejected ({status}): {body}"
            )));
        }

        return Err(Error::TokenExchange(format!(
            "refresh endpoint returned {status}: {body}"
        )));
    }

    let token: TokenResponse = serde_json::from_slice(body)
        .map_err(|e| Error::TokenExchange(format!("invalid refresh response: {e}")))?;

    if token.access_token.is_empty() {
        return Err(Error::TokenExchange(
            "refresh response carried an empty access_token".into(),
        ));
    }

    Ok(token)
}
