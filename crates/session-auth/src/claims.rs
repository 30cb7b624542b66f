//! Access token claim decoding
//!
//! Access tokens issued by the backend are JWTs. The client never verifies
//! them (the server does that on every call and answers 401 when it stops
//! trusting one); it only peeks at the payload to learn expiry and subject
//! for display and for filling in expiries the refresh response leaves out.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Claims carried in a JWT payload segment.
///
/// `exp` and `iat` are unix timestamps in seconds, per RFC 7519. Anything else
/// the issuer adds is kept in `extra`.
#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    #[serde(default)]
    pub exp: Option<u64>,
    #[serde(default)]
    pub iat: Option<u64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Claims {
    /// Expiration as unix milliseconds, the unit `CredentialPair` stores.
    pub fn expires_at_millis(&self) -> Option<u64> {
        self.exp.map(|secs| secs.saturating_mul(1000))
    }

    /// Subject of the token: `sub`, falling back to `user_id`.
    ///
    /// Numeric identifiers are rendered as strings.
    pub fn subject(&self) -> Option<String> {
        ["sub", "user_id"]
            .iter()
            .filter_map(|key| self.extra.get(*key))
            .find_map(|value| match value {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }
}

/// Decode the payload segment of a JWT without verifying its signature.
pub fn decode_claims(token: &str) -> Result<Claims> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_)) if segments.next().is_none() => payload,
        _ => {
            return Err(Error::MalformedToken(
                "expected three dot-separated segments".into(),
            ));
        }
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| Error::MalformedToken(format!("payload is not base64url: {e}")))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| Error::MalformedToken(format!("payload is not a JSON object: {e}")))
}

#[cfg(test)]
pub(crate) fn encode_test_jwt(payload: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{header}.{body}.signature")
}
