//! Access token claims inspection.
//!
//! Tokens are three-segment JWTs; only the expiry claim is read here.
//! Signature verification is the server's job. Anything that cannot be
//! decoded is treated as expired, so a bad credential is never reused.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct Claims {
    exp: Option<i64>,
}

/// Whether the token's `exp` claim is at or past the current instant.
///
/// Returns `true` for anything that cannot be evaluated: missing claims
/// segment, invalid base64, invalid JSON, or an absent/non-integer `exp`.
/// Total and side-effect-free.
pub fn is_expired(token: &str) -> bool {
    expiry(token).map_or(true, |exp| exp <= Utc::now().timestamp())
}

/// Extract the Unix-seconds expiry from the claims segment, if readable.
fn expiry(token: &str) -> Option<i64> {
    let payload = token.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: Claims = serde_json::from_slice(&decoded).ok()?;
    claims.exp
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Build an unsigned JWT-shaped token with the given claims object.
    pub fn token_with_claims(claims: &serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
        format!("{header}.{payload}.sig")
    }

    pub fn token_expiring_at(exp: i64) -> String {
        token_with_claims(&serde_json::json!({ "exp": exp }))
    }
}
