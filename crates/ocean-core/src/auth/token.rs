//! Bearer token expiry decoding.
//!
//! Tokens are JWTs: `header.payload.signature`, each segment base64url.
//! Only the payload's `exp` claim is read; signatures are the server's
//! business and are never checked here.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// What to do with a token whose payload cannot be decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodePolicy {
    /// Treat the token as still valid and let the server decide.
    #[default]
    FailOpen,
    /// Treat the token as expired, forcing a refresh or a new sign-in.
    FailClosed,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCodec {
    policy: DecodePolicy,
}

impl TokenCodec {
    pub fn new(policy: DecodePolicy) -> Self {
        Self { policy }
    }

    /// True once the current time has reached the token's `exp` claim.
    pub fn is_expired(&self, token: &str) -> bool {
        self.is_expired_at(token, Utc::now())
    }

    pub fn is_expired_at(&self, token: &str, now: DateTime<Utc>) -> bool {
        match decode_exp(token) {
            // A payload without `exp` counts as expiring at the epoch. A
            // non-numeric claim (NaN) never compares as expired.
            Some(exp) => now.timestamp_millis() as f64 >= exp.unwrap_or(0.0) * 1000.0,
            None => {
                debug!(policy = ?self.policy, "Undecodable token");
                self.policy == DecodePolicy::FailClosed
            }
        }
    }

    /// Expiry instant from the `exp` claim, when the token carries one.
    pub fn expires_at(&self, token: &str) -> Option<DateTime<Utc>> {
        let exp = decode_exp(token)??;
        if !exp.is_finite() {
            return None;
        }
        Utc.timestamp_millis_opt((exp * 1000.0) as i64).single()
    }
}

/// Outer `None` means the payload could not be decoded at all; inner
/// `None` means it decoded but carries no `exp` (including payloads that
/// are not JSON objects).
fn decode_exp(token: &str) -> Option<Option<f64>> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next()) {
        (Some(_header), Some(payload)) => payload,
        _ => return None,
    };
    // Some issuers pad their segments.
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let payload: Value = serde_json::from_slice(&bytes).ok()?;
    if payload.is_null() {
        return None;
    }
    Some(payload.get("exp").and_then(claim_seconds))
}

/// Numeric value of a claim, coercing strings and booleans the way a
/// loosely typed issuer would expect.
fn claim_seconds(value: &Value) -> Option<f64> {
    match value {
        Value::Null => None,
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        Value::String(s) if s.trim().is_empty() => Some(0.0),
        Value::String(s) => Some(s.trim().parse().unwrap_or(f64::NAN)),
        Value::Array(_) | Value::Object(_) => Some(f64::NAN),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::Duration;

    /// Build an unsigned JWT whose payload is `payload`.
    pub(crate) fn jwt_with_payload(payload: &str) -> String {
        format!(
            "{}.{}.signature",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#),
            URL_SAFE_NO_PAD.encode(payload)
        )
    }

    pub(crate) fn jwt_expiring_at(exp: DateTime<Utc>) -> String {
        jwt_with_payload(&format!(r#"{{"sub":"user-1","exp":{}}}"#, exp.timestamp()))
    }

    pub(crate) fn fresh_jwt() -> String {
        jwt_expiring_at(Utc::now() + Duration::hours(1))
    }

    pub(crate) fn expired_jwt() -> String {
        jwt_expiring_at(Utc::now() - Duration::hours(1))
    }

    #[test]
    fn test_fresh_and_expired_tokens() {
        let codec = TokenCodec::default();
        assert!(!codec.is_expired(&fresh_jwt()));
        assert!(codec.is_expired(&expired_jwt()));
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let codec = TokenCodec::default();
        let exp = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let token = jwt_expiring_at(exp);
        assert!(!codec.is_expired_at(&token, exp - Duration::seconds(1)));
        assert!(codec.is_expired_at(&token, exp));
    }

    #[test]
    fn test_missing_exp_counts_as_expired() {
        let codec = TokenCodec::default();
        assert!(codec.is_expired(&jwt_with_payload(r#"{"sub":"user-1"}"#)));
        assert_eq!(codec.expires_at(&jwt_with_payload(r#"{"sub":"user-1"}"#)), None);
    }

    #[test]
    fn test_string_exp_is_coerced() {
        let codec = TokenCodec::new(DecodePolicy::FailOpen);
        let exp = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let token = jwt_with_payload(&format!(r#"{{"exp":"{}"}}"#, exp.timestamp()));
        assert!(codec.is_expired_at(&token, exp));
        assert!(!codec.is_expired_at(&token, exp - Duration::seconds(1)));
        assert_eq!(codec.expires_at(&token), Some(exp));

        let garbage = jwt_with_payload(r#"{"exp":"soon"}"#);
        assert!(!codec.is_expired(&garbage));
        assert_eq!(codec.expires_at(&garbage), None);
    }

    #[test]
    fn test_non_object_payload_counts_as_expired() {
        let open = TokenCodec::new(DecodePolicy::FailOpen);
        for payload in ["42", r#""text""#, "[1,2]"] {
            assert!(open.is_expired(&jwt_with_payload(payload)), "{}", payload);
        }
        // A null payload cannot be read at all
        assert!(!open.is_expired(&jwt_with_payload("null")));
    }

    #[test]
    fn test_undecodable_token_follows_policy() {
        let open = TokenCodec::new(DecodePolicy::FailOpen);
        let closed = TokenCodec::new(DecodePolicy::FailClosed);
        let not_json = jwt_with_payload("not json");
        for token in ["", "opaque", "a.%%%.c", not_json.as_str()] {
            assert!(!open.is_expired(token), "fail-open for {:?}", token);
            assert!(closed.is_expired(token), "fail-closed for {:?}", token);
        }
    }

    #[test]
    fn test_padded_payload_decodes() {
        let exp = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let payload = base64::engine::general_purpose::URL_SAFE
            .encode(format!(r#"{{"exp": {}}}"#, exp.timestamp()));
        assert!(payload.ends_with('='));
        let token = format!("h.{}.s", payload);
        assert_eq!(TokenCodec::default().expires_at(&token), Some(exp));
    }

    #[test]
    fn test_decode_policy_serde() {
        let policy: DecodePolicy = serde_json::from_str(r#""fail_closed""#).unwrap();
        assert_eq!(policy, DecodePolicy::FailClosed);
    }
}
