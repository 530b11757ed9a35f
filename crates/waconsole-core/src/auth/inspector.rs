//! Local evaluation of token expiry.
//!
//! Reads the `exp` claim from a JWT payload **without verifying the
//! signature**. The server remains the authority on validity; this only
//! decides whether a token is worth sending or renewing.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

/// Safety margin before access-token expiry.
/// Renewing 2 minutes early keeps a token from expiring mid-flight.
pub const EXPIRY_BUFFER_SECS: i64 = 120;

/// Extract the `exp` claim of a JWT as an instant.
///
/// Returns `None` for anything that is not a three-segment token with a
/// base64url JSON payload carrying a numeric `exp`.
pub fn decode_expiry(token: &str) -> Option<DateTime<Utc>> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 || parts[1].is_empty() {
        return None;
    }

    let payload_bytes = URL_SAFE_NO_PAD.decode(parts[1].trim_end_matches('=')).ok()?;
    let payload: Value = serde_json::from_slice(&payload_bytes).ok()?;

    let exp = payload.get("exp")?;
    let secs = exp
        .as_i64()
        .or_else(|| exp.as_f64().filter(|f| f.is_finite()).map(|f| f.floor() as i64))?;
    DateTime::from_timestamp(secs, 0)
}

/// Stateless expiry checks against the current clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenInspector {
    expiry_buffer: Duration,
}

impl Default for TokenInspector {
    fn default() -> Self {
        Self::new(Duration::seconds(EXPIRY_BUFFER_SECS))
    }
}

impl TokenInspector {
    pub fn new(expiry_buffer: Duration) -> Self {
        Self { expiry_buffer }
    }

    pub fn expiry_buffer(&self) -> Duration {
        self.expiry_buffer
    }

    /// True when the token is absent, undecodable, or expires within the buffer.
    pub fn is_expired_or_expiring_soon(&self, token: Option<&str>) -> bool {
        self.is_expired_or_expiring_soon_at(token, Utc::now())
    }

    pub fn is_expired_or_expiring_soon_at(&self, token: Option<&str>, now: DateTime<Utc>) -> bool {
        match token.and_then(decode_expiry) {
            Some(exp) => exp <= now + self.expiry_buffer,
            None => true,
        }
    }

    /// True only for a decodable token whose expiry is strictly in the future.
    /// No buffer: used to decide whether a refresh token is still admissible.
    pub fn is_valid(&self, token: Option<&str>) -> bool {
        self.is_valid_at(token, Utc::now())
    }

    pub fn is_valid_at(&self, token: Option<&str>, now: DateTime<Utc>) -> bool {
        token.and_then(decode_expiry).map(|exp| exp > now).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{jwt_with_exp, jwt_with_payload};

    fn fixed_now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_decode_expiry() {
        let token = jwt_with_exp(1_700_000_500);
        assert_eq!(decode_expiry(&token), DateTime::from_timestamp(1_700_000_500, 0));
    }

    #[test]
    fn test_decode_expiry_float_claim() {
        let token = jwt_with_payload(r#"{"sub":"u1","exp":1700000500.75}"#);
        assert_eq!(decode_expiry(&token), DateTime::from_timestamp(1_700_000_500, 0));
    }

    #[test]
    fn test_decode_expiry_malformed() {
        assert_eq!(decode_expiry(""), None);
        assert_eq!(decode_expiry("not-a-jwt"), None);
        assert_eq!(decode_expiry("a.b"), None);
        assert_eq!(decode_expiry("a.!!!.c"), None);
        assert_eq!(decode_expiry(&jwt_with_payload("not json")), None);
        assert_eq!(decode_expiry(&jwt_with_payload(r#"{"sub":"u1"}"#)), None);
        assert_eq!(decode_expiry(&jwt_with_payload(r#"{"exp":"tomorrow"}"#)), None);
    }

    #[test]
    fn test_expiring_soon_boundary() {
        let inspector = TokenInspector::default();
        let now = fixed_now();
        let ts = now.timestamp();

        let at_119 = jwt_with_exp(ts + 119);
        let at_120 = jwt_with_exp(ts + 120);
        let at_121 = jwt_with_exp(ts + 121);
        let past = jwt_with_exp(ts - 10);

        assert!(inspector.is_expired_or_expiring_soon_at(Some(&past), now));
        assert!(inspector.is_expired_or_expiring_soon_at(Some(&at_119), now));
        assert!(inspector.is_expired_or_expiring_soon_at(Some(&at_120), now));
        assert!(!inspector.is_expired_or_expiring_soon_at(Some(&at_121), now));
    }

    #[test]
    fn test_expiring_soon_absent_or_malformed() {
        let inspector = TokenInspector::default();
        assert!(inspector.is_expired_or_expiring_soon_at(None, fixed_now()));
        assert!(inspector.is_expired_or_expiring_soon_at(Some("garbage"), fixed_now()));
    }

    #[test]
    fn test_is_valid_boundary() {
        let inspector = TokenInspector::default();
        let now = fixed_now();
        let ts = now.timestamp();

        assert!(!inspector.is_valid_at(Some(&jwt_with_exp(ts)), now));
        assert!(!inspector.is_valid_at(Some(&jwt_with_exp(ts - 1)), now));
        assert!(inspector.is_valid_at(Some(&jwt_with_exp(ts + 1)), now));
        // no buffer for validity
        assert!(inspector.is_valid_at(Some(&jwt_with_exp(ts + 30)), now));
    }

    #[test]
    fn test_is_valid_absent_or_malformed() {
        let inspector = TokenInspector::default();
        assert!(!inspector.is_valid_at(None, fixed_now()));
        assert!(!inspector.is_valid_at(Some("a.b.c"), fixed_now()));
    }

    #[test]
    fn test_custom_buffer() {
        let inspector = TokenInspector::new(Duration::seconds(10));
        let now = fixed_now();
        let token = jwt_with_exp(now.timestamp() + 60);
        assert!(!inspector.is_expired_or_expiring_soon_at(Some(&token), now));
    }
}
