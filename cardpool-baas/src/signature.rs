//! Webhook signature verification: HMAC-SHA256 over `timestamp + "." + body`
//! in hex, compared in constant time. During secret rotation a header may
//! carry several candidate signatures; any match passes.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::provider::{ProviderError, WebhookHeaders};

type HmacSha256 = Hmac<Sha256>;

/// Timestamps further than this from the receiver's clock (either direction)
/// are rejected as replays.
pub const DEFAULT_TOLERANCE_SECS: u64 = 300;

/// Computes the hex signature for a body at a timestamp. Exposed so tests and
/// simulated providers can produce valid deliveries.
pub fn sign(secret: &[u8], timestamp: &str, raw_body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret).expect("HMAC accepts any key length");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(raw_body);
    hex::encode(mac.finalize().into_bytes())
}

pub fn verify(
    secret: &[u8],
    raw_body: &[u8],
    headers: &WebhookHeaders,
    now: u64,
    tolerance_secs: u64,
) -> Result<(), ProviderError> {
    let timestamp = headers
        .timestamp
        .as_deref()
        .ok_or(ProviderError::InvalidSignature)?;
    let signature_header = headers
        .signature
        .as_deref()
        .ok_or(ProviderError::InvalidSignature)?;

    let ts: u64 = timestamp
        .parse()
        .map_err(|_| ProviderError::InvalidSignature)?;
    if now.abs_diff(ts) > tolerance_secs {
        return Err(ProviderError::StaleTimestamp);
    }

    let expected = sign(secret, timestamp, raw_body);
    let expected_bytes = match hex::decode(&expected) {
        Ok(bytes) => bytes,
        Err(_) => return Err(ProviderError::InvalidSignature),
    };

    for candidate in signature_header.split(|c| c == ',' || c == '.') {
        let candidate = candidate.trim();
        if candidate.is_empty() {
            continue;
        }
        if let Ok(bytes) = hex::decode(candidate) {
            if bytes.ct_eq(&expected_bytes).into() {
                return Ok(());
            }
        }
    }
    Err(ProviderError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"whsec_test";
    const BODY: &[u8] = br#"{"type":"CARD_AUTH"}"#;

    fn headers(timestamp: u64, signature: String) -> WebhookHeaders {
        WebhookHeaders {
            signature: Some(signature),
            timestamp: Some(timestamp.to_string()),
        }
    }

    #[test]
    fn test_valid_signature_passes() {
        let now = 1_700_000_000;
        let sig = sign(SECRET, &now.to_string(), BODY);
        assert!(verify(SECRET, BODY, &headers(now, sig), now, DEFAULT_TOLERANCE_SECS).is_ok());
    }

    #[test]
    fn test_any_rotated_signature_passes() {
        let now = 1_700_000_000;
        let stale_secret = sign(b"whsec_old", &now.to_string(), BODY);
        let good = sign(SECRET, &now.to_string(), BODY);
        let header = format!("{},{}", stale_secret, good);
        assert!(verify(SECRET, BODY, &headers(now, header), now, DEFAULT_TOLERANCE_SECS).is_ok());
    }

    #[test]
    fn test_wrong_signature_fails() {
        let now = 1_700_000_000;
        let sig = sign(b"whsec_other", &now.to_string(), BODY);
        let err = verify(SECRET, BODY, &headers(now, sig), now, DEFAULT_TOLERANCE_SECS).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidSignature));
    }

    #[test]
    fn test_timestamp_outside_window_fails_both_directions() {
        let now = 1_700_000_000;
        for ts in [now - 301, now + 301] {
            let sig = sign(SECRET, &ts.to_string(), BODY);
            let err = verify(SECRET, BODY, &headers(ts, sig), now, DEFAULT_TOLERANCE_SECS).unwrap_err();
            assert!(matches!(err, ProviderError::StaleTimestamp));
        }
        // The edge of the window is still accepted.
        let sig = sign(SECRET, &(now - 300).to_string(), BODY);
        assert!(verify(SECRET, BODY, &headers(now - 300, sig), now, DEFAULT_TOLERANCE_SECS).is_ok());
    }

    #[test]
    fn test_missing_headers_fail() {
        let err = verify(SECRET, BODY, &WebhookHeaders::default(), 0, DEFAULT_TOLERANCE_SECS)
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidSignature));
    }

    #[test]
    fn test_tampered_body_fails() {
        let now = 1_700_000_000;
        let sig = sign(SECRET, &now.to_string(), BODY);
        let err = verify(SECRET, b"{}", &headers(now, sig), now, DEFAULT_TOLERANCE_SECS).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidSignature));
    }
}
