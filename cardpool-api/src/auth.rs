//! Bearer-token authentication collaborator. Tokens are opaque
//! `user.expiry.signature` strings signed with the shared secret; the
//! interface layer resolves them to a user id and nothing else.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use cardpool_common::utils::time::current_time;
use cardpool_common::{CardpoolError, Result};

type HmacSha256 = Hmac<Sha256>;

pub struct Authenticator {
    key: Vec<u8>,
}

impl Authenticator {
    pub fn new(secret: &str) -> Self {
        Self {
            key: secret.as_bytes().to_vec(),
        }
    }

    fn signature(&self, user_id: &str, expires_at: u64) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(user_id.as_bytes());
        mac.update(b".");
        mac.update(expires_at.to_string().as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Issues a token for a user. Used by tests and operational tooling; in
    /// production the external auth service mints these.
    pub fn issue(&self, user_id: &str, ttl_secs: u64) -> String {
        let expires_at = current_time() + ttl_secs;
        format!("{}.{}.{}", user_id, expires_at, self.signature(user_id, expires_at))
    }

    /// Resolves a raw token to its user id.
    pub fn verify(&self, token: &str) -> Result<String> {
        // The user id may itself contain dots; signature and expiry never do.
        let mut parts = token.rsplitn(3, '.');
        let signature = parts.next().unwrap_or_default();
        let expires_at: u64 = parts
            .next()
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| CardpoolError::Forbidden("malformed bearer token".to_string()))?;
        let user_id = parts
            .next()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| CardpoolError::Forbidden("malformed bearer token".to_string()))?;

        if expires_at < current_time() {
            return Err(CardpoolError::Forbidden("bearer token expired".to_string()));
        }
        let expected = self.signature(user_id, expires_at);
        let matches: bool = expected.as_bytes().ct_eq(signature.as_bytes()).into();
        if !matches {
            return Err(CardpoolError::Forbidden("invalid bearer token".to_string()));
        }
        Ok(user_id.to_string())
    }

    /// Pulls the token out of an `Authorization: Bearer ...` header value.
    pub fn verify_header(&self, header: Option<&str>) -> Result<String> {
        let header =
            header.ok_or_else(|| CardpoolError::Forbidden("missing bearer token".to_string()))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| CardpoolError::Forbidden("malformed authorization header".to_string()))?;
        self.verify(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let auth = Authenticator::new("s3cret");
        let token = auth.issue("alice", 3600);
        assert_eq!(auth.verify(&token).unwrap(), "alice");
        assert_eq!(
            auth.verify_header(Some(&format!("Bearer {}", token))).unwrap(),
            "alice"
        );
    }

    #[test]
    fn test_user_ids_with_dots_survive() {
        let auth = Authenticator::new("s3cret");
        let token = auth.issue("user.with.dots", 3600);
        assert_eq!(auth.verify(&token).unwrap(), "user.with.dots");
    }

    #[test]
    fn test_tampered_token_is_rejected() {
        let auth = Authenticator::new("s3cret");
        let token = auth.issue("alice", 3600);
        let tampered = token.replacen("alice", "admin", 1);
        assert!(auth.verify(&tampered).is_err());

        let other = Authenticator::new("other");
        assert!(other.verify(&token).is_err());
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let auth = Authenticator::new("s3cret");
        let expired_at = current_time() - 10;
        let token = format!("alice.{}.{}", expired_at, auth.signature("alice", expired_at));
        assert!(auth.verify(&token).is_err());
    }

    #[test]
    fn test_header_shapes() {
        let auth = Authenticator::new("s3cret");
        assert!(auth.verify_header(None).is_err());
        assert!(auth.verify_header(Some("Basic abc")).is_err());
        assert!(auth.verify_header(Some("Bearer not-a-token")).is_err());
    }
}
