//! Bearer token verification.
//!
//! Tokens are `base64url(subject|expires|hex(hmac_sha256(subject|expires)))`
//! where `subject` is the decimal user id and `expires` a Unix timestamp in
//! seconds.

use base64::Engine;
use hmac::{Hmac, Mac};
use murmur_types::UserId;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Reasons a bearer token is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("token is not readable")]
    Malformed,
    #[error("token signature does not match")]
    BadSignature,
    #[error("token expired at {0}")]
    Expired(i64),
    #[error("token signing key is unusable")]
    InvalidKey,
}

/// Verifies a bearer credential and extracts its subject.
///
/// Implementations must be cheap and non-blocking: the handshake calls this
/// on the async runtime under a timeout.
pub trait TokenService: Send + Sync {
    fn validate(&self, token: &str) -> Result<UserId, TokenError>;
}

/// HMAC-SHA256 signed tokens with an embedded expiry.
#[derive(Clone)]
pub struct SignedTokenService {
    secret: Vec<u8>,
}

impl std::fmt::Debug for SignedTokenService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedTokenService").finish_non_exhaustive()
    }
}

impl SignedTokenService {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Issues a token for `user_id` valid for `ttl_secs` from now.
    pub fn issue(&self, user_id: UserId, ttl_secs: u64) -> Result<String, TokenError> {
        let ttl = i64::try_from(ttl_secs).map_err(|_| TokenError::Malformed)?;
        self.issue_expiring_at(user_id, chrono::Utc::now().timestamp().saturating_add(ttl))
    }

    /// Issues a token with an explicit expiry timestamp.
    pub fn issue_expiring_at(&self, user_id: UserId, expires: i64) -> Result<String, TokenError> {
        let payload = format!("{user_id}|{expires}");
        let signature = self.mac(&payload)?.finalize().into_bytes();
        let token = format!("{payload}|{}", hex::encode(signature));
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(token.as_bytes()))
    }

    fn mac(&self, payload: &str) -> Result<HmacSha256, TokenError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).map_err(|_| TokenError::InvalidKey)?;
        mac.update(payload.as_bytes());
        Ok(mac)
    }
}

impl TokenService for SignedTokenService {
    fn validate(&self, token: &str) -> Result<UserId, TokenError> {
        let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(token.trim().as_bytes())
            .map_err(|_| TokenError::Malformed)?;
        let decoded = String::from_utf8(decoded).map_err(|_| TokenError::Malformed)?;

        let mut parts = decoded.splitn(3, '|');
        let (Some(subject), Some(expires), Some(sig_hex)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };

        let provided = hex::decode(sig_hex).map_err(|_| TokenError::Malformed)?;
        self.mac(&format!("{subject}|{expires}"))?
            .verify_slice(&provided)
            .map_err(|_| TokenError::BadSignature)?;

        let expires: i64 = expires.parse().map_err(|_| TokenError::Malformed)?;
        if chrono::Utc::now().timestamp() > expires {
            return Err(TokenError::Expired(expires));
        }

        subject.parse().map_err(|_| TokenError::Malformed)
    }
}
