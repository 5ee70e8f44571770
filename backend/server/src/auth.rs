//! # Authentication
//!
//! ## Credentials
//! Passwords are stored as bcrypt hashes. Hashing and verification run on the
//! blocking pool since bcrypt is deliberately slow.
//!
//! ## Tokens
//! HS256 JSON Web Tokens: `base64url(header).base64url(claims).base64url(mac)`
//! where `mac` is HMAC-SHA256 over the first two segments with the process
//! secret. Claims carry the identity, issue time and expiry.
//!
//! Tokens are stateless. Nothing is stored server-side, so there is no way to
//! revoke one: a leaked token stays valid until `exp`.
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tokio::task::spawn_blocking;
use uuid::Uuid;

use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

const HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

pub async fn hash_password(password: String, cost: u32) -> Result<String, AppError> {
    Ok(spawn_blocking(move || bcrypt::hash(password, cost)).await??)
}

/// Any failure, including a hash that does not parse, is a mismatch.
pub async fn verify_password(password: String, hash: String) -> bool {
    spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
        .await
        .unwrap_or(false)
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TokenError {
    #[error("signing key rejected")]
    InvalidKey,

    #[error("token is malformed")]
    Malformed,

    #[error("token signature does not match")]
    BadSignature,

    #[error("token has expired")]
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user: Uuid,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Clone)]
pub struct TokenIssuer {
    mac: HmacSha256,
    ttl_secs: i64,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], ttl_secs: u64) -> Result<Self, TokenError> {
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| TokenError::InvalidKey)?;
        let ttl_secs = i64::try_from(ttl_secs).map_err(|_| TokenError::InvalidKey)?;

        Ok(Self { mac, ttl_secs })
    }

    pub fn issue(&self, user: Uuid) -> String {
        self.issue_at(user, Utc::now().timestamp())
    }

    pub fn issue_at(&self, user: Uuid, issued_at: i64) -> String {
        let claims = Claims {
            user,
            iat: issued_at,
            exp: issued_at.saturating_add(self.ttl_secs),
        };

        // Claims is three plain fields; serializing it cannot fail.
        let payload = serde_json::to_vec(&claims).unwrap_or_default();
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(HEADER),
            URL_SAFE_NO_PAD.encode(payload)
        );

        let signature = URL_SAFE_NO_PAD.encode(self.sign(&signing_input));

        format!("{signing_input}.{signature}")
    }

    pub fn verify(&self, token: &str) -> Result<Uuid, TokenError> {
        self.verify_at(token, Utc::now().timestamp())
    }

    /// Signature first, then shape, then expiry. Claims are only parsed once
    /// the signature checks out.
    pub fn verify_at(&self, token: &str, now: i64) -> Result<Uuid, TokenError> {
        let mut segments = token.split('.');

        let (Some(header), Some(payload), Some(signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(TokenError::Malformed);
        };

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| TokenError::Malformed)?;

        let mut mac = self.mac.clone();
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| TokenError::BadSignature)?;

        let header = URL_SAFE_NO_PAD
            .decode(header)
            .map_err(|_| TokenError::Malformed)?;
        if header != HEADER.as_bytes() {
            return Err(TokenError::Malformed);
        }

        let payload = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| TokenError::Malformed)?;
        let claims: Claims = serde_json::from_slice(&payload).map_err(|_| TokenError::Malformed)?;

        if now >= claims.exp {
            return Err(TokenError::Expired);
        }

        Ok(claims.user)
    }

    fn sign(&self, signing_input: &str) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(signing_input.as_bytes());

        mac.finalize().into_bytes().to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: u64 = 100_000;

    fn issuer(secret: &[u8]) -> TokenIssuer {
        TokenIssuer::new(secret, TTL).unwrap()
    }

    #[test]
    fn test_round_trip_before_expiry() {
        let tokens = issuer(b"secret");
        let user = Uuid::new_v4();

        let token = tokens.issue_at(user, 1_000);

        assert_eq!(tokens.verify_at(&token, 1_000), Ok(user));
        assert_eq!(tokens.verify_at(&token, 1_000 + TTL as i64 - 1), Ok(user));
    }

    #[test]
    fn test_expired() {
        let tokens = issuer(b"secret");
        let token = tokens.issue_at(Uuid::new_v4(), 1_000);

        assert_eq!(
            tokens.verify_at(&token, 1_000 + TTL as i64),
            Err(TokenError::Expired)
        );
    }

    #[test]
    fn test_other_key_rejected() {
        let token = issuer(b"secret").issue(Uuid::new_v4());

        assert_eq!(
            issuer(b"another secret").verify(&token),
            Err(TokenError::BadSignature)
        );
    }

    #[test]
    fn test_tampered_claims_rejected() {
        let tokens = issuer(b"secret");
        let token = tokens.issue(Uuid::new_v4());

        let forged_claims = URL_SAFE_NO_PAD.encode(
            serde_json::to_vec(&Claims {
                user: Uuid::new_v4(),
                iat: 0,
                exp: i64::MAX,
            })
            .unwrap(),
        );

        let parts: Vec<&str> = token.split('.').collect();
        let forged = format!("{}.{}.{}", parts[0], forged_claims, parts[2]);

        assert_eq!(tokens.verify(&forged), Err(TokenError::BadSignature));
    }

    #[test]
    fn test_malformed() {
        let tokens = issuer(b"secret");

        assert_eq!(tokens.verify(""), Err(TokenError::Malformed));
        assert_eq!(tokens.verify("a.b"), Err(TokenError::Malformed));
        assert_eq!(tokens.verify("a.b.c.d"), Err(TokenError::Malformed));
        assert_eq!(tokens.verify("a.b.!!!"), Err(TokenError::Malformed));
    }

    #[tokio::test]
    async fn test_password_hash_verify() {
        let hash = hash_password("hunter22".into(), 4).await.unwrap();

        assert_ne!(hash, "hunter22");
        assert!(verify_password("hunter22".into(), hash.clone()).await);
        assert!(!verify_password("hunter23".into(), hash).await);
        assert!(!verify_password("hunter22".into(), "not a hash".into()).await);
    }
}
