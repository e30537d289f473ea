// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Local HS256 access/refresh token issuance and verification.

use crate::users::Role;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("secret must be at least 32 bytes")]
    ShortSecret,
    #[error("malformed token")]
    Malformed,
    #[error("unsupported signing method")]
    UnsupportedAlgorithm,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("missing or empty required claim")]
    MissingClaim,
    #[error("token expired")]
    Expired,
    #[error("wrong token type for refresh validation")]
    WrongType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub user_id: String,
    pub username: String,
    pub role: String,
    pub expires_at: i64,
    pub issued_at: i64,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub user_id: String,
    pub expires_at: i64,
    pub issued_at: i64,
    pub exp: i64,
    pub iat: i64,
    #[serde(rename = "type")]
    pub token_type: String,
}

/// Issues and verifies locally-signed HS256 tokens. The signing secret is
/// fixed at construction time.
pub struct TokenManager {
    secret: Vec<u8>,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenManager {
    pub fn new(secret: Vec<u8>) -> Result<Self, TokenError> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(TokenError::ShortSecret);
        }
        Ok(Self {
            secret,
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(30),
        })
    }

    pub fn with_ttls(mut self, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        self.access_ttl = access_ttl;
        self.refresh_ttl = refresh_ttl;
        self
    }

    /// Role is validated against the known role set here, at issuance;
    /// verification trusts the signature and does not re-check it.
    pub fn issue_access_token(
        &self,
        user_id: &str,
        username: &str,
        role: Role,
    ) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = AccessClaims {
            user_id: user_id.to_string(),
            username: username.to_string(),
            role: role.as_str().to_string(),
            expires_at: (now + self.access_ttl).timestamp(),
            issued_at: now.timestamp(),
            exp: (now + self.access_ttl).timestamp(),
            iat: now.timestamp(),
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|_| TokenError::Malformed)
    }

    pub fn issue_refresh_token(&self, user_id: &str) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = RefreshClaims {
            user_id: user_id.to_string(),
            expires_at: (now + self.refresh_ttl).timestamp(),
            issued_at: now.timestamp(),
            exp: (now + self.refresh_ttl).timestamp(),
            iat: now.timestamp(),
            token_type: "refresh".to_string(),
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(&self.secret))
            .map_err(|_| TokenError::Malformed)
    }

    pub fn verify_access_token(&self, token: &str) -> Result<AccessClaims, TokenError> {
        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.algorithms = vec![jsonwebtoken::Algorithm::HS256];
        let data = decode::<AccessClaims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map_err(classify_jwt_error)?;
        let claims = data.claims;
        if claims.user_id.is_empty() || claims.username.is_empty() || claims.role.is_empty() {
            return Err(TokenError::MissingClaim);
        }
        if claims.exp <= Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        let mut validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        validation.algorithms = vec![jsonwebtoken::Algorithm::HS256];
        let data = decode::<RefreshClaims>(token, &DecodingKey::from_secret(&self.secret), &validation)
            .map_err(classify_jwt_error)?;
        let claims = data.claims;
        if claims.user_id.is_empty() {
            return Err(TokenError::MissingClaim);
        }
        if claims.token_type != "refresh" {
            return Err(TokenError::WrongType);
        }
        if claims.exp <= Utc::now().timestamp() {
            return Err(TokenError::Expired);
        }
        Ok(claims)
    }
}

fn classify_jwt_error(err: jsonwebtoken::errors::Error) -> TokenError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => TokenError::Expired,
        ErrorKind::InvalidSignature => TokenError::InvalidSignature,
        ErrorKind::InvalidAlgorithm => TokenError::UnsupportedAlgorithm,
        _ => TokenError::Malformed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> TokenManager {
        TokenManager::new(vec![0x42; 32]).unwrap()
    }

    #[test]
    fn test_short_secret_rejected() {
        assert_eq!(TokenManager::new(vec![0u8; 10]).unwrap_err(), TokenError::ShortSecret);
    }

    #[test]
    fn test_issue_and_verify_access_token() {
        let mgr = manager();
        let token = mgr.issue_access_token("user-1", "alice", Role::Editor).unwrap();
        let claims = mgr.verify_access_token(&token).unwrap();
        assert_eq!(claims.user_id, "user-1");
        assert_eq!(claims.role, "editor");
    }

    #[test]
    fn test_issue_and_verify_refresh_token() {
        let mgr = manager();
        let token = mgr.issue_refresh_token("user-1").unwrap();
        let claims = mgr.verify_refresh_token(&token).unwrap();
        assert_eq!(claims.token_type, "refresh");
    }

    #[test]
    fn test_refresh_validation_rejects_access_token() {
        let mgr = manager();
        let token = mgr.issue_access_token("user-1", "alice", Role::Viewer).unwrap();
        assert!(mgr.verify_refresh_token(&token).is_err());
    }

    #[test]
    fn test_expired_access_token() {
        let mgr = TokenManager::new(vec![0x42; 32])
            .unwrap()
            .with_ttls(Duration::seconds(-1), Duration::days(30));
        let token = mgr.issue_access_token("user-1", "alice", Role::Viewer).unwrap();
        assert_eq!(mgr.verify_access_token(&token), Err(TokenError::Expired));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let mgr1 = TokenManager::new(vec![0x11; 32]).unwrap();
        let mgr2 = TokenManager::new(vec![0x22; 32]).unwrap();
        let token = mgr1.issue_access_token("user-1", "alice", Role::Viewer).unwrap();
        assert_eq!(mgr2.verify_access_token(&token), Err(TokenError::InvalidSignature));
    }
}
