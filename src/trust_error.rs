// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Crate-wide internal error, composing every subsystem's typed error into
//! one enum, and its boundary mapping into the sanitized, outward
//! [`crate::errors::UserError`].

use crate::apikeys::ApiKeyError;
use crate::audit::AuditError;
use crate::crypto::CryptoError;
use crate::errors::UserError;
use crate::oidc::OidcError;
use crate::tenant::TenantError;
use crate::tokens::TokenError;
use crate::users::UserStoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrustError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),
    #[error(transparent)]
    User(#[from] UserStoreError),
    #[error(transparent)]
    ApiKey(#[from] ApiKeyError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Oidc(#[from] OidcError),
    #[error(transparent)]
    Audit(#[from] AuditError),
    #[error(transparent)]
    Tenant(#[from] TenantError),
}

/// Maps every internal error variant to its outward, sanitized counterpart.
/// Credential failures never distinguish cause; state/nonce/signature
/// failures collapse to one authentication-failed error; quota violations
/// get their own variant so callers can act on them (e.g. backoff).
impl From<TrustError> for UserError {
    fn from(err: TrustError) -> Self {
        match err {
            TrustError::Crypto(e) => UserError::internal_error(&e.to_string()),
            TrustError::User(e) => {
                let text = e.to_string();
                match e {
                    UserStoreError::NotFound => UserError::invalid_credentials(&text),
                    _ => UserError::invalid_request(&text, None, Some(&text)),
                }
            }
            TrustError::ApiKey(e) => {
                let text = e.to_string();
                match e {
                    ApiKeyError::NotFound | ApiKeyError::Revoked | ApiKeyError::Expired => {
                        UserError::invalid_credentials(&text)
                    }
                    _ => UserError::invalid_request(&text, None, Some(&text)),
                }
            }
            TrustError::Token(e) => {
                let text = e.to_string();
                match e {
                    TokenError::Expired => UserError::session_expired(),
                    TokenError::InvalidSignature | TokenError::Malformed | TokenError::WrongType => {
                        UserError::authentication_failed(&text)
                    }
                    _ => UserError::invalid_request(&text, None, Some(&text)),
                }
            }
            TrustError::Oidc(e) => UserError::authentication_failed(&e.to_string()),
            TrustError::Audit(e) => UserError::internal_error(&e.to_string()),
            TrustError::Tenant(e) => {
                let text = e.to_string();
                match e {
                    TenantError::QuotaExceeded => UserError::quota_exceeded(&text),
                    TenantError::Suspended | TenantError::Deleted | TenantError::NotFound => {
                        UserError::authorization_denied(Some(&text))
                    }
                    _ => UserError::invalid_request(&text, None, Some(&text)),
                }
            }
        }
    }
}
