// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Composition layer: a first-match-wins chain of token validators (local,
//! then OIDC), producing one canonical identity regardless of which
//! validator accepted the token.

use crate::oidc::OidcTokenValidator;
use crate::tokens::TokenManager;
use crate::users::Role;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompositionError {
    #[error("no validator matched")]
    NoValidatorMatched,
}

#[derive(Debug, Clone)]
pub struct ValidatedIdentity {
    pub user_id: String,
    pub username: String,
    pub role: Role,
}

/// Common contract for anything that can turn a bearer token string into a
/// validated identity. Local and OIDC validators each implement this so the
/// chain can try them in order without knowing which kind succeeded.
pub trait TokenValidator: Send + Sync {
    fn try_validate(&self, token: &str) -> Option<ValidatedIdentity>;
}

/// Adapts the local HS256 [`TokenManager`] to the [`TokenValidator`]
/// contract.
pub struct LocalValidator {
    manager: TokenManager,
}

impl LocalValidator {
    pub fn new(manager: TokenManager) -> Self {
        Self { manager }
    }
}

impl TokenValidator for LocalValidator {
    fn try_validate(&self, token: &str) -> Option<ValidatedIdentity> {
        let claims = self.manager.verify_access_token(token).ok()?;
        let role = crate::users::Role::parse(&claims.role).ok()?;
        Some(ValidatedIdentity {
            user_id: claims.user_id,
            username: claims.username,
            role,
        })
    }
}

/// Adapts the OIDC [`OidcTokenValidator`] to the [`TokenValidator`]
/// contract.
pub struct OidcValidator {
    validator: OidcTokenValidator,
}

impl OidcValidator {
    pub fn new(validator: OidcTokenValidator) -> Self {
        Self { validator }
    }
}

impl TokenValidator for OidcValidator {
    fn try_validate(&self, token: &str) -> Option<ValidatedIdentity> {
        let claims = self.validator.validate(token).ok()?;
        Some(ValidatedIdentity {
            user_id: claims.user_id,
            username: claims.username,
            role: claims.role,
        })
    }
}

/// Tries each validator in order, local first; first success wins.
pub struct ValidatorChain {
    validators: Vec<Box<dyn TokenValidator>>,
}

impl ValidatorChain {
    pub fn new(validators: Vec<Box<dyn TokenValidator>>) -> Self {
        Self { validators }
    }

    pub fn validate(&self, token: &str) -> Result<ValidatedIdentity, CompositionError> {
        for validator in &self.validators {
            if let Some(identity) = validator.try_validate(token) {
                return Ok(identity);
            }
        }
        Err(CompositionError::NoValidatorMatched)
    }
}
