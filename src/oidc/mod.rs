// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! OpenID Connect validation: discovery, JWKS, ID token verification, role
//! mapping, and CSRF state for the authorization-code flow.

pub mod discovery;
pub mod jwks;
pub mod roles;
pub mod state;
pub mod validator;

pub use discovery::{DiscoveryClient, DiscoveryDocument};
pub use jwks::JwksClient;
pub use roles::{map_role, RoleMapping};
pub use state::{StateEntry, StateStore};
pub use validator::{CanonicalClaims, TokenValidator as OidcTokenValidator};

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OidcError {
    #[error("discovery document invalid or incomplete")]
    InvalidDiscoveryDocument,
    #[error("http request failed: {0}")]
    Http(String),
    #[error("response exceeded size cap")]
    ResponseTooLarge,
    #[error("jwks key not found for kid {0}")]
    KeyNotFound(String),
    #[error("malformed token: {0}")]
    MalformedToken(String),
    #[error("unsupported algorithm")]
    UnsupportedAlgorithm,
    #[error("invalid issuer")]
    InvalidIssuer,
    #[error("invalid audience")]
    InvalidAudience,
    #[error("missing subject")]
    MissingSubject,
    #[error("token expired")]
    Expired,
    #[error("invalid signature")]
    InvalidSignature,
}
