// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! graphdb-trust - Trust, access, and audit core for a multi-tenant graph
//! database server
//!
//! Provides local password authentication, OIDC token validation, API key
//! issuance, tamper-evident audit logging, and per-tenant quota tracking
//! behind a synchronous, in-memory core.
//!
//! # Core Modules
//!
//! - [`crypto`] - Password hashing, HMAC/SHA-256, RSA signature verification
//! - [`tenant`] - Tenant registry, quotas, usage tracking
//! - [`users`] - Local user store, roles, OIDC identity linking
//! - [`apikeys`] - API key issuance, validation, revocation
//! - [`tokens`] - Local HS256 access/refresh token issuance and verification
//! - [`oidc`] - OIDC discovery, JWKS caching, ID token validation, CSRF state
//! - [`composition`] - First-match-wins validator chain over local and OIDC
//! - [`audit`] - Tamper-evident, hash-chained audit logging
//! - [`config`] - Environment-derived configuration
//! - [`security`] - Lock-poisoning-resilient primitives shared by every store
//! - [`error`] - Consistent CLI error formatting utilities
//! - [`errors`] - IL5-style sanitized, user-facing error responses

pub mod apikeys;
pub mod audit;
pub mod composition;
pub mod config;
pub mod crypto;
pub mod error;
pub mod errors;
pub mod oidc;
pub mod security;
pub mod tenant;
pub mod tokens;
pub mod trust_error;
pub mod users;
pub mod utils;

// Re-export crypto primitives
pub use crypto::{CryptoError, RsaAlg, BCRYPT_COST};

// Re-export tenant types
pub use tenant::{Quota, Tenant, TenantError, TenantRegistry, TenantStatus};

// Re-export user store types
pub use users::{OidcIdentity, Role, User, UserStore, UserStoreError};

// Re-export API key types
pub use apikeys::{ApiKey, ApiKeyError, ApiKeyStore, Environment, Permission};

// Re-export token manager types
pub use tokens::{AccessClaims, RefreshClaims, TokenError, TokenManager};

// Re-export OIDC types
pub use oidc::{
    DiscoveryClient, DiscoveryDocument, JwksClient, OidcError, OidcTokenValidator,
    RoleMapping, StateEntry, StateStore, map_role,
};

// Re-export composition types
pub use composition::{
    CompositionError, LocalValidator, OidcValidator, TokenValidator, ValidatedIdentity,
    ValidatorChain,
};

// Re-export audit types
pub use audit::{Action, AuditError, BufferedLogger, Event, Logger, PersistentEvent, PersistentLogger,
    PersistentLoggerConfig, ResourceType, Severity, Status};

// Re-export configuration types
pub use config::{ConfigError, OidcConfig, TrustConfig};

// Re-export CLI error formatting utilities
pub use error::{format_error, format_simple_error, ErrorBuilder, GITHUB_ISSUES_URL};

// Re-export sanitized, user-facing error handling
pub use errors::{
    contains_sensitive_info, generate_reference_code, map_anyhow_error, map_error, map_io_error,
    sanitize_error_details, ApiResult, ErrorResponse, UserError,
};

// Re-export the crate-wide internal error and its boundary mapping
pub use trust_error::TrustError;

// Re-export lock-poisoning-resilient primitives
pub use security::{resilient_read, resilient_write, try_resilient_read, try_resilient_write};

pub use utils::mask_sensitive;
