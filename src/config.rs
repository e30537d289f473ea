// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Environment-derived configuration for OIDC and the API key environment
//! prefix.

use crate::oidc::{OidcTokenValidator, RoleMapping};
use crate::users::Role;
use std::time::Duration;
use thiserror::Error;

const MIN_JWKS_CACHE_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("OIDC_ISSUER is required when OIDC_ENABLED=true")]
    MissingIssuer,
    #[error("OIDC_CLIENT_ID is required when OIDC_ENABLED=true")]
    MissingClientId,
    #[error("OIDC_ROLE_MAPPINGS is not valid JSON: {0}")]
    InvalidRoleMappings(String),
    #[error("OIDC_JWKS_CACHE_TTL is not a valid duration: {0}")]
    InvalidJwksCacheTtl(String),
    #[error("OIDC_DEFAULT_ROLE is not a recognized role: {0}")]
    InvalidDefaultRole(String),
}

#[derive(Debug, Clone)]
pub struct OidcConfig {
    pub issuer: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: Option<String>,
    pub scopes: Vec<String>,
    pub default_role: String,
    pub jwks_cache_ttl: Duration,
    pub allowed_audiences: Vec<String>,
    pub role_mappings: Vec<RoleMapping>,
}

#[derive(Debug, Clone)]
pub struct TrustConfig {
    pub oidc: Option<OidcConfig>,
    pub environment: String,
}

impl TrustConfig {
    /// Read every environment variable this crate consumes and build a
    /// validated configuration. OIDC settings are only parsed (and only
    /// required) when `OIDC_ENABLED=true`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = std::env::var("GRAPHDB_ENV").unwrap_or_else(|_| "development".to_string());
        let oidc_enabled = std::env::var("OIDC_ENABLED")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let oidc = if oidc_enabled {
            Some(OidcConfig::from_env()?)
        } else {
            None
        };

        Ok(Self { oidc, environment })
    }
}

impl OidcConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let issuer = std::env::var("OIDC_ISSUER").map_err(|_| ConfigError::MissingIssuer)?;
        let client_id = std::env::var("OIDC_CLIENT_ID").map_err(|_| ConfigError::MissingClientId)?;
        let client_secret = std::env::var("OIDC_CLIENT_SECRET").ok();
        let redirect_uri = std::env::var("OIDC_REDIRECT_URI").ok();

        let scopes = std::env::var("OIDC_SCOPES")
            .unwrap_or_else(|_| "openid,profile,email".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let default_role = std::env::var("OIDC_DEFAULT_ROLE").unwrap_or_else(|_| "viewer".to_string());

        let jwks_cache_ttl = match std::env::var("OIDC_JWKS_CACHE_TTL") {
            Ok(raw) => {
                let secs = parse_duration_secs(&raw).map_err(ConfigError::InvalidJwksCacheTtl)?;
                Duration::from_secs(secs).max(MIN_JWKS_CACHE_TTL)
            }
            Err(_) => Duration::from_secs(60 * 60),
        };

        let allowed_audiences = std::env::var("OIDC_ALLOWED_AUDIENCES")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let role_mappings = match std::env::var("OIDC_ROLE_MAPPINGS") {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| ConfigError::InvalidRoleMappings(e.to_string()))?,
            Err(_) => Vec::new(),
        };

        Ok(Self {
            issuer,
            client_id,
            client_secret,
            redirect_uri,
            scopes,
            default_role,
            jwks_cache_ttl,
            allowed_audiences,
            role_mappings,
        })
    }

    /// Builds the OIDC token validator this config describes. `jwks_uri` is
    /// supplied by the caller (typically the issuer's discovered JWKS
    /// endpoint) rather than stored here, since discovery is a separate,
    /// network-backed concern from environment parsing.
    pub fn build_validator(&self, jwks_uri: impl Into<String>) -> Result<OidcTokenValidator, ConfigError> {
        let default_role = Role::parse(&self.default_role)
            .map_err(|_| ConfigError::InvalidDefaultRole(self.default_role.clone()))?;
        Ok(OidcTokenValidator::new(
            self.issuer.clone(),
            self.client_id.clone(),
            self.allowed_audiences.clone(),
            jwks_uri,
            self.role_mappings.clone(),
            default_role,
            self.jwks_cache_ttl,
        ))
    }
}

/// Parses durations of the form `90s`, `15m`, `1h`, `2d`, or a bare integer
/// (seconds), matching the style used for `OIDC_JWKS_CACHE_TTL`.
fn parse_duration_secs(raw: &str) -> Result<u64, String> {
    let raw = raw.trim();
    if let Ok(n) = raw.parse::<u64>() {
        return Ok(n);
    }
    let (digits, unit) = raw.split_at(raw.len().saturating_sub(1));
    let n: u64 = digits.parse().map_err(|_| format!("cannot parse duration {raw:?}"))?;
    match unit {
        "s" => Ok(n),
        "m" => Ok(n * 60),
        "h" => Ok(n * 60 * 60),
        "d" => Ok(n * 60 * 60 * 24),
        _ => Err(format!("unknown duration unit in {raw:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration_variants() {
        assert_eq!(parse_duration_secs("90").unwrap(), 90);
        assert_eq!(parse_duration_secs("15m").unwrap(), 900);
        assert_eq!(parse_duration_secs("1h").unwrap(), 3600);
        assert_eq!(parse_duration_secs("2d").unwrap(), 172800);
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration_secs("bogus").is_err());
    }

    #[test]
    fn test_jwks_ttl_has_minimum() {
        std::env::set_var("OIDC_ENABLED", "true");
        std::env::set_var("OIDC_ISSUER", "https://idp.example.com");
        std::env::set_var("OIDC_CLIENT_ID", "client-123");
        std::env::set_var("OIDC_JWKS_CACHE_TTL", "1s");
        let config = TrustConfig::from_env().unwrap();
        assert_eq!(config.oidc.unwrap().jwks_cache_ttl, MIN_JWKS_CACHE_TTL);
        std::env::remove_var("OIDC_ENABLED");
        std::env::remove_var("OIDC_ISSUER");
        std::env::remove_var("OIDC_CLIENT_ID");
        std::env::remove_var("OIDC_JWKS_CACHE_TTL");
    }

    #[test]
    fn test_oidc_disabled_by_default() {
        std::env::remove_var("OIDC_ENABLED");
        let config = TrustConfig::from_env().unwrap();
        assert!(config.oidc.is_none());
    }

    #[test]
    fn test_build_validator_uses_configured_ttl() {
        let config = OidcConfig {
            issuer: "https://idp.example.com".to_string(),
            client_id: "client-123".to_string(),
            client_secret: None,
            redirect_uri: None,
            scopes: vec!["openid".to_string()],
            default_role: "editor".to_string(),
            jwks_cache_ttl: Duration::from_secs(120),
            allowed_audiences: vec![],
            role_mappings: vec![],
        };
        assert!(config.build_validator("https://idp.example.com/jwks").is_ok());
    }

    #[test]
    fn test_build_validator_rejects_unknown_default_role() {
        let config = OidcConfig {
            issuer: "https://idp.example.com".to_string(),
            client_id: "client-123".to_string(),
            client_secret: None,
            redirect_uri: None,
            scopes: vec![],
            default_role: "superuser".to_string(),
            jwks_cache_ttl: Duration::from_secs(3600),
            allowed_audiences: vec![],
            role_mappings: vec![],
        };
        assert!(matches!(
            config.build_validator("https://idp.example.com/jwks"),
            Err(ConfigError::InvalidDefaultRole(_))
        ));
    }
}
