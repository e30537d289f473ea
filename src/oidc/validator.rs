// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! OIDC ID token validation: algorithm, issuer, audience, expiry, signature,
//! and subject checks, in that order, producing canonical claims.

use super::jwks::JwksClient;
use super::roles::{map_role, RoleMapping};
use super::OidcError;
use crate::crypto::{self, RsaAlg};
use crate::users::Role;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct CanonicalClaims {
    pub user_id: String,
    pub username: String,
    pub role: Role,
    pub expires_at: i64,
    pub issued_at: i64,
}

pub struct TokenValidator {
    issuer: String,
    client_id: String,
    extra_audiences: Vec<String>,
    jwks_uri: String,
    jwks: JwksClient,
    role_mappings: Vec<RoleMapping>,
    default_role: Role,
}

impl TokenValidator {
    /// `jwks_cache_ttl` governs how long a fetched key is trusted before
    /// `get_key` refetches; see [`JwksClient::with_ttl`].
    pub fn new(
        issuer: impl Into<String>,
        client_id: impl Into<String>,
        extra_audiences: Vec<String>,
        jwks_uri: impl Into<String>,
        role_mappings: Vec<RoleMapping>,
        default_role: Role,
        jwks_cache_ttl: Duration,
    ) -> Self {
        Self {
            issuer: issuer.into(),
            client_id: client_id.into(),
            extra_audiences,
            jwks_uri: jwks_uri.into(),
            jwks: JwksClient::with_ttl(jwks_cache_ttl),
            role_mappings,
            default_role,
        }
    }

    pub fn validate(&self, token: &str) -> Result<CanonicalClaims, OidcError> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() != 3 {
            return Err(OidcError::MalformedToken("expected 3 dot-separated parts".to_string()));
        }
        let header_bytes = crypto::b64url_decode(parts[0])
            .map_err(|e| OidcError::MalformedToken(e.to_string()))?;
        let payload_bytes = crypto::b64url_decode(parts[1])
            .map_err(|e| OidcError::MalformedToken(e.to_string()))?;
        let signature = crypto::b64url_decode(parts[2])
            .map_err(|e| OidcError::MalformedToken(e.to_string()))?;

        let header: Value = serde_json::from_slice(&header_bytes)
            .map_err(|e| OidcError::MalformedToken(e.to_string()))?;
        let raw_claims: HashMap<String, Value> = serde_json::from_slice(&payload_bytes)
            .map_err(|e| OidcError::MalformedToken(e.to_string()))?;

        // 1. Algorithm supported.
        let alg_str = header.get("alg").and_then(Value::as_str).unwrap_or("");
        let alg = RsaAlg::from_jwt_alg(alg_str).ok_or(OidcError::UnsupportedAlgorithm)?;

        // 2. Issuer matches (trailing slash tolerated).
        let iss = raw_claims.get("iss").and_then(Value::as_str).unwrap_or("");
        if iss.trim_end_matches('/') != self.issuer.trim_end_matches('/') {
            return Err(OidcError::InvalidIssuer);
        }

        // 3. Audience matches client id or an allowed extra audience.
        let accepted: Vec<&str> = std::iter::once(self.client_id.as_str())
            .chain(self.extra_audiences.iter().map(String::as_str))
            .collect();
        if !audience_matches(raw_claims.get("aud"), &accepted) {
            return Err(OidcError::InvalidAudience);
        }

        // 4. exp in the future.
        let exp = raw_claims
            .get("exp")
            .and_then(Value::as_i64)
            .ok_or_else(|| OidcError::MalformedToken("missing exp".to_string()))?;
        if exp <= Utc::now().timestamp() {
            return Err(OidcError::Expired);
        }

        // 5. Signature verifies via JWKS kid lookup.
        let kid = header
            .get("kid")
            .and_then(Value::as_str)
            .ok_or_else(|| OidcError::MalformedToken("missing kid".to_string()))?;
        let key = self.jwks.get_key(&self.jwks_uri, kid)?;
        let signing_input = format!("{}.{}", parts[0], parts[1]);
        crypto::rsa_verify(alg, &signing_input, &signature, &key.n, &key.e)
            .map_err(|_| OidcError::InvalidSignature)?;

        // 6. sub non-empty.
        let sub = raw_claims.get("sub").and_then(Value::as_str).unwrap_or("");
        if sub.is_empty() {
            return Err(OidcError::MissingSubject);
        }

        let username = raw_claims
            .get("preferred_username")
            .and_then(Value::as_str)
            .or_else(|| raw_claims.get("email").and_then(Value::as_str))
            .or_else(|| raw_claims.get("name").and_then(Value::as_str))
            .unwrap_or(sub)
            .to_string();

        let typed_claims = build_typed_claims(&raw_claims);
        let role = map_role(&self.role_mappings, &typed_claims, &raw_claims, self.default_role);

        let iat = raw_claims.get("iat").and_then(Value::as_i64).unwrap_or(0);

        Ok(CanonicalClaims {
            user_id: sub.to_string(),
            username,
            role,
            expires_at: exp,
            issued_at: iat,
        })
    }
}

fn audience_matches(aud: Option<&Value>, accepted: &[&str]) -> bool {
    match aud {
        Some(Value::String(s)) => accepted.contains(&s.as_str()),
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(Value::as_str)
            .any(|s| accepted.contains(&s)),
        _ => false,
    }
}

fn build_typed_claims(raw: &HashMap<String, Value>) -> HashMap<String, Value> {
    const WELL_KNOWN: &[&str] = &[
        "groups",
        "roles",
        "email",
        "email_verified",
        "sub",
        "iss",
        "preferred_username",
        "name",
    ];
    let mut typed = HashMap::new();
    for key in WELL_KNOWN {
        if let Some(v) = raw.get(*key) {
            typed.insert((*key).to_string(), v.clone());
        }
    }
    typed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audience_string_match() {
        let v = Value::String("client-123".to_string());
        assert!(audience_matches(Some(&v), &["client-123", "extra-aud"]));
    }

    #[test]
    fn test_audience_array_match() {
        let v = serde_json::json!(["other-client", "client-123"]);
        assert!(audience_matches(Some(&v), &["client-123"]));
    }

    #[test]
    fn test_audience_no_match() {
        let v = Value::String("unknown-client".to_string());
        assert!(!audience_matches(Some(&v), &["client-123"]));
    }

    #[test]
    fn test_malformed_token_wrong_part_count() {
        let validator = TokenValidator::new(
            "https://idp.example.com",
            "client-123",
            vec![],
            "https://idp.example.com/jwks",
            vec![],
            Role::Viewer,
            Duration::from_secs(3600),
        );
        assert!(matches!(
            validator.validate("only.two"),
            Err(OidcError::MalformedToken(_))
        ));
    }
}
