// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! OIDC Discovery 1.0 client with per-issuer TTL caching and stale-on-failure
//! fallback.

use super::OidcError;
use crate::security::locks::{resilient_read, resilient_write};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::sync::RwLock;
use std::time::{Duration, Instant};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RESPONSE_BYTES: u64 = 1024 * 1024;
const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    pub issuer: String,
    pub jwks_uri: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

struct CacheEntry {
    document: DiscoveryDocument,
    fetched_at: Instant,
}

pub struct DiscoveryClient {
    http: reqwest::blocking::Client,
    ttl: Duration,
    cache: RwLock<HashMap<String, CacheEntry>>,
}

impl DiscoveryClient {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            http: reqwest::blocking::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .expect("reqwest client builds with static config"),
            ttl,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch (or return a fresh cached copy of) the discovery document for
    /// `issuer`. On fetch failure, a stale cached copy is returned if one
    /// exists; otherwise the error surfaces.
    pub fn get(&self, issuer: &str) -> Result<DiscoveryDocument, OidcError> {
        if let Some(doc) = self.fresh_cached(issuer) {
            return Ok(doc);
        }

        match self.fetch(issuer) {
            Ok(doc) => {
                let mut cache = resilient_write(&self.cache);
                cache.insert(
                    issuer.to_string(),
                    CacheEntry {
                        document: doc.clone(),
                        fetched_at: Instant::now(),
                    },
                );
                Ok(doc)
            }
            Err(e) => {
                let cache = resilient_read(&self.cache);
                if let Some(entry) = cache.get(issuer) {
                    tracing::warn!(target: "oidc", issuer, "discovery fetch failed, serving stale cache");
                    return Ok(entry.document.clone());
                }
                Err(e)
            }
        }
    }

    fn fresh_cached(&self, issuer: &str) -> Option<DiscoveryDocument> {
        let cache = resilient_read(&self.cache);
        let entry = cache.get(issuer)?;
        if entry.fetched_at.elapsed() < self.ttl {
            Some(entry.document.clone())
        } else {
            None
        }
    }

    fn fetch(&self, issuer: &str) -> Result<DiscoveryDocument, OidcError> {
        let trimmed = issuer.trim_end_matches('/');
        let url = format!("{trimmed}/.well-known/openid-configuration");
        let mut response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .map_err(|e| OidcError::Http(e.to_string()))?;

        let mut buf = Vec::new();
        let mut limited = response.by_ref().take(MAX_RESPONSE_BYTES + 1);
        limited
            .read_to_end(&mut buf)
            .map_err(|e| OidcError::Http(e.to_string()))?;
        if buf.len() as u64 > MAX_RESPONSE_BYTES {
            return Err(OidcError::ResponseTooLarge);
        }

        let document: DiscoveryDocument =
            serde_json::from_slice(&buf).map_err(|_| OidcError::InvalidDiscoveryDocument)?;

        let issuer_matches = document.issuer.trim_end_matches('/') == trimmed;
        if !issuer_matches
            || document.jwks_uri.is_empty()
            || document.authorization_endpoint.is_empty()
            || document.token_endpoint.is_empty()
        {
            return Err(OidcError::InvalidDiscoveryDocument);
        }

        Ok(document)
    }
}

impl Default for DiscoveryClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issuer_trailing_slash_tolerated() {
        let client = DiscoveryClient::new();
        let doc = DiscoveryDocument {
            issuer: "https://idp.example.com".to_string(),
            jwks_uri: "https://idp.example.com/jwks".to_string(),
            authorization_endpoint: "https://idp.example.com/authorize".to_string(),
            token_endpoint: "https://idp.example.com/token".to_string(),
            extra: serde_json::Map::new(),
        };
        {
            let mut cache = client.cache.write().unwrap();
            cache.insert(
                "https://idp.example.com/".to_string(),
                CacheEntry {
                    document: doc,
                    fetched_at: Instant::now(),
                },
            );
        }
        assert!(client.fresh_cached("https://idp.example.com/").is_some());
    }

    #[test]
    fn test_cache_expires_after_ttl() {
        let client = DiscoveryClient::with_ttl(Duration::from_millis(1));
        let doc = DiscoveryDocument {
            issuer: "https://idp.example.com".to_string(),
            jwks_uri: "https://idp.example.com/jwks".to_string(),
            authorization_endpoint: "https://idp.example.com/authorize".to_string(),
            token_endpoint: "https://idp.example.com/token".to_string(),
            extra: serde_json::Map::new(),
        };
        {
            let mut cache = client.cache.write().unwrap();
            cache.insert(
                "https://idp.example.com".to_string(),
                CacheEntry {
                    document: doc,
                    fetched_at: Instant::now() - Duration::from_secs(10),
                },
            );
        }
        assert!(client.fresh_cached("https://idp.example.com").is_none());
    }
}
