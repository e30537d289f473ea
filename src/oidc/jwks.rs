// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! JWKS (RFC 7517) client: fetches and parses RSA keys (RFC 7518), with a
//! raw-document cache per URL and a parsed-key cache by kid.

use super::OidcError;
use crate::security::locks::{resilient_read, resilient_write};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::sync::RwLock;
use std::time::{Duration, Instant};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_RESPONSE_BYTES: u64 = 512 * 1024;
const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60);
const MAX_CACHED_KEYS: usize = 100;

#[derive(Debug, Deserialize)]
struct RawJwk {
    kty: String,
    #[serde(rename = "use")]
    use_: Option<String>,
    kid: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawJwks {
    keys: Vec<RawJwk>,
}

/// A parsed RSA public key, still base64url-encoded — that's the form
/// `crypto::rsa_verify` consumes directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    pub kid: String,
    pub n: String,
    pub e: String,
}

struct RawCacheEntry {
    keys: HashMap<String, PublicKey>,
    fetched_at: Instant,
}

struct KeyCacheEntry {
    key: PublicKey,
    source_url: String,
    inserted_at: Instant,
}

pub struct JwksClient {
    http: reqwest::blocking::Client,
    ttl: Duration,
    raw_by_url: RwLock<HashMap<String, RawCacheEntry>>,
    keys_by_kid: RwLock<HashMap<String, KeyCacheEntry>>,
}

impl JwksClient {
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
            raw_by_url: RwLock::new(HashMap::new()),
            keys_by_kid: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a key by `(url, kid)`. Tries the kid cache first; on a miss,
    /// refetches the set at `url` once (handles key rotation). Graceful
    /// degradation: on a fetch failure with a stale cache present, the
    /// stale cache is used.
    pub fn get_key(&self, url: &str, kid: &str) -> Result<PublicKey, OidcError> {
        if let Some(key) = self.fresh_cached_key(kid) {
            return Ok(key);
        }

        match self.fetch_and_cache(url) {
            Ok(keys) => keys.get(kid).cloned().ok_or_else(|| OidcError::KeyNotFound(kid.to_string())),
            Err(e) => {
                let raw = resilient_read(&self.raw_by_url);
                if let Some(entry) = raw.get(url) {
                    if let Some(key) = entry.keys.get(kid) {
                        tracing::warn!(target: "oidc", url, "jwks fetch failed, serving stale cache");
                        return Ok(key.clone());
                    }
                }
                Err(e)
            }
        }
    }

    /// Returns the cached key for `kid` only if it was inserted within the
    /// client's TTL; an expired entry is treated as a cache miss so
    /// `get_key` refetches.
    fn fresh_cached_key(&self, kid: &str) -> Option<PublicKey> {
        let cache = resilient_read(&self.keys_by_kid);
        let entry = cache.get(kid)?;
        if entry.inserted_at.elapsed() < self.ttl {
            Some(entry.key.clone())
        } else {
            None
        }
    }

    fn fetch_and_cache(&self, url: &str) -> Result<HashMap<String, PublicKey>, OidcError> {
        let parsed = self.fetch(url)?;

        let mut raw = resilient_write(&self.raw_by_url);
        raw.insert(
            url.to_string(),
            RawCacheEntry {
                keys: parsed.clone(),
                fetched_at: Instant::now(),
            },
        );
        drop(raw);

        let mut keys = resilient_write(&self.keys_by_kid);
        for (kid, key) in &parsed {
            keys.insert(
                kid.clone(),
                KeyCacheEntry {
                    key: key.clone(),
                    source_url: url.to_string(),
                    inserted_at: Instant::now(),
                },
            );
        }
        evict_oldest_if_over_capacity(&mut keys);

        Ok(parsed)
    }

    fn fetch(&self, url: &str) -> Result<HashMap<String, PublicKey>, OidcError> {
        let mut response = self.http.get(url).send().map_err(|e| OidcError::Http(e.to_string()))?;

        let mut buf = Vec::new();
        let mut limited = response.by_ref().take(MAX_RESPONSE_BYTES + 1);
        limited.read_to_end(&mut buf).map_err(|e| OidcError::Http(e.to_string()))?;
        if buf.len() as u64 > MAX_RESPONSE_BYTES {
            return Err(OidcError::ResponseTooLarge);
        }

        let raw: RawJwks = serde_json::from_slice(&buf).map_err(|e| OidcError::MalformedToken(e.to_string()))?;
        Ok(parse_rsa_keys(raw))
    }

    /// Invalidate every key cached from `url`, leaving keys from other URLs
    /// intact.
    pub fn invalidate_url(&self, url: &str) {
        let mut raw = resilient_write(&self.raw_by_url);
        raw.remove(url);
        drop(raw);
        let mut keys = resilient_write(&self.keys_by_kid);
        keys.retain(|_, entry| entry.source_url != url);
    }
}

impl Default for JwksClient {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_rsa_keys(raw: RawJwks) -> HashMap<String, PublicKey> {
    let mut out = HashMap::new();
    for key in raw.keys {
        if key.kty != "RSA" {
            continue;
        }
        if let Some(use_) = &key.use_ {
            if use_ != "sig" {
                continue;
            }
        }
        let (Some(n), Some(e), Some(kid)) = (key.n, key.e, key.kid) else {
            continue;
        };
        if crate::crypto::b64url_decode(&n).is_err() || crate::crypto::b64url_decode(&e).is_err() {
            continue;
        }
        out.insert(kid.clone(), PublicKey { kid, n, e });
    }
    out
}

fn evict_oldest_if_over_capacity(keys: &mut HashMap<String, KeyCacheEntry>) {
    if keys.len() <= MAX_CACHED_KEYS {
        return;
    }
    let overflow = keys.len() - MAX_CACHED_KEYS;
    let mut by_age: Vec<(String, Instant)> = keys.iter().map(|(k, v)| (k.clone(), v.inserted_at)).collect();
    by_age.sort_by_key(|(_, inserted_at)| *inserted_at);
    for (kid, _) in by_age.into_iter().take(overflow) {
        keys.remove(&kid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jwk(kid: &str, kty: &str, use_: Option<&str>) -> RawJwk {
        RawJwk {
            kty: kty.to_string(),
            use_: use_.map(str::to_string),
            kid: Some(kid.to_string()),
            n: Some("AQAB".to_string()),
            e: Some("AQAB".to_string()),
        }
    }

    #[test]
    fn test_parse_skips_non_rsa_and_non_sig() {
        let raw = RawJwks {
            keys: vec![
                jwk("rsa-key", "RSA", Some("sig")),
                jwk("ec-key", "EC", Some("sig")),
                jwk("enc-key", "RSA", Some("enc")),
            ],
        };
        let parsed = parse_rsa_keys(raw);
        assert_eq!(parsed.len(), 1);
        assert!(parsed.contains_key("rsa-key"));
    }

    #[test]
    fn test_parse_skips_bad_base64() {
        let raw = RawJwks {
            keys: vec![RawJwk {
                kty: "RSA".to_string(),
                use_: Some("sig".to_string()),
                kid: Some("bad-key".to_string()),
                n: Some("not base64!!".to_string()),
                e: Some("AQAB".to_string()),
            }],
        };
        assert!(parse_rsa_keys(raw).is_empty());
    }

    #[test]
    fn test_eviction_keeps_capacity() {
        let mut keys = HashMap::new();
        for i in 0..120 {
            keys.insert(
                format!("kid-{i}"),
                KeyCacheEntry {
                    key: PublicKey {
                        kid: format!("kid-{i}"),
                        n: "AQAB".to_string(),
                        e: "AQAB".to_string(),
                    },
                    source_url: "https://idp.example.com/jwks".to_string(),
                    inserted_at: Instant::now(),
                },
            );
        }
        evict_oldest_if_over_capacity(&mut keys);
        assert_eq!(keys.len(), MAX_CACHED_KEYS);
    }

    #[test]
    fn test_invalidate_url_scoped() {
        let client = JwksClient::new();
        {
            let mut keys = client.keys_by_kid.write().unwrap();
            keys.insert(
                "kid-a".to_string(),
                KeyCacheEntry {
                    key: PublicKey { kid: "kid-a".to_string(), n: "AQAB".to_string(), e: "AQAB".to_string() },
                    source_url: "https://a.example.com/jwks".to_string(),
                    inserted_at: Instant::now(),
                },
            );
            keys.insert(
                "kid-b".to_string(),
                KeyCacheEntry {
                    key: PublicKey { kid: "kid-b".to_string(), n: "AQAB".to_string(), e: "AQAB".to_string() },
                    source_url: "https://b.example.com/jwks".to_string(),
                    inserted_at: Instant::now(),
                },
            );
        }
        client.invalidate_url("https://a.example.com/jwks");
        let keys = client.keys_by_kid.read().unwrap();
        assert!(!keys.contains_key("kid-a"));
        assert!(keys.contains_key("kid-b"));
    }

    #[test]
    fn test_cached_key_expires_after_ttl() {
        let client = JwksClient::with_ttl(Duration::from_millis(1));
        {
            let mut keys = client.keys_by_kid.write().unwrap();
            keys.insert(
                "kid-a".to_string(),
                KeyCacheEntry {
                    key: PublicKey { kid: "kid-a".to_string(), n: "AQAB".to_string(), e: "AQAB".to_string() },
                    source_url: "https://a.example.com/jwks".to_string(),
                    inserted_at: Instant::now() - Duration::from_secs(10),
                },
            );
        }
        assert!(client.fresh_cached_key("kid-a").is_none());
    }

    #[test]
    fn test_cached_key_fresh_within_ttl() {
        let client = JwksClient::with_ttl(Duration::from_secs(60));
        {
            let mut keys = client.keys_by_kid.write().unwrap();
            keys.insert(
                "kid-a".to_string(),
                KeyCacheEntry {
                    key: PublicKey { kid: "kid-a".to_string(), n: "AQAB".to_string(), e: "AQAB".to_string() },
                    source_url: "https://a.example.com/jwks".to_string(),
                    inserted_at: Instant::now(),
                },
            );
        }
        assert!(client.fresh_cached_key("kid-a").is_some());
    }
}
