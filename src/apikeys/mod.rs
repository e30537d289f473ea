// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! API key issuance, validation, and HMAC-protected persistence.

use crate::crypto;
use crate::security::locks::{resilient_read, resilient_write};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::io;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::RwLock;
use thiserror::Error;
use uuid::Uuid;

const KEY_RANDOM_BYTES: usize = 32;
const HMAC_SECRET_MIN_LEN: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApiKeyError {
    #[error("owner id must not be empty")]
    InvalidOwner,
    #[error("key name must not be empty")]
    InvalidName,
    #[error("permission set must be non-empty and a subset of {{read, write, admin}}")]
    InvalidPermissions,
    #[error("hmac secret must be at least 32 bytes")]
    ShortSecret,
    #[error("api key not found")]
    NotFound,
    #[error("api key revoked")]
    Revoked,
    #[error("api key expired")]
    Expired,
    #[error("api key environment mismatch")]
    EnvironmentMismatch,
    #[error("malformed api key")]
    Malformed,
    #[error("failed to read api key snapshot: {0}")]
    Persistence(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Live,
    Test,
}

impl Environment {
    pub fn prefix(self) -> &'static str {
        match self {
            Environment::Live => "gdb_live_",
            Environment::Test => "gdb_test_",
        }
    }

    /// Resolve from `GRAPHDB_ENV`: `production` selects live, anything
    /// else (including unset) selects test.
    pub fn from_env() -> Self {
        match std::env::var("GRAPHDB_ENV").as_deref() {
            Ok("production") => Environment::Live,
            _ => Environment::Test,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Read,
    Write,
    Admin,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub permissions: HashSet<Permission>,
    pub environment: Environment,
    pub key_hash: String,
    pub prefix: String,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(with = "chrono::serde::ts_seconds_option")]
    pub last_used: Option<DateTime<Utc>>,
    pub revoked: bool,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    hmac_secret: String,
    keys: Vec<ApiKey>,
}

struct Store {
    by_id: HashMap<String, ApiKey>,
    id_by_hash: HashMap<String, String>,
    ids_by_owner: HashMap<String, Vec<String>>,
}

/// HMAC secret is fixed at construction time and never mutated.
pub struct ApiKeyStore {
    secret: Vec<u8>,
    inner: RwLock<Store>,
}

impl ApiKeyStore {
    /// Generate a fresh 32-byte HMAC secret.
    pub fn new() -> Self {
        Self::with_secret(crypto::random_bytes(HMAC_SECRET_MIN_LEN)).expect("generated secret meets minimum length")
    }

    /// Construct with an externally supplied secret (e.g. recovered from a
    /// snapshot). Must be at least 32 bytes.
    pub fn with_secret(secret: Vec<u8>) -> Result<Self, ApiKeyError> {
        if secret.len() < HMAC_SECRET_MIN_LEN {
            return Err(ApiKeyError::ShortSecret);
        }
        Ok(Self {
            secret,
            inner: RwLock::new(Store {
                by_id: HashMap::new(),
                id_by_hash: HashMap::new(),
                ids_by_owner: HashMap::new(),
            }),
        })
    }

    /// Create a key, returning its full secret string exactly once; only
    /// the HMAC digest is retained afterward.
    pub fn create_key(
        &self,
        owner_id: &str,
        name: &str,
        permissions: HashSet<Permission>,
        environment: Environment,
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<(ApiKey, String), ApiKeyError> {
        if owner_id.is_empty() {
            return Err(ApiKeyError::InvalidOwner);
        }
        if name.is_empty() {
            return Err(ApiKeyError::InvalidName);
        }
        if permissions.is_empty() {
            return Err(ApiKeyError::InvalidPermissions);
        }

        let prefix = environment.prefix();
        let random = crypto::random_bytes(KEY_RANDOM_BYTES);
        let full_key = format!("{prefix}{}", crypto::b64url_encode(&random));
        let key_hash = crypto::hmac_sha256_hex(&self.secret, full_key.as_bytes());

        let key = ApiKey {
            id: Uuid::new_v4().to_string(),
            user_id: owner_id.to_string(),
            name: name.to_string(),
            permissions,
            environment,
            key_hash: key_hash.clone(),
            prefix: prefix.to_string(),
            created_at: Utc::now(),
            expires_at,
            last_used: None,
            revoked: false,
        };

        let mut store = resilient_write(&self.inner);
        store.id_by_hash.insert(key_hash, key.id.clone());
        store.ids_by_owner.entry(owner_id.to_string()).or_default().push(key.id.clone());
        store.by_id.insert(key.id.clone(), key.clone());

        Ok((key, full_key))
    }

    /// Validate a presented key string. `required_environment`, when set,
    /// must match the server's declared environment unless that value is
    /// empty (disabling the check).
    pub fn validate_key(
        &self,
        presented: &str,
        required_permission: Option<Permission>,
        required_environment: Option<Environment>,
    ) -> Result<ApiKey, ApiKeyError> {
        if !presented.starts_with("gdb_") {
            return Err(ApiKeyError::Malformed);
        }
        let hash = crypto::hmac_sha256_hex(&self.secret, presented.as_bytes());

        let store = resilient_read(&self.inner);
        let id = store.id_by_hash.iter().find_map(|(stored_hash, id)| {
            if crypto::constant_time_eq(stored_hash.as_bytes(), hash.as_bytes()) {
                Some(id.clone())
            } else {
                None
            }
        });
        let id = id.ok_or(ApiKeyError::NotFound)?;
        let key = store.by_id.get(&id).ok_or(ApiKeyError::NotFound)?;

        if key.revoked {
            return Err(ApiKeyError::Revoked);
        }
        if let Some(expires_at) = key.expires_at {
            if expires_at <= Utc::now() {
                return Err(ApiKeyError::Expired);
            }
        }
        if let Some(env) = required_environment {
            if env != key.environment {
                return Err(ApiKeyError::EnvironmentMismatch);
            }
        }
        if let Some(required) = required_permission {
            let satisfied = key.permissions.contains(&Permission::Admin) || key.permissions.contains(&required);
            if !satisfied {
                return Err(ApiKeyError::NotFound);
            }
        }

        Ok(key.clone())
    }

    pub fn revoke(&self, id: &str) -> Result<(), ApiKeyError> {
        let mut store = resilient_write(&self.inner);
        let key = store.by_id.get_mut(id).ok_or(ApiKeyError::NotFound)?;
        key.revoked = true;
        Ok(())
    }

    pub fn touch_last_used(&self, id: &str) -> Result<(), ApiKeyError> {
        let mut store = resilient_write(&self.inner);
        let key = store.by_id.get_mut(id).ok_or(ApiKeyError::NotFound)?;
        key.last_used = Some(Utc::now());
        Ok(())
    }

    pub fn list_for_owner(&self, owner_id: &str) -> Vec<ApiKey> {
        let store = resilient_read(&self.inner);
        store
            .ids_by_owner
            .get(owner_id)
            .map(|ids| ids.iter().filter_map(|id| store.by_id.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    /// Serialize all keys plus the HMAC secret to a single JSON file with
    /// `0600` permissions. The secret must be persisted too — without it
    /// every stored digest becomes unverifiable on reload.
    pub fn save_snapshot(&self, path: &Path) -> Result<(), ApiKeyError> {
        let store = resilient_read(&self.inner);
        let snapshot = Snapshot {
            hmac_secret: crypto::b64url_encode(&self.secret),
            keys: store.by_id.values().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| ApiKeyError::Persistence(e.to_string()))?;
        fs::write(path, json).map_err(|e| ApiKeyError::Persistence(e.to_string()))?;
        set_owner_only_permissions(path).map_err(|e| ApiKeyError::Persistence(e.to_string()))?;
        Ok(())
    }

    /// Reload a store from a snapshot, recovering the HMAC secret and
    /// rebuilding all three indices.
    pub fn load_snapshot(path: &Path) -> Result<Self, ApiKeyError> {
        let json = fs::read_to_string(path).map_err(|e| ApiKeyError::Persistence(e.to_string()))?;
        let snapshot: Snapshot =
            serde_json::from_str(&json).map_err(|e| ApiKeyError::Persistence(e.to_string()))?;
        let secret = crypto::b64url_decode(&snapshot.hmac_secret)
            .map_err(|e| ApiKeyError::Persistence(e.to_string()))?;

        let store = Self::with_secret(secret)?;
        let mut inner = resilient_write(&store.inner);
        for key in snapshot.keys {
            inner.id_by_hash.insert(key.key_hash.clone(), key.id.clone());
            inner.ids_by_owner.entry(key.user_id.clone()).or_default().push(key.id.clone());
            inner.by_id.insert(key.id.clone(), key);
        }
        drop(inner);
        Ok(store)
    }
}

impl Default for ApiKeyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn set_owner_only_permissions(path: &Path) -> io::Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn set_owner_only_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}
