// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Local and OIDC-provisioned user store.

use crate::crypto;
use crate::security::locks::{resilient_read, resilient_write};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::RwLock;
use thiserror::Error;
use uuid::Uuid;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

static USERNAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{3,50}$").unwrap());
static SANITIZE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_-]").unwrap());

const MIN_PASSWORD_LEN: usize = 8;
const MIN_USERNAME_LEN: usize = 3;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UserStoreError {
    #[error("invalid username")]
    InvalidUsername,
    #[error("invalid password")]
    InvalidPassword,
    #[error("invalid role")]
    InvalidRole,
    #[error("user already exists")]
    AlreadyExists,
    #[error("user not found")]
    NotFound,
    #[error("snapshot persistence failed: {0}")]
    Persistence(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Viewer,
    Editor,
    Admin,
}

impl Role {
    pub fn parse(s: &str) -> Result<Self, UserStoreError> {
        match s {
            "admin" => Ok(Role::Admin),
            "editor" => Ok(Role::Editor),
            "viewer" => Ok(Role::Viewer),
            _ => Err(UserStoreError::InvalidRole),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Editor => "editor",
            Role::Viewer => "viewer",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcIdentity {
    pub issuer: String,
    pub subject: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub picture: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    /// Empty for OIDC-provisioned users, who authenticate via their ID
    /// token rather than a local password.
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub oidc: Option<OidcIdentity>,
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    pub fn is_oidc(&self) -> bool {
        self.oidc.is_some()
    }
}

struct Store {
    by_id: HashMap<String, User>,
    id_by_username: HashMap<String, String>,
    id_by_oidc: HashMap<(String, String), String>,
}

/// One reader/writer lock guards all three indices; mutations that touch
/// more than one index (create-or-update OIDC user) commit atomically under
/// the writer lock.
pub struct UserStore {
    inner: RwLock<Store>,
}

impl UserStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Store {
                by_id: HashMap::new(),
                id_by_username: HashMap::new(),
                id_by_oidc: HashMap::new(),
            }),
        }
    }

    pub fn create_local_user(
        &self,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<User, UserStoreError> {
        validate_username(username)?;
        if password.len() < MIN_PASSWORD_LEN {
            return Err(UserStoreError::InvalidPassword);
        }
        let hash = crypto::hash_password(password).map_err(|_| UserStoreError::InvalidPassword)?;

        let mut store = resilient_write(&self.inner);
        if store.id_by_username.contains_key(username) {
            return Err(UserStoreError::AlreadyExists);
        }
        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            password_hash: hash,
            role,
            created_at: Utc::now(),
            oidc: None,
            last_login: None,
        };
        store.id_by_username.insert(username.to_string(), user.id.clone());
        store.by_id.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    pub fn get_by_id(&self, id: &str) -> Result<User, UserStoreError> {
        let store = resilient_read(&self.inner);
        store.by_id.get(id).cloned().ok_or(UserStoreError::NotFound)
    }

    pub fn get_by_username(&self, username: &str) -> Result<User, UserStoreError> {
        let store = resilient_read(&self.inner);
        let id = store.id_by_username.get(username).ok_or(UserStoreError::NotFound)?;
        store.by_id.get(id).cloned().ok_or(UserStoreError::NotFound)
    }

    /// Constant-time-ish bcrypt compare. Returns `false` — never an error —
    /// for a missing user or empty password, so a caller can't distinguish
    /// "no such user" from "wrong password" by timing or error shape.
    pub fn verify_password(&self, username: &str, password: &str) -> bool {
        if username.is_empty() || password.is_empty() {
            return false;
        }
        let user = match self.get_by_username(username) {
            Ok(u) => u,
            Err(_) => return false,
        };
        crypto::verify_password(password, &user.password_hash)
    }

    pub fn list(&self) -> Vec<User> {
        let store = resilient_read(&self.inner);
        store.by_id.values().cloned().collect()
    }

    pub fn update_role(&self, id: &str, role: Role) -> Result<User, UserStoreError> {
        let mut store = resilient_write(&self.inner);
        let user = store.by_id.get_mut(id).ok_or(UserStoreError::NotFound)?;
        user.role = role;
        Ok(user.clone())
    }

    pub fn delete(&self, id: &str) -> Result<(), UserStoreError> {
        let mut store = resilient_write(&self.inner);
        let user = store.by_id.remove(id).ok_or(UserStoreError::NotFound)?;
        store.id_by_username.remove(&user.username);
        if let Some(oidc) = &user.oidc {
            store.id_by_oidc.remove(&(oidc.issuer.clone(), oidc.subject.clone()));
        }
        Ok(())
    }

    pub fn change_password(&self, id: &str, new_password: &str) -> Result<(), UserStoreError> {
        if new_password.len() < MIN_PASSWORD_LEN {
            return Err(UserStoreError::InvalidPassword);
        }
        let hash = crypto::hash_password(new_password).map_err(|_| UserStoreError::InvalidPassword)?;
        let mut store = resilient_write(&self.inner);
        let user = store.by_id.get_mut(id).ok_or(UserStoreError::NotFound)?;
        user.password_hash = hash;
        Ok(())
    }

    pub fn get_by_oidc_subject(&self, issuer: &str, subject: &str) -> Result<User, UserStoreError> {
        let store = resilient_read(&self.inner);
        let id = store
            .id_by_oidc
            .get(&(issuer.to_string(), subject.to_string()))
            .ok_or(UserStoreError::NotFound)?;
        store.by_id.get(id).cloned().ok_or(UserStoreError::NotFound)
    }

    /// Create or update a user keyed by `(issuer, subject)`. Username is
    /// synthesized on first creation. Role is upgraded, never downgraded,
    /// on re-authentication: `mapped_role` only takes effect if it
    /// outranks the stored role.
    pub fn create_or_update_oidc_user(
        &self,
        issuer: &str,
        subject: &str,
        preferred_username: Option<&str>,
        email: Option<&str>,
        display_name: Option<&str>,
        picture: Option<&str>,
        mapped_role: Role,
    ) -> Result<User, UserStoreError> {
        let mut store = resilient_write(&self.inner);
        let key = (issuer.to_string(), subject.to_string());

        if let Some(id) = store.id_by_oidc.get(&key).cloned() {
            let user = store.by_id.get_mut(&id).ok_or(UserStoreError::NotFound)?;
            if mapped_role > user.role {
                user.role = mapped_role;
            }
            user.last_login = Some(Utc::now());
            if let Some(oidc) = user.oidc.as_mut() {
                if email.is_some() {
                    oidc.email = email.map(str::to_string);
                }
                if display_name.is_some() {
                    oidc.display_name = display_name.map(str::to_string);
                }
                if picture.is_some() {
                    oidc.picture = picture.map(str::to_string);
                }
            }
            return Ok(user.clone());
        }

        let candidate = synthesize_username(preferred_username, email);
        let username = resolve_username_collision(&store.id_by_username, &candidate);

        let user = User {
            id: Uuid::new_v4().to_string(),
            username: username.clone(),
            password_hash: String::new(),
            role: mapped_role,
            created_at: Utc::now(),
            oidc: Some(OidcIdentity {
                issuer: issuer.to_string(),
                subject: subject.to_string(),
                email: email.map(str::to_string),
                display_name: display_name.map(str::to_string),
                picture: picture.map(str::to_string),
            }),
            last_login: Some(Utc::now()),
        };
        store.id_by_username.insert(username, user.id.clone());
        store.id_by_oidc.insert(key, user.id.clone());
        store.by_id.insert(user.id.clone(), user.clone());
        Ok(user)
    }

    /// Serialize every user to a JSON array of `{id, username,
    /// password_hash, role, created_at}` with `0600` permissions. OIDC
    /// linkage and last-login are not part of the wire format and are
    /// dropped; a reloaded OIDC-provisioned user authenticates again via
    /// `create_or_update_oidc_user`, which re-links it by subject.
    pub fn save_snapshot(&self, path: &Path) -> Result<(), UserStoreError> {
        let store = resilient_read(&self.inner);
        let entries: Vec<UserSnapshotEntry> = store.by_id.values().map(UserSnapshotEntry::from).collect();
        let json = serde_json::to_string_pretty(&entries)
            .map_err(|e| UserStoreError::Persistence(e.to_string()))?;
        fs::write(path, json).map_err(|e| UserStoreError::Persistence(e.to_string()))?;
        set_owner_only_permissions(path).map_err(|e| UserStoreError::Persistence(e.to_string()))?;
        Ok(())
    }

    /// Reload a store from a snapshot. Every entry becomes a local user
    /// (no OIDC linkage, since the wire format carries none).
    pub fn load_snapshot(path: &Path) -> Result<Self, UserStoreError> {
        let json = fs::read_to_string(path).map_err(|e| UserStoreError::Persistence(e.to_string()))?;
        let entries: Vec<UserSnapshotEntry> =
            serde_json::from_str(&json).map_err(|e| UserStoreError::Persistence(e.to_string()))?;

        let store = Self::new();
        let mut inner = resilient_write(&store.inner);
        for entry in entries {
            let user = User {
                id: entry.id,
                username: entry.username.clone(),
                password_hash: entry.password_hash,
                role: entry.role,
                created_at: entry.created_at,
                oidc: None,
                last_login: None,
            };
            inner.id_by_username.insert(entry.username, user.id.clone());
            inner.by_id.insert(user.id.clone(), user);
        }
        drop(inner);
        Ok(store)
    }
}

/// Wire shape for a single entry in a user snapshot file: exactly the
/// fields named for the format, nothing more.
#[derive(Debug, Serialize, Deserialize)]
struct UserSnapshotEntry {
    id: String,
    username: String,
    password_hash: String,
    role: Role,
    created_at: DateTime<Utc>,
}

impl From<&User> for UserSnapshotEntry {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            password_hash: user.password_hash.clone(),
            role: user.role,
            created_at: user.created_at,
        }
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

impl Default for UserStore {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_username(username: &str) -> Result<(), UserStoreError> {
    if USERNAME_RE.is_match(username) {
        Ok(())
    } else {
        Err(UserStoreError::InvalidUsername)
    }
}

/// Prefer `preferred_username`; else the local part of `email`; else
/// `oidc_user`. Sanitized to `[A-Za-z0-9_-]` and padded to the minimum
/// username length.
fn synthesize_username(preferred_username: Option<&str>, email: Option<&str>) -> String {
    let raw = preferred_username
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .or_else(|| email.and_then(|e| e.split('@').next()).map(str::to_string))
        .unwrap_or_else(|| "oidc_user".to_string());

    let mut sanitized = SANITIZE_RE.replace_all(&raw, "_").to_string();
    while sanitized.chars().count() < MIN_USERNAME_LEN {
        sanitized.push('_');
    }
    sanitized
}

fn resolve_username_collision(taken: &HashMap<String, String>, candidate: &str) -> String {
    if !taken.contains_key(candidate) {
        return candidate.to_string();
    }
    let mut n = 1;
    loop {
        let attempt = format!("{candidate}_{n}");
        if !taken.contains_key(&attempt) {
            return attempt;
        }
        n += 1;
    }
}
