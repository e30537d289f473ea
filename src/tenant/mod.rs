// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tenant registry: lifecycle, quotas, and usage counters for multi-tenant
//! isolation.

use crate::security::locks::{resilient_read, resilient_write};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::RwLock;
use thiserror::Error;

pub const DEFAULT_TENANT_ID: &str = "default";

static TENANT_ID_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]{2,63}$").unwrap());

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TenantError {
    #[error("invalid tenant id")]
    InvalidId,
    #[error("invalid tenant name")]
    InvalidName,
    #[error("tenant already exists")]
    AlreadyExists,
    #[error("tenant not found")]
    NotFound,
    #[error("tenant suspended")]
    Suspended,
    #[error("tenant deleted")]
    Deleted,
    #[error("quota exceeded")]
    QuotaExceeded,
    #[error("cannot delete the default tenant")]
    CannotDeleteDefault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    Active,
    Suspended,
    Deleted,
}

/// `-1` means unlimited, matching the wire contract for quotas.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Quota {
    pub max_nodes: i64,
    pub max_edges: i64,
    pub max_storage_bytes: i64,
}

impl Quota {
    pub fn unlimited() -> Self {
        Self {
            max_nodes: -1,
            max_edges: -1,
            max_storage_bytes: -1,
        }
    }
}

#[derive(Debug, Default)]
struct Usage {
    node_count: AtomicI64,
    edge_count: AtomicI64,
    storage_bytes: AtomicI64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: String,
    pub display_name: String,
    pub description: Option<String>,
    pub status: TenantStatus,
    pub quota: Option<Quota>,
    pub metadata: BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub fn validate_id(id: &str) -> Result<(), TenantError> {
    if TENANT_ID_RE.is_match(id) {
        Ok(())
    } else {
        Err(TenantError::InvalidId)
    }
}

pub fn validate_display_name(name: &str) -> Result<(), TenantError> {
    let len = name.chars().count();
    if (3..=100).contains(&len) {
        Ok(())
    } else {
        Err(TenantError::InvalidName)
    }
}

struct Entry {
    tenant: Tenant,
    usage: Usage,
}

/// Registry of all tenants, guarded by a single reader/writer lock per the
/// one-mutex-per-store discipline used throughout this crate.
pub struct TenantRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl TenantRegistry {
    /// A fresh registry always contains the built-in `default` tenant with
    /// an unlimited quota; it cannot be deleted.
    pub fn new() -> Self {
        let mut entries = HashMap::new();
        let now = Utc::now();
        entries.insert(
            DEFAULT_TENANT_ID.to_string(),
            Entry {
                tenant: Tenant {
                    id: DEFAULT_TENANT_ID.to_string(),
                    display_name: "Default".to_string(),
                    description: None,
                    status: TenantStatus::Active,
                    quota: Some(Quota::unlimited()),
                    metadata: BTreeMap::new(),
                    created_at: now,
                    updated_at: now,
                },
                usage: Usage::default(),
            },
        );
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub fn create(
        &self,
        id: &str,
        display_name: &str,
        quota: Option<Quota>,
    ) -> Result<Tenant, TenantError> {
        validate_id(id)?;
        validate_display_name(display_name)?;
        let mut entries = resilient_write(&self.entries);
        if entries.contains_key(id) {
            return Err(TenantError::AlreadyExists);
        }
        let now = Utc::now();
        let tenant = Tenant {
            id: id.to_string(),
            display_name: display_name.to_string(),
            description: None,
            status: TenantStatus::Active,
            quota,
            metadata: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        };
        entries.insert(
            id.to_string(),
            Entry {
                tenant: tenant.clone(),
                usage: Usage::default(),
            },
        );
        Ok(tenant)
    }

    pub fn get(&self, id: &str) -> Result<Tenant, TenantError> {
        let entries = resilient_read(&self.entries);
        entries.get(id).map(|e| e.tenant.clone()).ok_or(TenantError::NotFound)
    }

    /// Like `get`, but rejects suspended or deleted tenants.
    pub fn get_active(&self, id: &str) -> Result<Tenant, TenantError> {
        let tenant = self.get(id)?;
        match tenant.status {
            TenantStatus::Active => Ok(tenant),
            TenantStatus::Suspended => Err(TenantError::Suspended),
            TenantStatus::Deleted => Err(TenantError::Deleted),
        }
    }

    /// All tenants excluding deleted ones.
    pub fn list(&self) -> Vec<Tenant> {
        let entries = resilient_read(&self.entries);
        entries
            .values()
            .filter(|e| e.tenant.status != TenantStatus::Deleted)
            .map(|e| e.tenant.clone())
            .collect()
    }

    pub fn update(
        &self,
        id: &str,
        display_name: Option<&str>,
        description: Option<Option<&str>>,
        quota: Option<Option<Quota>>,
        metadata: Option<BTreeMap<String, serde_json::Value>>,
    ) -> Result<Tenant, TenantError> {
        if let Some(name) = display_name {
            validate_display_name(name)?;
        }
        let mut entries = resilient_write(&self.entries);
        let entry = entries.get_mut(id).ok_or(TenantError::NotFound)?;
        if let Some(name) = display_name {
            entry.tenant.display_name = name.to_string();
        }
        if let Some(desc) = description {
            entry.tenant.description = desc.map(|s| s.to_string());
        }
        if let Some(q) = quota {
            entry.tenant.quota = q;
        }
        if let Some(m) = metadata {
            entry.tenant.metadata = m;
        }
        entry.tenant.updated_at = Utc::now();
        Ok(entry.tenant.clone())
    }

    /// Soft-delete: sets status to deleted. Rejects the default tenant.
    pub fn delete(&self, id: &str) -> Result<(), TenantError> {
        if id == DEFAULT_TENANT_ID {
            return Err(TenantError::CannotDeleteDefault);
        }
        let mut entries = resilient_write(&self.entries);
        let entry = entries.get_mut(id).ok_or(TenantError::NotFound)?;
        entry.tenant.status = TenantStatus::Deleted;
        entry.tenant.updated_at = Utc::now();
        Ok(())
    }

    pub fn suspend(&self, id: &str) -> Result<(), TenantError> {
        let mut entries = resilient_write(&self.entries);
        let entry = entries.get_mut(id).ok_or(TenantError::NotFound)?;
        if entry.tenant.status == TenantStatus::Deleted {
            return Err(TenantError::Deleted);
        }
        entry.tenant.status = TenantStatus::Suspended;
        entry.tenant.updated_at = Utc::now();
        Ok(())
    }

    /// Rejects if the tenant has been deleted.
    pub fn activate(&self, id: &str) -> Result<(), TenantError> {
        let mut entries = resilient_write(&self.entries);
        let entry = entries.get_mut(id).ok_or(TenantError::NotFound)?;
        if entry.tenant.status == TenantStatus::Deleted {
            return Err(TenantError::Deleted);
        }
        entry.tenant.status = TenantStatus::Active;
        entry.tenant.updated_at = Utc::now();
        Ok(())
    }

    pub fn increment_nodes(&self, id: &str, delta: i64) -> Result<(), TenantError> {
        let entries = resilient_read(&self.entries);
        let entry = entries.get(id).ok_or(TenantError::NotFound)?;
        clamped_add(&entry.usage.node_count, delta);
        Ok(())
    }

    pub fn increment_edges(&self, id: &str, delta: i64) -> Result<(), TenantError> {
        let entries = resilient_read(&self.entries);
        let entry = entries.get(id).ok_or(TenantError::NotFound)?;
        clamped_add(&entry.usage.edge_count, delta);
        Ok(())
    }

    pub fn set_storage_bytes(&self, id: &str, bytes: i64) -> Result<(), TenantError> {
        let entries = resilient_read(&self.entries);
        let entry = entries.get(id).ok_or(TenantError::NotFound)?;
        entry.usage.storage_bytes.store(bytes.max(0), Ordering::SeqCst);
        Ok(())
    }

    pub fn usage(&self, id: &str) -> Result<(i64, i64, i64), TenantError> {
        let entries = resilient_read(&self.entries);
        let entry = entries.get(id).ok_or(TenantError::NotFound)?;
        Ok((
            entry.usage.node_count.load(Ordering::SeqCst),
            entry.usage.edge_count.load(Ordering::SeqCst),
            entry.usage.storage_bytes.load(Ordering::SeqCst),
        ))
    }

    /// Precheck whether adding `additional_nodes`/`additional_edges` would
    /// exceed quota. An unknown tenant is permitted only when `id` is the
    /// default tenant, preserving backward compatibility for callers that
    /// don't yet propagate a tenant id.
    pub fn check_quota(
        &self,
        id: &str,
        additional_nodes: i64,
        additional_edges: i64,
    ) -> Result<(), TenantError> {
        let entries = resilient_read(&self.entries);
        let entry = match entries.get(id) {
            Some(e) => e,
            None if id == DEFAULT_TENANT_ID => return Ok(()),
            None => return Err(TenantError::NotFound),
        };
        let Some(quota) = entry.tenant.quota else {
            return Ok(());
        };
        if quota.max_nodes >= 0 {
            let projected = entry.usage.node_count.load(Ordering::SeqCst) + additional_nodes;
            if projected > quota.max_nodes {
                return Err(TenantError::QuotaExceeded);
            }
        }
        if quota.max_edges >= 0 {
            let projected = entry.usage.edge_count.load(Ordering::SeqCst) + additional_edges;
            if projected > quota.max_edges {
                return Err(TenantError::QuotaExceeded);
            }
        }
        Ok(())
    }
}

impl Default for TenantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn clamped_add(counter: &AtomicI64, delta: i64) {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
            Some((current + delta).max(0))
        })
        .ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tenant_exists_and_unlimited() {
        let registry = TenantRegistry::new();
        let default = registry.get(DEFAULT_TENANT_ID).unwrap();
        assert_eq!(default.status, TenantStatus::Active);
        assert_eq!(default.quota.unwrap().max_nodes, -1);
    }

    #[test]
    fn test_default_tenant_cannot_be_deleted() {
        let registry = TenantRegistry::new();
        assert_eq!(registry.delete(DEFAULT_TENANT_ID), Err(TenantError::CannotDeleteDefault));
    }

    #[test]
    fn test_create_and_duplicate_rejected() {
        let registry = TenantRegistry::new();
        registry.create("acme-corp", "Acme Corp", None).unwrap();
        assert_eq!(
            registry.create("acme-corp", "Acme Corp Again", None),
            Err(TenantError::AlreadyExists)
        );
    }

    #[test]
    fn test_invalid_id_rejected() {
        let registry = TenantRegistry::new();
        assert_eq!(registry.create("ab", "Too Short Id", None), Err(TenantError::InvalidId));
        assert_eq!(registry.create("-bad", "Bad Start", None), Err(TenantError::InvalidId));
    }

    #[test]
    fn test_suspend_and_get_active() {
        let registry = TenantRegistry::new();
        registry.create("acme", "Acme", None).unwrap();
        registry.suspend("acme").unwrap();
        assert_eq!(registry.get_active("acme"), Err(TenantError::Suspended));
    }

    #[test]
    fn test_list_excludes_deleted() {
        let registry = TenantRegistry::new();
        registry.create("acme", "Acme", None).unwrap();
        registry.delete("acme").unwrap();
        let list = registry.list();
        assert!(list.iter().all(|t| t.id != "acme"));
    }

    #[test]
    fn test_usage_counters_clamp_at_zero() {
        let registry = TenantRegistry::new();
        registry.create("acme", "Acme", None).unwrap();
        registry.increment_nodes("acme", 3).unwrap();
        registry.increment_nodes("acme", -10).unwrap();
        let (nodes, _, _) = registry.usage("acme").unwrap();
        assert_eq!(nodes, 0);
    }

    #[test]
    fn test_quota_precheck_unknown_tenant_default_allowed() {
        let registry = TenantRegistry::new();
        assert!(registry.check_quota(DEFAULT_TENANT_ID, 1_000_000, 0).is_ok());
        assert_eq!(
            registry.check_quota("nonexistent", 1, 0),
            Err(TenantError::NotFound)
        );
    }

    #[test]
    fn test_quota_exceeded() {
        let registry = TenantRegistry::new();
        registry
            .create(
                "acme",
                "Acme",
                Some(Quota {
                    max_nodes: 10,
                    max_edges: -1,
                    max_storage_bytes: -1,
                }),
            )
            .unwrap();
        registry.increment_nodes("acme", 8).unwrap();
        assert!(registry.check_quota("acme", 2, 0).is_ok());
        assert_eq!(registry.check_quota("acme", 3, 0), Err(TenantError::QuotaExceeded));
    }
}
