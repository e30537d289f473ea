// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! The audit event data model, shared by the buffered and persistent loggers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Severity of an audit event. Ordering matches the syslog mapping used by
/// the exporter: critical is the most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// Outcome of the action the event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Failure,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Success => "success",
            Status::Failure => "failure",
        };
        write!(f, "{s}")
    }
}

/// The kind of operation an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Auth,
    Query,
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Auth => "auth",
            Action::Query => "query",
        };
        write!(f, "{s}")
    }
}

/// The kind of resource an event's action was taken against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Node,
    Edge,
    Query,
    Auth,
    User,
    ApiKey,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceType::Node => "node",
            ResourceType::Edge => "edge",
            ResourceType::Query => "query",
            ResourceType::Auth => "auth",
            ResourceType::User => "user",
            ResourceType::ApiKey => "apikey",
        };
        write!(f, "{s}")
    }
}

/// A single audit occurrence, before it is wrapped for persistence.
///
/// `id` and `timestamp` are assigned by the logger on write if left unset,
/// so callers may construct an event without either field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(default = "new_event_id")]
    pub id: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub action: Action,
    pub resource_type: ResourceType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, serde_json::Value>>,
}

fn new_event_id() -> String {
    Uuid::new_v4().to_string()
}

impl Event {
    /// Construct a minimal event for the given action/resource/status; all
    /// optional fields are left unset.
    pub fn new(action: Action, resource_type: ResourceType, status: Status) -> Self {
        Self {
            id: new_event_id(),
            timestamp: Utc::now(),
            tenant_id: None,
            user_id: None,
            username: None,
            action,
            resource_type,
            resource_id: None,
            status,
            error_message: None,
            ip_address: None,
            user_agent: None,
            metadata: None,
        }
    }

    pub fn with_resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_tenant_id(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }
}

/// An `Event` wrapped with the fields the persistent log chain adds:
/// severity, the previous entry's hash, and this entry's own hash.
///
/// The teacher's original audit log embedded this wrapping directly in a
/// single struct; here the distinction is kept explicit so the in-memory
/// ring (which never chains) and the on-disk log (which always does) share
/// the same base `Event` without either carrying fields it doesn't use.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistentEvent {
    #[serde(flatten)]
    pub event: Event,
    pub severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_hash: Option<String>,
    pub event_hash: String,
}

impl PersistentEvent {
    /// Serialize with `event_hash` cleared, for recomputing the digest
    /// during write and during integrity verification.
    pub fn canonical_bytes_without_hash(&self) -> Vec<u8> {
        let mut unhashed = self.clone();
        unhashed.event_hash = String::new();
        serde_json::to_vec(&unhashed).expect("PersistentEvent always serializes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_defaults() {
        let e = Event::new(Action::Auth, ResourceType::User, Status::Success);
        assert!(!e.id.is_empty());
        assert_eq!(e.action, Action::Auth);
        assert!(e.resource_id.is_none());
    }

    #[test]
    fn test_event_builder() {
        let e = Event::new(Action::Create, ResourceType::Node, Status::Success)
            .with_resource_id("node0")
            .with_username("alice")
            .with_tenant_id("acme");
        assert_eq!(e.resource_id.as_deref(), Some("node0"));
        assert_eq!(e.username.as_deref(), Some("alice"));
        assert_eq!(e.tenant_id.as_deref(), Some("acme"));
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Critical);
    }
}
