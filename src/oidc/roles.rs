// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Claim-based role mapping: an ordered list of mappings, first match wins.

use crate::users::Role;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

const WELL_KNOWN_CLAIMS: &[&str] = &[
    "groups",
    "roles",
    "email",
    "email_verified",
    "sub",
    "iss",
    "preferred_username",
    "name",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleMapping {
    pub claim_name: String,
    pub claim_value: Vec<String>,
    pub graphdb_role: Role,
}

/// Evaluate `mappings` in order against `typed_claims` (well-known claims,
/// preferred) falling back to `raw_claims` for anything else. The claim
/// name resolves against well-known claims first, matching the source
/// material's "typed view, then raw map" precedence. Returns `default_role`
/// if nothing matches.
pub fn map_role(
    mappings: &[RoleMapping],
    typed_claims: &HashMap<String, Value>,
    raw_claims: &HashMap<String, Value>,
    default_role: Role,
) -> Role {
    for mapping in mappings {
        let claim_value = if WELL_KNOWN_CLAIMS.contains(&mapping.claim_name.as_str()) {
            typed_claims.get(&mapping.claim_name).or_else(|| raw_claims.get(&mapping.claim_name))
        } else {
            raw_claims.get(&mapping.claim_name)
        };

        let Some(value) = claim_value else {
            continue;
        };

        if claim_matches(value, &mapping.claim_value) {
            return mapping.graphdb_role;
        }
    }
    default_role
}

fn claim_matches(value: &Value, expected: &[String]) -> bool {
    match value {
        Value::String(s) => expected.iter().any(|e| e == s),
        Value::Array(arr) => arr.iter().any(|v| match v {
            Value::String(s) => expected.iter().any(|e| e == s),
            _ => false,
        }),
        Value::Bool(b) => expected.iter().any(|e| e.parse::<bool>().map(|parsed| parsed == *b).unwrap_or(false)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_role_mapping_precedence() {
        let mappings = vec![
            RoleMapping {
                claim_name: "groups".to_string(),
                claim_value: vec!["admins".to_string()],
                graphdb_role: Role::Admin,
            },
            RoleMapping {
                claim_name: "groups".to_string(),
                claim_value: vec!["editors".to_string()],
                graphdb_role: Role::Editor,
            },
        ];

        let mut typed = HashMap::new();
        typed.insert("groups".to_string(), json!(["admins", "developers"]));
        let raw = HashMap::new();
        assert_eq!(map_role(&mappings, &typed, &raw, Role::Viewer), Role::Admin);

        let mut typed2 = HashMap::new();
        typed2.insert("groups".to_string(), json!(["developers"]));
        assert_eq!(map_role(&mappings, &typed2, &raw, Role::Viewer), Role::Viewer);
    }

    #[test]
    fn test_custom_claim_falls_back_to_raw_map() {
        let mappings = vec![RoleMapping {
            claim_name: "cognito:groups".to_string(),
            claim_value: vec!["admins".to_string()],
            graphdb_role: Role::Admin,
        }];
        let typed = HashMap::new();
        let mut raw = HashMap::new();
        raw.insert("cognito:groups".to_string(), json!(["admins"]));
        assert_eq!(map_role(&mappings, &typed, &raw, Role::Viewer), Role::Admin);
    }

    #[test]
    fn test_no_match_returns_default() {
        let mappings = vec![RoleMapping {
            claim_name: "groups".to_string(),
            claim_value: vec!["admins".to_string()],
            graphdb_role: Role::Admin,
        }];
        let typed = HashMap::new();
        let raw = HashMap::new();
        assert_eq!(map_role(&mappings, &typed, &raw, Role::Viewer), Role::Viewer);
    }

    #[test]
    fn test_boolean_claim_match() {
        let mappings = vec![RoleMapping {
            claim_name: "email_verified".to_string(),
            claim_value: vec!["true".to_string()],
            graphdb_role: Role::Editor,
        }];
        let mut typed = HashMap::new();
        typed.insert("email_verified".to_string(), json!(true));
        let raw = HashMap::new();
        assert_eq!(map_role(&mappings, &typed, &raw, Role::Viewer), Role::Editor);
    }
}
