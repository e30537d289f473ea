// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Report generation over a filtered audit stream: totals, histograms, and
//! top-N users/resources.
//!
//! Sort order for "top" collections is an open question in the source
//! material; this implementation stabilizes on descending count with ties
//! broken by key ascending, stated here rather than left to chance.

use super::event::{PersistentEvent, Severity, Status};
use std::collections::HashMap;

#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct Report {
    pub total_count: u64,
    pub by_severity: HashMap<String, u64>,
    pub by_action: HashMap<String, u64>,
    pub by_status: HashMap<String, u64>,
    pub top_users: Vec<(String, u64)>,
    pub top_resources: Vec<(String, u64)>,
}

fn severity_key(s: Severity) -> String {
    s.to_string()
}

fn status_key(s: Status) -> String {
    s.to_string()
}

/// Sort a `(key, count)` histogram descending by count, ties broken by key
/// ascending, and keep the first `top_n`.
fn top_n(mut counts: HashMap<String, u64>, top_n: usize) -> Vec<(String, u64)> {
    let mut entries: Vec<(String, u64)> = counts.drain().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(top_n);
    entries
}

/// Accumulate a report over `events`. `top_n` bounds the users/resources
/// collections; pass `usize::MAX` for unlimited.
pub fn generate_report(events: &[PersistentEvent], top_n_count: usize) -> Report {
    let mut report = Report::default();
    let mut users: HashMap<String, u64> = HashMap::new();
    let mut resources: HashMap<String, u64> = HashMap::new();

    for e in events {
        report.total_count += 1;
        *report.by_severity.entry(severity_key(e.severity)).or_insert(0) += 1;
        *report.by_action.entry(e.event.action.to_string()).or_insert(0) += 1;
        *report.by_status.entry(status_key(e.event.status)).or_insert(0) += 1;

        if let Some(username) = &e.event.username {
            *users.entry(username.clone()).or_insert(0) += 1;
        }
        let resource_key = format!(
            "{}:{}",
            e.event.resource_type,
            e.event.resource_id.as_deref().unwrap_or("")
        );
        *resources.entry(resource_key).or_insert(0) += 1;
    }

    report.top_users = top_n(users, top_n_count);
    report.top_resources = top_n(resources, top_n_count);
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::event::{Action, Event, ResourceType};

    fn event(action: Action, username: &str, resource_type: ResourceType, resource_id: &str, severity: Severity) -> PersistentEvent {
        PersistentEvent {
            event: Event::new(action, resource_type, Status::Success)
                .with_username(username)
                .with_resource_id(resource_id),
            severity,
            previous_hash: None,
            event_hash: "deadbeef".to_string(),
        }
    }

    #[test]
    fn test_report_totals_and_histograms() {
        let events = vec![
            event(Action::Auth, "alice", ResourceType::Auth, "s1", Severity::Info),
            event(Action::Auth, "alice", ResourceType::Auth, "s2", Severity::Info),
            event(Action::Delete, "bob", ResourceType::Node, "n1", Severity::Critical),
        ];
        let report = generate_report(&events, 10);
        assert_eq!(report.total_count, 3);
        assert_eq!(report.by_action["auth"], 2);
        assert_eq!(report.by_severity["info"], 2);
        assert_eq!(report.by_severity["critical"], 1);
    }

    #[test]
    fn test_top_n_deterministic_tiebreak() {
        let events = vec![
            event(Action::Create, "zara", ResourceType::Node, "n1", Severity::Info),
            event(Action::Create, "amir", ResourceType::Node, "n2", Severity::Info),
        ];
        let report = generate_report(&events, 10);
        assert_eq!(report.top_users, vec![("amir".to_string(), 1), ("zara".to_string(), 1)]);
    }

    #[test]
    fn test_top_n_truncation() {
        let events = vec![
            event(Action::Create, "u1", ResourceType::Node, "n1", Severity::Info),
            event(Action::Create, "u2", ResourceType::Node, "n2", Severity::Info),
            event(Action::Create, "u2", ResourceType::Node, "n2", Severity::Info),
            event(Action::Create, "u3", ResourceType::Node, "n3", Severity::Info),
        ];
        let report = generate_report(&events, 2);
        assert_eq!(report.top_users.len(), 2);
        assert_eq!(report.top_users[0], ("u2".to_string(), 2));
    }
}
