// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Integration tests for the persistent audit log across process restarts:
//! the hash chain must stay continuous whether the log is reopened after a
//! clean close or left mid-segment, and the export/verify tooling must see
//! exactly what was written.

use graphdb_trust::audit::event::{Action, Event, ResourceType, Status};
use graphdb_trust::audit::export::{self, ExportFilter};
use graphdb_trust::audit::persistent::verify_integrity;
use graphdb_trust::{Logger, PersistentLogger, PersistentLoggerConfig};

fn config(dir: &std::path::Path) -> PersistentLoggerConfig {
    let mut config = PersistentLoggerConfig::new(dir);
    config.compress = false;
    config
}

#[test]
fn chain_survives_close_and_reopen() {
    let tmp = tempfile::tempdir().unwrap();

    let logger = PersistentLogger::open(config(tmp.path())).unwrap();
    for i in 0..5 {
        logger
            .log(Event::new(Action::Create, ResourceType::Node, Status::Success).with_resource_id(i.to_string()))
            .unwrap();
    }
    logger.close().unwrap();

    let logger = PersistentLogger::open(config(tmp.path())).unwrap();
    for i in 5..10 {
        logger
            .log(Event::new(Action::Create, ResourceType::Node, Status::Success).with_resource_id(i.to_string()))
            .unwrap();
    }
    logger.close().unwrap();

    let segment = tmp.path().join(format!("audit-{}.jsonl", chrono::Utc::now().format("%Y-%m-%d")));
    verify_integrity(&segment).expect("chain must verify across a close/reopen cycle");

    let events = export::scan_segments(tmp.path(), &ExportFilter::default()).unwrap();
    assert_eq!(events.len(), 10);
}

#[test]
fn same_day_rotation_never_reopens_a_completed_segment() {
    let tmp = tempfile::tempdir().unwrap();

    let mut cfg = config(tmp.path());
    cfg.rotation_size_bytes = 200;
    let logger = PersistentLogger::open(cfg).unwrap();

    for i in 0..30 {
        logger
            .log(Event::new(Action::Create, ResourceType::Node, Status::Success).with_resource_id(i.to_string()))
            .unwrap();
    }
    logger.close().unwrap();

    let mut segments: Vec<_> = std::fs::read_dir(tmp.path())
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("audit-") && n.ends_with(".jsonl"))
        })
        .collect();
    segments.sort();

    assert!(
        segments.len() >= 3,
        "expected rotation_size_bytes=200 to force at least 3 same-day segments, got {}",
        segments.len()
    );

    for segment in &segments {
        verify_integrity(segment)
            .unwrap_or_else(|e| panic!("segment {:?} failed to verify: {e}", segment));
    }

    let events = export::scan_segments(tmp.path(), &ExportFilter::default()).unwrap();
    assert_eq!(events.len(), 30);
    let resource_ids: std::collections::BTreeSet<_> = events
        .iter()
        .filter_map(|e| e.event.resource_id.clone())
        .collect();
    assert_eq!(resource_ids.len(), 30, "no event should have been overwritten by a later rotation reopening an earlier segment");
}

#[test]
fn export_filters_survive_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let logger = PersistentLogger::open(config(tmp.path())).unwrap();

    logger
        .log(Event::new(Action::Auth, ResourceType::Auth, Status::Success).with_username("alice"))
        .unwrap();
    logger
        .log(Event::new(Action::Auth, ResourceType::Auth, Status::Failure).with_username("bob"))
        .unwrap();
    logger.close().unwrap();

    let filter = ExportFilter {
        username: Some("alice".to_string()),
        ..Default::default()
    };
    let events = export::scan_segments(tmp.path(), &filter).unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event.username.as_deref(), Some("alice"));
}
