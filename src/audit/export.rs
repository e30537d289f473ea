// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Export the on-disk audit format to JSON, NDJSON, CSV, or RFC 5424 syslog.

use super::event::{Action, PersistentEvent, ResourceType, Severity, Status};
use super::AuditError;
use chrono::{DateTime, Utc};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// Filters applied to the concatenated stream before export or reporting.
#[derive(Debug, Clone, Default)]
pub struct ExportFilter {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub severity: Option<Severity>,
    pub action: Option<Action>,
    pub username: Option<String>,
    pub resource_type: Option<ResourceType>,
    /// 0 = unlimited.
    pub max_results: usize,
}

impl ExportFilter {
    fn matches(&self, e: &PersistentEvent) -> bool {
        if let Some(start) = self.start {
            if e.event.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if e.event.timestamp > end {
                return false;
            }
        }
        if let Some(sev) = self.severity {
            if e.severity != sev {
                return false;
            }
        }
        if let Some(action) = self.action {
            if e.event.action != action {
                return false;
            }
        }
        if let Some(username) = &self.username {
            if e.event.username.as_deref() != Some(username.as_str()) {
                return false;
            }
        }
        if let Some(resource_type) = self.resource_type {
            if e.event.resource_type != resource_type {
                return false;
            }
        }
        true
    }
}

/// Read every segment file in `dir` (directory-scan order, transparently
/// gunzipping `.gz` segments) and return the events matching `filter`.
/// Malformed lines are skipped rather than aborting the scan.
pub fn scan_segments(dir: &Path, filter: &ExportFilter) -> Result<Vec<PersistentEvent>, AuditError> {
    let mut paths: Vec<_> = fs::read_dir(dir)
        .map_err(AuditError::ReadSnapshot)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("audit-"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    let mut out = Vec::new();
    for path in paths {
        let reader: Box<dyn BufRead> = if path.extension().and_then(|e| e.to_str()) == Some("gz") {
            let file = File::open(&path).map_err(AuditError::OpenSegment)?;
            Box::new(BufReader::new(flate2::read::GzDecoder::new(file)))
        } else {
            let file = File::open(&path).map_err(AuditError::OpenSegment)?;
            Box::new(BufReader::new(file))
        };
        for line in reader.lines() {
            let line = match line {
                Ok(l) => l,
                Err(_) => continue,
            };
            if line.trim().is_empty() {
                continue;
            }
            let parsed: PersistentEvent = match serde_json::from_str(&line) {
                Ok(p) => p,
                Err(_) => continue,
            };
            if filter.matches(&parsed) {
                out.push(parsed);
                if filter.max_results > 0 && out.len() >= filter.max_results {
                    return Ok(out);
                }
            }
        }
    }
    Ok(out)
}

/// Serialize events as a single JSON array.
pub fn export_json_array(events: &[PersistentEvent]) -> Result<String, AuditError> {
    serde_json::to_string_pretty(events).map_err(|e| AuditError::WriteSegment(std::io::Error::other(e)))
}

/// Serialize events as newline-delimited JSON.
pub fn export_ndjson(events: &[PersistentEvent]) -> Result<String, AuditError> {
    let mut out = String::new();
    for e in events {
        let line = serde_json::to_string(e).map_err(|e| AuditError::WriteSegment(std::io::Error::other(e)))?;
        out.push_str(&line);
        out.push('\n');
    }
    Ok(out)
}

const CSV_HEADER: &str = "id,timestamp,severity,username,user id,action,resource type,resource id,status,error message,client address,client agent";

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Serialize events as CSV with the fixed header order. The writer buffers
/// internally and must be flushed explicitly — done here by returning the
/// fully materialized string only after every row has been written.
pub fn export_csv(events: &[PersistentEvent]) -> Result<String, AuditError> {
    let mut buf = Vec::new();
    writeln!(buf, "{CSV_HEADER}").map_err(AuditError::WriteSegment)?;
    for e in events {
        writeln!(
            buf,
            "{},{},{},{},{},{},{},{},{},{},{},{}",
            csv_escape(&e.event.id),
            csv_escape(&e.event.timestamp.to_rfc3339()),
            csv_escape(&e.severity.to_string()),
            csv_escape(e.event.username.as_deref().unwrap_or("")),
            csv_escape(e.event.user_id.as_deref().unwrap_or("")),
            csv_escape(&e.event.action),
            csv_escape(&e.event.resource_type),
            csv_escape(e.event.resource_id.as_deref().unwrap_or("")),
            csv_escape(&e.event.status.to_string()),
            csv_escape(e.event.error_message.as_deref().unwrap_or("")),
            csv_escape(e.event.ip_address.as_deref().unwrap_or("")),
            csv_escape(e.event.user_agent.as_deref().unwrap_or("")),
        )
        .map_err(AuditError::WriteSegment)?;
    }
    buf.flush().map_err(AuditError::WriteSegment)?;
    String::from_utf8(buf).map_err(|e| AuditError::WriteSegment(std::io::Error::other(e)))
}

fn syslog_severity(severity: Severity) -> u8 {
    match severity {
        Severity::Critical => 2,
        Severity::Warning => 4,
        Severity::Info => 6,
    }
}

/// Serialize events as RFC 5424 syslog lines, facility 16 (local0).
pub fn export_syslog(events: &[PersistentEvent]) -> Result<String, AuditError> {
    const FACILITY: u8 = 16;
    let mut out = String::new();
    for e in events {
        let pri = FACILITY * 8 + syslog_severity(e.severity);
        let status = match e.event.status {
            Status::Success => "success",
            Status::Failure => "failure",
        };
        out.push_str(&format!(
            "<{}>1 {} - graphdb-trust - {} - action={} resource_type={} status={}\n",
            pri,
            e.event.timestamp.to_rfc3339(),
            e.event.id,
            e.event.action,
            e.event.resource_type,
            status,
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::event::{Action, Event, ResourceType};
    use crate::audit::{PersistentLogger, PersistentLoggerConfig};

    fn sample_segment(dir: &Path) {
        let mut config = PersistentLoggerConfig::new(dir);
        config.compress = false;
        let logger = PersistentLogger::open(config).unwrap();
        logger.log(Event::new(Action::Auth, ResourceType::Auth, Status::Success).with_username("alice")).unwrap();
        logger.log(Event::new(Action::Delete, ResourceType::Node, Status::Failure).with_username("bob")).unwrap();
        logger.close().unwrap();
    }

    #[test]
    fn test_scan_and_export_formats() {
        let tmp = tempfile::tempdir().unwrap();
        sample_segment(tmp.path());

        let events = scan_segments(tmp.path(), &ExportFilter::default()).unwrap();
        assert_eq!(events.len(), 2);

        let json = export_json_array(&events).unwrap();
        assert!(json.contains("alice"));

        let ndjson = export_ndjson(&events).unwrap();
        assert_eq!(ndjson.lines().count(), 2);

        let csv = export_csv(&events).unwrap();
        assert!(csv.starts_with(CSV_HEADER));
        assert_eq!(csv.lines().count(), 3);

        let syslog = export_syslog(&events).unwrap();
        assert!(syslog.lines().next().unwrap().starts_with("<134>1"));
    }

    #[test]
    fn test_filter_by_username() {
        let tmp = tempfile::tempdir().unwrap();
        sample_segment(tmp.path());
        let mut filter = ExportFilter::default();
        filter.username = Some("alice".to_string());
        let events = scan_segments(tmp.path(), &filter).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event.username.as_deref(), Some("alice"));
    }

    #[test]
    fn test_max_results() {
        let tmp = tempfile::tempdir().unwrap();
        sample_segment(tmp.path());
        let mut filter = ExportFilter::default();
        filter.max_results = 1;
        let events = scan_segments(tmp.path(), &filter).unwrap();
        assert_eq!(events.len(), 1);
    }
}
