// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Audit core: a buffered in-memory ring and a tamper-evident persistent log,
//! both behind one `Logger` contract, plus export and reporting over the
//! on-disk format.

pub mod buffered;
pub mod event;
pub mod export;
pub mod persistent;
pub mod report;

pub use buffered::BufferedLogger;
pub use event::{Action, Event, PersistentEvent, ResourceType, Severity, Status};
pub use persistent::{PersistentLogger, PersistentLoggerConfig};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to create audit segment: {0}")]
    CreateSegment(std::io::Error),
    #[error("failed to open audit segment: {0}")]
    OpenSegment(std::io::Error),
    #[error("failed to write audit segment: {0}")]
    WriteSegment(std::io::Error),
    #[error("failed to sync audit segment: {0}")]
    SyncSegment(std::io::Error),
    #[error("failed to close audit segment: {0}")]
    CloseSegment(std::io::Error),
    #[error("failed to read audit snapshot: {0}")]
    ReadSnapshot(std::io::Error),
    #[error("malformed audit event at line {line}: {reason}")]
    Malformed { line: usize, reason: String },
    #[error(
        "integrity check failed at line {line}: expected hash {expected}, got {got}"
    )]
    IntegrityMismatch {
        line: usize,
        expected: String,
        got: String,
    },
}

/// Shared contract for the buffered ring and the persistent log.
pub trait Logger {
    /// Append an event. Returns the number of events held (buffered: ring
    /// size; persistent: lifetime counter) on success.
    fn log(&self, event: Event) -> Result<(), AuditError>;

    /// Number of events currently tracked by this logger.
    fn event_count(&self) -> u64;
}
