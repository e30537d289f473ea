// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! On-disk, hash-chained, rotating audit log.
//!
//! Segments are named `audit-YYYY-MM-DD.jsonl`, one JSON object per line, no
//! enclosing array. Every entry's `event_hash` covers the previous entry's
//! hash, so truncating or editing any line breaks every hash after it.

use super::event::{PersistentEvent, Severity};
use super::{AuditError, Event, Logger};
use crate::security::locks::resilient_write;
use chrono::{DateTime, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

const SEGMENT_PREFIX: &str = "audit-";
const SEGMENT_SUFFIX: &str = ".jsonl";
const ROTATION_CHECK_INTERVAL: Duration = Duration::from_secs(60);
const CLEANUP_CHECK_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Construction parameters for [`PersistentLogger`].
pub struct PersistentLoggerConfig {
    pub dir: PathBuf,
    /// Rotate when bytes written to the active segment reach this size.
    /// Zero disables the size trigger.
    pub rotation_size_bytes: u64,
    /// Rotate when this much wall time has passed since the last rotation.
    /// Zero disables the time trigger.
    pub rotation_interval: Duration,
    pub compress: bool,
    pub retention_days: u32,
}

impl PersistentLoggerConfig {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            rotation_size_bytes: 100 * 1024 * 1024,
            rotation_interval: Duration::from_secs(24 * 60 * 60),
            compress: true,
            retention_days: 90,
        }
    }
}

struct ActiveSegment {
    path: PathBuf,
    writer: BufWriter<File>,
    bytes_written: u64,
    events_in_segment: u64,
    last_rotation: DateTime<Utc>,
}

struct Inner {
    active: ActiveSegment,
    last_hash: Option<String>,
    total_events: u64,
}

/// Tamper-evident, rotating, on-disk audit logger.
pub struct PersistentLogger {
    dir: PathBuf,
    rotation_size_bytes: u64,
    rotation_interval: Duration,
    compress: bool,
    retention_days: u32,
    inner: Mutex<Inner>,
    stop: Arc<AtomicBool>,
    workers: RwLock<Vec<JoinHandle<()>>>,
}

impl PersistentLogger {
    /// Open (or create) the log directory, recover the chain tip from the
    /// latest segment if one exists, and start the background workers.
    pub fn open(config: PersistentLoggerConfig) -> Result<Arc<Self>, AuditError> {
        fs::create_dir_all(&config.dir).map_err(AuditError::CreateSegment)?;

        let (last_hash, latest_path) = recover_chain_tip(&config.dir)?;
        let today_path = today_segment_path(&config.dir);
        let (path, bytes_written) = match latest_path {
            Some(p) if p == today_path => {
                let len = fs::metadata(&p).map_err(AuditError::OpenSegment)?.len();
                (p, len)
            }
            _ => (today_path, 0),
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(AuditError::OpenSegment)?;

        let inner = Inner {
            active: ActiveSegment {
                path,
                writer: BufWriter::new(file),
                bytes_written,
                events_in_segment: 0,
                last_rotation: Utc::now(),
            },
            last_hash,
            total_events: 0,
        };

        let logger = Arc::new(Self {
            dir: config.dir,
            rotation_size_bytes: config.rotation_size_bytes,
            rotation_interval: config.rotation_interval,
            compress: config.compress,
            retention_days: config.retention_days,
            inner: Mutex::new(inner),
            stop: Arc::new(AtomicBool::new(false)),
            workers: RwLock::new(Vec::new()),
        });

        logger.spawn_workers();
        Ok(logger)
    }

    fn spawn_workers(self: &Arc<Self>) {
        let mut workers = self.workers.write().unwrap_or_else(|p| p.into_inner());

        let rotation_logger = Arc::clone(self);
        let rotation_stop = Arc::clone(&self.stop);
        workers.push(std::thread::spawn(move || {
            while !rotation_stop.load(Ordering::SeqCst) {
                std::thread::sleep(ROTATION_CHECK_INTERVAL);
                if rotation_stop.load(Ordering::SeqCst) {
                    break;
                }
                let mut inner = match rotation_logger.inner.lock() {
                    Ok(g) => g,
                    Err(p) => p.into_inner(),
                };
                if rotation_logger.rotation_due(&inner.active) {
                    if let Err(e) = rotation_logger.rotate(&mut inner) {
                        tracing::error!(target: "audit", error = %e, "scheduled rotation failed");
                    }
                }
            }
        }));

        let cleanup_logger = Arc::clone(self);
        let cleanup_stop = Arc::clone(&self.stop);
        workers.push(std::thread::spawn(move || {
            while !cleanup_stop.load(Ordering::SeqCst) {
                std::thread::sleep(CLEANUP_CHECK_INTERVAL);
                if cleanup_stop.load(Ordering::SeqCst) {
                    break;
                }
                if let Err(e) = cleanup_logger.run_retention_cleanup() {
                    tracing::error!(target: "audit", error = %e, "retention cleanup failed");
                }
            }
        }));
    }

    fn rotation_due(&self, active: &ActiveSegment) -> bool {
        (self.rotation_size_bytes > 0 && active.bytes_written >= self.rotation_size_bytes)
            || (!self.rotation_interval.is_zero()
                && Utc::now().signed_duration_since(active.last_rotation)
                    >= chrono::Duration::from_std(self.rotation_interval).unwrap_or_default())
    }

    fn run_retention_cleanup(&self) -> Result<(), AuditError> {
        let cutoff = Utc::now() - chrono::Duration::days(self.retention_days as i64);
        for entry in fs::read_dir(&self.dir).map_err(AuditError::ReadSnapshot)? {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            let path = entry.path();
            if !is_segment_file(&path) {
                continue;
            }
            if let Ok(meta) = entry.metadata() {
                if let Ok(modified) = meta.modified() {
                    let modified: DateTime<Utc> = modified.into();
                    if modified < cutoff {
                        if let Err(e) = fs::remove_file(&path) {
                            tracing::warn!(target: "audit", path = %path.display(), error = %e, "failed to remove expired segment");
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Append an event at the given severity. `log` (the `Logger` trait
    /// method) calls this with [`Severity::Info`]; callers that need a
    /// specific severity (e.g. `logCritical` in the source material) call
    /// this directly.
    pub fn log_with_severity(&self, event: Event, severity: Severity) -> Result<(), AuditError> {
        let mut inner = resilient_write_mutex(&self.inner);
        self.write_locked(&mut inner, event, severity)?;
        if self.rotation_due(&inner.active) {
            self.rotate(&mut inner)?;
        }
        Ok(())
    }

    pub fn log_critical(&self, event: Event) -> Result<(), AuditError> {
        self.log_with_severity(event, Severity::Critical)
    }

    fn write_locked(
        &self,
        inner: &mut Inner,
        mut event: Event,
        severity: Severity,
    ) -> Result<(), AuditError> {
        if event.id.is_empty() {
            event.id = uuid::Uuid::new_v4().to_string();
        }
        let mut wrapped = PersistentEvent {
            event,
            severity,
            previous_hash: inner.last_hash.clone(),
            event_hash: String::new(),
        };
        let unhashed = wrapped.canonical_bytes_without_hash();
        let hash = crate::crypto::sha256_hex(&unhashed);
        wrapped.event_hash = hash.clone();

        let mut line = serde_json::to_vec(&wrapped)
            .map_err(|e| AuditError::WriteSegment(std::io::Error::other(e)))?;
        line.push(b'\n');

        inner
            .active
            .writer
            .write_all(&line)
            .map_err(AuditError::WriteSegment)?;
        inner.active.writer.flush().map_err(AuditError::WriteSegment)?;
        inner
            .active
            .writer
            .get_ref()
            .sync_all()
            .map_err(AuditError::SyncSegment)?;

        inner.active.bytes_written += line.len() as u64;
        inner.active.events_in_segment += 1;
        inner.last_hash = Some(hash);
        inner.total_events += 1;

        Ok(())
    }

    fn rotate(&self, inner: &mut Inner) -> Result<(), AuditError> {
        if let Err(e) = inner.active.writer.flush() {
            tracing::warn!(target: "audit", error = %e, "flush failed during rotation");
        }

        let old_path = inner.active.path.clone();
        let compress = self.compress;
        if compress {
            let gz_source = old_path.clone();
            std::thread::spawn(move || {
                if let Err(e) = compress_segment(&gz_source) {
                    tracing::warn!(target: "audit", path = %gz_source.display(), error = %e, "segment compression failed");
                }
            });
        }

        let new_path = today_segment_path(&self.dir);
        let new_path = if new_path == old_path || new_path.exists() {
            unique_segment_path(&self.dir)
        } else {
            new_path
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&new_path)
            .map_err(AuditError::OpenSegment)?;

        inner.active = ActiveSegment {
            path: new_path,
            writer: BufWriter::new(file),
            bytes_written: 0,
            events_in_segment: 0,
            last_rotation: Utc::now(),
        };

        Ok(())
    }

    /// Synchronously stop both background workers and close the active
    /// segment. Does not return until both workers have acknowledged.
    pub fn close(&self) -> Result<(), AuditError> {
        self.stop.store(true, Ordering::SeqCst);
        let mut workers = self.workers.write().unwrap_or_else(|p| p.into_inner());
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
        let mut inner = resilient_write_mutex(&self.inner);
        inner
            .active
            .writer
            .flush()
            .map_err(AuditError::CloseSegment)?;
        Ok(())
    }

    pub fn directory(&self) -> &Path {
        &self.dir
    }
}

fn resilient_write_mutex<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|p| p.into_inner())
}

impl Logger for PersistentLogger {
    fn log(&self, event: Event) -> Result<(), AuditError> {
        self.log_with_severity(event, Severity::Info)
    }

    fn event_count(&self) -> u64 {
        resilient_write_mutex(&self.inner).total_events
    }
}

fn is_segment_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with(SEGMENT_PREFIX))
        .unwrap_or(false)
}

fn today_segment_path(dir: &Path) -> PathBuf {
    dir.join(format!(
        "{SEGMENT_PREFIX}{}{SEGMENT_SUFFIX}",
        Utc::now().format("%Y-%m-%d")
    ))
}

fn unique_segment_path(dir: &Path) -> PathBuf {
    let mut n = 1;
    loop {
        let candidate = dir.join(format!(
            "{SEGMENT_PREFIX}{}-{n}{SEGMENT_SUFFIX}",
            Utc::now().format("%Y-%m-%d")
        ));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

/// Scan `dir` for the lexicographically latest segment (filenames sort by
/// date) and parse its final line to recover the chain tip. A directory
/// with no segments is not an error — it means this is the first run.
fn recover_chain_tip(dir: &Path) -> Result<(Option<String>, Option<PathBuf>), AuditError> {
    let mut candidates: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(AuditError::OpenSegment)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.extension().and_then(|e| e.to_str()) == Some("jsonl")
                && is_segment_file(p)
        })
        .collect();
    candidates.sort();

    let Some(latest) = candidates.into_iter().next_back() else {
        return Ok((None, None));
    };

    let file = File::open(&latest).map_err(AuditError::OpenSegment)?;
    let reader = BufReader::new(file);
    let mut last_hash = None;
    for line in reader.lines() {
        let line = line.map_err(AuditError::OpenSegment)?;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(parsed) = serde_json::from_str::<PersistentEvent>(&line) {
            last_hash = Some(parsed.event_hash);
        }
    }
    Ok((last_hash, Some(latest)))
}

fn compress_segment(path: &Path) -> std::io::Result<()> {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let gz_path = path.with_extension("jsonl.gz");
    let data = fs::read(path)?;
    let gz_file = File::create(&gz_path)?;
    let mut encoder = GzEncoder::new(gz_file, Compression::default());
    let result = encoder.write_all(&data).and_then(|_| encoder.finish().map(|_| ()));
    match result {
        Ok(()) => {
            fs::remove_file(path)?;
            Ok(())
        }
        Err(e) => {
            let _ = fs::remove_file(&gz_path);
            Err(e)
        }
    }
}

/// Verify the hash chain over a single segment file, transparently
/// gunzipping if it ends in `.gz`. Returns `Ok(())` only if every line
/// parses and every hash matches.
pub fn verify_integrity(path: &Path) -> Result<(), AuditError> {
    let reader: Box<dyn BufRead> = if path.extension().and_then(|e| e.to_str()) == Some("gz") {
        let file = File::open(path).map_err(AuditError::OpenSegment)?;
        Box::new(BufReader::new(flate2::read::GzDecoder::new(file)))
    } else {
        let file = File::open(path).map_err(AuditError::OpenSegment)?;
        Box::new(BufReader::new(file))
    };

    let mut prev: Option<String> = None;
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(AuditError::OpenSegment)?;
        if line.trim().is_empty() {
            continue;
        }
        let parsed: PersistentEvent = serde_json::from_str(&line).map_err(|e| AuditError::Malformed {
            line: idx + 1,
            reason: e.to_string(),
        })?;
        if parsed.previous_hash != prev {
            return Err(AuditError::IntegrityMismatch {
                line: idx + 1,
                expected: prev.unwrap_or_default(),
                got: parsed.previous_hash.clone().unwrap_or_default(),
            });
        }
        let expected_hash = parsed.event_hash.clone();
        let recomputed = crate::crypto::sha256_hex(&parsed.canonical_bytes_without_hash());
        if recomputed != expected_hash {
            return Err(AuditError::IntegrityMismatch {
                line: idx + 1,
                expected: expected_hash,
                got: recomputed,
            });
        }
        prev = Some(expected_hash);
    }
    Ok(())
}
