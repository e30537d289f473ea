// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! CSRF state store for the OIDC authorization-code flow: one-time,
//! TTL-bounded tokens with a background cleanup worker.

use crate::crypto;
use crate::security::locks::{resilient_read, resilient_write};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

const DEFAULT_TTL: Duration = Duration::from_secs(10 * 60);
const DEFAULT_CAPACITY: usize = 10_000;
const EVICTION_FRACTION: f64 = 0.10;
const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
pub struct StateEntry {
    pub token: String,
    pub nonce: String,
    pub created_at: DateTime<Utc>,
    pub redirect_uri: Option<String>,
}

struct Inner {
    entries: HashMap<String, (StateEntry, DateTime<Utc>)>,
}

/// Holds CSRF state entries created during an OIDC login attempt. Each
/// token is valid for one `validate_and_consume` call within its TTL.
pub struct StateStore {
    ttl: Duration,
    capacity: usize,
    inner: RwLock<Inner>,
    stop: Arc<AtomicBool>,
    worker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl StateStore {
    pub fn new() -> Arc<Self> {
        Self::with_config(DEFAULT_TTL, DEFAULT_CAPACITY)
    }

    pub fn with_config(ttl: Duration, capacity: usize) -> Arc<Self> {
        let store = Arc::new(Self {
            ttl,
            capacity,
            inner: RwLock::new(Inner { entries: HashMap::new() }),
            stop: Arc::new(AtomicBool::new(false)),
            worker: std::sync::Mutex::new(None),
        });
        store.spawn_cleanup_worker();
        store
    }

    fn spawn_cleanup_worker(self: &Arc<Self>) {
        let store = Arc::clone(self);
        let stop = Arc::clone(&self.stop);
        let handle = std::thread::spawn(move || {
            while !stop.load(Ordering::SeqCst) {
                std::thread::sleep(CLEANUP_INTERVAL);
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                store.remove_expired();
            }
        });
        *self.worker.lock().unwrap_or_else(|p| p.into_inner()) = Some(handle);
    }

    fn remove_expired(&self) {
        let now = Utc::now();
        let mut inner = resilient_write(&self.inner);
        inner.entries.retain(|_, (_, expires_at)| *expires_at > now);
    }

    /// Generate a fresh 32-byte URL-safe-base64 token with an accompanying
    /// 16-byte nonce, and store it.
    pub fn generate_state(&self, redirect_uri: Option<String>) -> StateEntry {
        let token = crypto::b64url_encode(&crypto::random_32());
        let nonce = crypto::b64url_encode(&crypto::random_16());
        let entry = StateEntry {
            token: token.clone(),
            nonce,
            created_at: Utc::now(),
            redirect_uri,
        };

        let mut inner = resilient_write(&self.inner);
        if inner.entries.len() >= self.capacity {
            evict_oldest(&mut inner.entries, self.capacity, EVICTION_FRACTION);
        }
        let expires_at = entry.created_at + chrono::Duration::from_std(self.ttl).unwrap_or_default();
        inner.entries.insert(token.clone(), (entry.clone(), expires_at));
        entry
    }

    /// Single-use: a successful call returns the entry and removes it. An
    /// expired or unknown token returns `None` without revealing which.
    pub fn validate_and_consume(&self, token: &str) -> Option<StateEntry> {
        let mut inner = resilient_write(&self.inner);
        let (entry, expires_at) = inner.entries.remove(token)?;
        if expires_at <= Utc::now() {
            return None;
        }
        Some(entry)
    }

    pub fn len(&self) -> usize {
        resilient_read(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stop the cleanup worker and await its acknowledgment.
    pub fn close(&self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.worker.lock().unwrap_or_else(|p| p.into_inner()).take() {
            let _ = handle.join();
        }
    }
}

fn evict_oldest(
    entries: &mut HashMap<String, (StateEntry, DateTime<Utc>)>,
    capacity: usize,
    fraction: f64,
) {
    let target_evictions = ((capacity as f64) * fraction).ceil() as usize;
    let mut by_age: Vec<(String, DateTime<Utc>)> =
        entries.iter().map(|(k, (e, _))| (k.clone(), e.created_at)).collect();
    by_age.sort_by_key(|(_, created_at)| *created_at);
    for (token, _) in by_age.into_iter().take(target_evictions.max(1)) {
        entries.remove(&token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csrf_one_time_use() {
        let store = StateStore::new();
        let entry = store.generate_state(None);
        assert!(store.validate_and_consume(&entry.token).is_some());
        assert!(store.validate_and_consume(&entry.token).is_none());
        store.close();
    }

    #[test]
    fn test_unknown_token_invalid() {
        let store = StateStore::new();
        assert!(store.validate_and_consume("not-a-real-token").is_none());
        store.close();
    }

    #[test]
    fn test_expired_token_invalid() {
        let store = StateStore::with_config(Duration::from_millis(1), DEFAULT_CAPACITY);
        let entry = store.generate_state(None);
        std::thread::sleep(Duration::from_millis(20));
        assert!(store.validate_and_consume(&entry.token).is_none());
        store.close();
    }

    #[test]
    fn test_eviction_on_overflow() {
        let store = StateStore::with_config(DEFAULT_TTL, 10);
        for _ in 0..15 {
            store.generate_state(None);
        }
        assert!(store.len() <= 10);
        store.close();
    }
}
