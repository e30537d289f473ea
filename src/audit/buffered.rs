// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-memory ring buffer audit logger. No asynchronous workers, no disk I/O:
//! a fixed-capacity circular sequence behind one reader/writer lock.

use super::{AuditError, Event, Logger};
use crate::security::locks::{resilient_read, resilient_write};
use std::sync::RwLock;

struct Ring {
    slots: Vec<Option<Event>>,
    write_index: usize,
    count: usize,
}

/// Fixed-capacity in-memory audit ring. Once full, the oldest event is
/// overwritten by the next write.
pub struct BufferedLogger {
    capacity: usize,
    ring: RwLock<Ring>,
}

impl BufferedLogger {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "buffered audit capacity must be positive");
        Self {
            capacity,
            ring: RwLock::new(Ring {
                slots: vec![None; capacity],
                write_index: 0,
                count: 0,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Return events oldest-to-newest, optionally filtered by predicate.
    pub fn get_events<F>(&self, filter: Option<F>) -> Vec<Event>
    where
        F: Fn(&Event) -> bool,
    {
        let ring = resilient_read(&self.ring);
        let n = self.capacity;
        let start = (ring.write_index + n - ring.count) % n;
        let mut out = Vec::with_capacity(ring.count);
        for i in 0..ring.count {
            let idx = (start + i) % n;
            if let Some(event) = &ring.slots[idx] {
                match &filter {
                    Some(f) if !f(event) => continue,
                    _ => out.push(event.clone()),
                }
            }
        }
        out
    }

    /// Return up to `n` most recent events, newest first.
    pub fn recent(&self, n: usize) -> Vec<Event> {
        let mut all = self.get_events::<fn(&Event) -> bool>(None);
        all.reverse();
        all.truncate(n);
        all
    }
}

impl Logger for BufferedLogger {
    fn log(&self, mut event: Event) -> Result<(), AuditError> {
        let mut ring = resilient_write(&self.ring);
        if event.id.is_empty() {
            event.id = uuid::Uuid::new_v4().to_string();
        }
        let n = self.capacity;
        let idx = ring.write_index;
        ring.slots[idx] = Some(event);
        ring.write_index = (idx + 1) % n;
        ring.count = (ring.count + 1).min(n);
        Ok(())
    }

    fn event_count(&self) -> u64 {
        resilient_read(&self.ring).count as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::event::{Action, ResourceType};
    use crate::audit::Status;

    fn ev(resource_id: &str) -> Event {
        Event::new(Action::Create, ResourceType::Node, Status::Success).with_resource_id(resource_id)
    }

    #[test]
    fn test_ring_overflow() {
        let logger = BufferedLogger::new(10);
        for i in 0..15 {
            logger.log(ev(&format!("node{i}"))).unwrap();
        }
        let events = logger.get_events::<fn(&Event) -> bool>(None);
        assert_eq!(events.len(), 10);
        assert_eq!(events[0].resource_id.as_deref(), Some("node5"));
        assert_eq!(events[9].resource_id.as_deref(), Some("node14"));
    }

    #[test]
    fn test_under_capacity() {
        let logger = BufferedLogger::new(10);
        for i in 0..3 {
            logger.log(ev(&format!("node{i}"))).unwrap();
        }
        assert_eq!(logger.event_count(), 3);
        let events = logger.get_events::<fn(&Event) -> bool>(None);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].resource_id.as_deref(), Some("node0"));
    }

    #[test]
    fn test_filter_predicate() {
        let logger = BufferedLogger::new(10);
        for i in 0..6 {
            logger.log(ev(&format!("node{i}"))).unwrap();
        }
        let evens = logger.get_events(Some(|e: &Event| {
            e.resource_id.as_deref().unwrap().ends_with(['0', '2', '4'])
        }));
        assert_eq!(evens.len(), 3);
    }

    #[test]
    fn test_recent_reverse_chronological() {
        let logger = BufferedLogger::new(5);
        for i in 0..5 {
            logger.log(ev(&format!("node{i}"))).unwrap();
        }
        let recent = logger.recent(2);
        assert_eq!(recent[0].resource_id.as_deref(), Some("node4"));
        assert_eq!(recent[1].resource_id.as_deref(), Some("node3"));
    }
}
