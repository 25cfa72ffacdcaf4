// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Event Log Application Service
//!
//! Bounded ring buffer of [`LogEntry`] records. Loaded once from the
//! [`KeyValueStore`] at engine construction and written back on every
//! mutation. Every appended entry is also published on the [`EventBus`].
//!
//! Persistence failures are logged and swallowed: the in-memory log stays
//! authoritative for the session.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::events::{FarmEvent, LogEntry};
use crate::domain::repository::{KeyValueStore, PersistenceError, LOGS_KEY};
use crate::infrastructure::event_bus::EventBus;

struct Ring {
    entries: VecDeque<LogEntry>,
    limit: usize,
}

impl Ring {
    fn trim(&mut self) {
        while self.entries.len() > self.limit {
            self.entries.pop_front();
        }
    }
}

pub struct EventLog {
    ring: Mutex<Ring>,
    store: Arc<dyn KeyValueStore>,
    bus: EventBus,
    // Serializes writers so the last save always carries the newest snapshot
    persist_lock: tokio::sync::Mutex<()>,
}

impl EventLog {
    pub async fn load(store: Arc<dyn KeyValueStore>, bus: EventBus, limit: usize) -> Self {
        let entries = match load_entries(store.as_ref()).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Failed to load event log, starting empty");
                Vec::new()
            }
        };
        debug!(entries = entries.len(), limit, "Event log loaded");

        let mut ring = Ring {
            entries: entries.into(),
            limit: limit.max(1),
        };
        ring.trim();

        Self {
            ring: Mutex::new(ring),
            store,
            bus,
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub async fn record(&self, event: FarmEvent) {
        let entry = LogEntry::now(event);
        {
            let mut ring = self.ring.lock();
            ring.entries.push_back(entry.clone());
            ring.trim();
        }
        self.bus.publish(entry);
        self.persist().await;
    }

    /// Oldest first.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.ring.lock().entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.ring.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub async fn clear(&self) {
        self.ring.lock().entries.clear();
        self.persist().await;
    }

    pub async fn set_limit(&self, limit: usize) {
        {
            let mut ring = self.ring.lock();
            ring.limit = limit.max(1);
            ring.trim();
        }
        self.persist().await;
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        let snapshot = self.entries();
        let result = match serde_json::to_vec(&snapshot) {
            Ok(bytes) => self.store.save(LOGS_KEY, &bytes).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist event log");
        }
    }
}

async fn load_entries(store: &dyn KeyValueStore) -> Result<Vec<LogEntry>, PersistenceError> {
    match store.load(LOGS_KEY).await? {
        Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
        None => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::repositories::InMemoryStore;

    #[tokio::test]
    async fn test_ring_drops_oldest() {
        let store = Arc::new(InMemoryStore::new());
        let log = EventLog::load(store, EventBus::new(16), 3).await;
        for farmers in 0..5 {
            log.record(FarmEvent::CycleBegin { farmers }).await;
        }
        let kept: Vec<FarmEvent> = log.entries().into_iter().map(|e| e.event).collect();
        assert_eq!(
            kept,
            vec![
                FarmEvent::CycleBegin { farmers: 2 },
                FarmEvent::CycleBegin { farmers: 3 },
                FarmEvent::CycleBegin { farmers: 4 },
            ]
        );
    }

    #[tokio::test]
    async fn test_entries_survive_reload() {
        let store = Arc::new(InMemoryStore::new());
        {
            let log = EventLog::load(store.clone(), EventBus::new(16), 10).await;
            log.record(FarmEvent::EngineStarted).await;
        }
        let log = EventLog::load(store.clone(), EventBus::new(16), 10).await;
        assert_eq!(log.len(), 1);

        log.clear().await;
        let reloaded = EventLog::load(store, EventBus::new(16), 10).await;
        assert!(reloaded.is_empty());
    }

    #[tokio::test]
    async fn test_corrupt_blob_starts_empty() {
        let store = Arc::new(InMemoryStore::new());
        store.save(LOGS_KEY, b"not json").await.unwrap();
        let log = EventLog::load(store, EventBus::new(16), 10).await;
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn test_record_publishes_and_shrinks() {
        let store = Arc::new(InMemoryStore::new());
        let bus = EventBus::new(16);
        let mut receiver = bus.subscribe();
        let log = EventLog::load(store, bus, 10).await;

        log.record(FarmEvent::EngineStarted).await;
        log.record(FarmEvent::CycleBegin { farmers: 1 }).await;
        assert_eq!(receiver.recv().await.unwrap().event, FarmEvent::EngineStarted);

        log.set_limit(1).await;
        assert_eq!(log.len(), 1);
    }
}
