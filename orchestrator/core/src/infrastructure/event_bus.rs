// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Event Log entries
//
// Provides in-memory event streaming using tokio broadcast channels.
// Every entry appended to the Event Log is also published here so that a UI
// or the CLI can follow the engine live. The durable trail is the Event Log.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::domain::events::LogEntry;
use crate::domain::village::VillageId;

/// Event bus for publishing and subscribing to engine events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<LogEntry>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish(&self, entry: LogEntry) {
        debug!("Publishing event: {:?}", entry.event);

        let receiver_count = self.sender.send(entry).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all engine events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe and filter for events concerning one unit
    pub fn subscribe_unit(&self, unit: VillageId) -> UnitEventReceiver {
        UnitEventReceiver {
            receiver: self.sender.subscribe(),
            unit,
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Receiver for all engine events
pub struct EventReceiver {
    receiver: broadcast::Receiver<LogEntry>,
}

impl EventReceiver {
    /// Receive the next event (waits until one is available)
    pub async fn recv(&mut self) -> Result<LogEntry, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    /// Try to receive an event without waiting
    pub fn try_recv(&mut self) -> Result<LogEntry, EventBusError> {
        self.receiver.try_recv().map_err(map_try_recv_error)
    }
}

/// Receiver for unit-specific events (filtered)
pub struct UnitEventReceiver {
    receiver: broadcast::Receiver<LogEntry>,
    unit: VillageId,
}

impl UnitEventReceiver {
    /// Receive the next event for the unit, skipping everything else
    pub async fn recv(&mut self) -> Result<LogEntry, EventBusError> {
        loop {
            let entry = self.receiver.recv().await.map_err(map_recv_error)?;
            if self.matches_unit(&entry) {
                return Ok(entry);
            }
        }
    }

    /// Next buffered event for the unit without waiting
    pub fn try_recv(&mut self) -> Result<LogEntry, EventBusError> {
        loop {
            let entry = self.receiver.try_recv().map_err(map_try_recv_error)?;
            if self.matches_unit(&entry) {
                return Ok(entry);
            }
        }
    }

    fn matches_unit(&self, entry: &LogEntry) -> bool {
        use crate::domain::events::FarmEvent;

        match &entry.event {
            FarmEvent::AttackSent { unit, .. } | FarmEvent::FarmerStopped { unit, .. } => {
                *unit == self.unit
            }
            FarmEvent::EngineStarted
            | FarmEvent::EngineStopped { .. }
            | FarmEvent::CycleBegin { .. }
            | FarmEvent::CycleEnd { .. }
            | FarmEvent::TargetIgnored { .. }
            | FarmEvent::TargetIncluded { .. }
            | FarmEvent::WatchdogRestart { .. } => false,
        }
    }
}

fn map_recv_error(e: broadcast::error::RecvError) -> EventBusError {
    match e {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

fn map_try_recv_error(e: broadcast::error::TryRecvError) -> EventBusError {
    match e {
        broadcast::error::TryRecvError::Empty => EventBusError::Empty,
        broadcast::error::TryRecvError::Closed => EventBusError::Closed,
        broadcast::error::TryRecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
