// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod repositories;
pub mod memory_world;

pub use event_bus::{EventBus, EventBusError, EventReceiver};
pub use memory_world::{InMemoryWorld, WorldSnapshot};
pub use repositories::{FileStore, InMemoryStore};
