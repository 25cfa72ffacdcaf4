// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod context;
pub mod event_log;
pub mod exceptions;
pub mod farmer;
mod pipeline;
pub mod orchestrator;
pub mod watchdog;
pub mod engine;

// Re-export the engine surface for convenience
pub use context::{Collaborators, FarmContext};
pub use engine::FarmEngine;
pub use farmer::{Farmer, StartRefusal};
pub use orchestrator::{CycleExit, CycleOrchestrator};
