// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Farmer Core
//!
//! Automated multi-agent attack scheduling engine.
//!
//! # Architecture
//!
//! - **domain:** pure types, filter, outcome routing, settings, collaborator traits
//! - **application:** Unit Agents, Cycle Orchestrator, watchdog, engine facade
//! - **infrastructure:** event bus, key-value stores, in-memory world

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
