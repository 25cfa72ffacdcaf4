// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # External Collaborator Interfaces
//!
//! Narrow async seams through which the engine reads the world and issues
//! orders. Implementations live in `crate::infrastructure`; the engine only
//! depends on these traits.
//!
//! | Trait | Responsibility |
//! |-------|----------------|
//! | [`TargetDirectory`] | Candidate targets around a unit, authoritative target status |
//! | [`GroupService`] | Group membership lookups and linking |
//! | [`LoadoutRegistry`] | Available loadouts and per-unit assignment |
//! | [`CommandApi`] | Dispatching attacks, querying incoming orders |
//! | [`UnitRoster`] | Controlled units and their cached state |
//!
//! Every implementation must tolerate repeated calls and return consistent
//! snapshots.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::order::{
    AttackOrder, CombatReport, IncomingOrder, Loadout, LoadoutId, TargetStatus, UnitSnapshot,
};
use crate::domain::village::{GroupId, PlayerId, Position, Target, Unit, VillageId};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum WorldError {
    #[error("Remote service unavailable: {0}")]
    Unavailable(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Command rejected: {0}")]
    Rejected(String),
    #[error("Remote call timed out")]
    Timeout,
}

#[async_trait]
pub trait TargetDirectory: Send + Sync {
    /// Every village in reach of `origin`, unfiltered.
    async fn load_targets(&self, origin: Position) -> Result<Vec<Target>, WorldError>;

    /// Current points, owner and protection of a single target.
    async fn target_status(&self, id: VillageId) -> Result<TargetStatus, WorldError>;
}

#[async_trait]
pub trait GroupService: Send + Sync {
    async fn members(&self, group: GroupId) -> Result<Vec<VillageId>, WorldError>;
    async fn link(&self, group: GroupId, village: VillageId) -> Result<(), WorldError>;
}

#[async_trait]
pub trait LoadoutRegistry: Send + Sync {
    async fn loadouts(&self) -> Result<Vec<Loadout>, WorldError>;
    async fn assigned(&self, unit: VillageId) -> Result<Vec<LoadoutId>, WorldError>;
    async fn assign(&self, unit: VillageId, loadouts: &[LoadoutId]) -> Result<(), WorldError>;
}

#[async_trait]
pub trait CommandApi: Send + Sync {
    async fn dispatch_attack(&self, order: &AttackOrder) -> Result<(), WorldError>;
    async fn incoming_orders(&self, target: VillageId) -> Result<Vec<IncomingOrder>, WorldError>;
}

#[async_trait]
pub trait UnitRoster: Send + Sync {
    fn player(&self) -> PlayerId;
    async fn controlled_units(&self) -> Result<Vec<Unit>, WorldError>;
    /// Cached state of one unit; `None` once the unit left the roster.
    async fn snapshot(&self, unit: VillageId) -> Result<Option<UnitSnapshot>, WorldError>;
    /// Whether every controlled unit has a loaded snapshot.
    async fn fully_loaded(&self) -> Result<bool, WorldError>;
}

/// Notifications pushed by the roster, group and directory services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorldEvent {
    UnitAdded { unit: VillageId },
    UnitRemoved { unit: VillageId },
    GroupLinked { group: GroupId, village: VillageId },
    GroupUnlinked { group: GroupId, village: VillageId },
    DirectoryReloaded,
    TargetInvalidated { target: VillageId },
    CombatReport { report: CombatReport },
}
