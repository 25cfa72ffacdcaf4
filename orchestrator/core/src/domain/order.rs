// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Orders, Loadouts and Unit Snapshots
//!
//! Value objects exchanged with the remote order API and the loadout registry.
//! An [`AttackOrder`] is write-once: the engine emits it and never touches it
//! again; every later effect arrives through external events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::village::{PlayerId, VillageId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(pub Uuid);

impl OrderId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LoadoutId(pub u64);

/// A named, pre-configured force composition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loadout {
    pub id: LoadoutId,
    pub name: String,
    /// Force kind -> amount.
    pub composition: HashMap<String, u32>,
    /// Travel time class: seconds needed per map field by the slowest member.
    pub seconds_per_field: f64,
}

impl Loadout {
    /// `None` when the travel time is not representable (NaN or overflow).
    pub fn travel_time(&self, distance: f64) -> Option<Duration> {
        Duration::try_from_secs_f64((self.seconds_per_field * distance).max(0.0)).ok()
    }

    /// Whether `idle` holds at least this loadout's composition.
    pub fn fits(&self, idle: &HashMap<String, u32>) -> bool {
        self.composition
            .iter()
            .all(|(kind, amount)| idle.get(kind).copied().unwrap_or(0) >= *amount)
    }
}

/// Sort loadouts fastest first; ties keep id order so selection is stable.
pub fn sort_by_travel_time(loadouts: &mut [Loadout]) {
    loadouts.sort_by(|a, b| {
        a.seconds_per_field
            .total_cmp(&b.seconds_per_field)
            .then(a.id.cmp(&b.id))
    });
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackOrder {
    pub id: OrderId,
    pub unit_id: VillageId,
    pub target_id: VillageId,
    pub loadout_id: LoadoutId,
    pub issued_at: DateTime<Utc>,
}

impl AttackOrder {
    pub fn new(unit_id: VillageId, target_id: VillageId, loadout_id: LoadoutId) -> Self {
        Self {
            id: OrderId::new(),
            unit_id,
            target_id,
            loadout_id,
            issued_at: Utc::now(),
        }
    }
}

/// An in-flight order leaving a controlled unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutgoingOrder {
    pub target_id: VillageId,
    pub arrival: DateTime<Utc>,
    /// Returning forces are not attacks and never make a target busy.
    #[serde(default)]
    pub returning: bool,
}

/// An order heading for a target, as reported by the authoritative source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingOrder {
    pub origin_unit: VillageId,
    pub arrival: DateTime<Utc>,
}

/// Locally cached state of one controlled unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitSnapshot {
    /// `false` until the unit's order list and forces have been fetched.
    pub loaded: bool,
    pub storage_full: bool,
    pub idle_forces: HashMap<String, u32>,
    pub outgoing: Vec<OutgoingOrder>,
}

impl UnitSnapshot {
    pub fn attacks_on(&self, target: VillageId) -> impl Iterator<Item = &OutgoingOrder> {
        self.outgoing
            .iter()
            .filter(move |order| order.target_id == target && !order.returning)
    }
}

/// Authoritative current state of a target, fetched right before commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetStatus {
    pub points: u32,
    pub owner: Option<PlayerId>,
    #[serde(default)]
    pub protected: bool,
}

/// Outcome of a resolved attack, as delivered by a battle report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatReport {
    pub attacker_unit: VillageId,
    pub target: VillageId,
    pub lost: bool,
    #[serde(default)]
    pub attacker_losses: HashMap<String, u32>,
    pub resolved_at: DateTime<Utc>,
}
