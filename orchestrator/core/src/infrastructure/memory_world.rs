// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-Memory World
//!
//! A self-contained implementation of every collaborator trait over a
//! [`WorldSnapshot`]. Used by the integration tests and by `farmer run`, which
//! loads the snapshot from YAML.
//!
//! Dispatching an attack consumes the loadout's forces from the origin unit and
//! appends an outgoing order arriving after the loadout's travel time. Orders
//! stay in flight until [`InMemoryWorld::resolve_orders`] is called.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use tokio::sync::broadcast;
use tracing::debug;

use crate::domain::order::{
    AttackOrder, IncomingOrder, Loadout, LoadoutId, OutgoingOrder, TargetStatus, UnitSnapshot,
};
use crate::domain::village::{GroupId, PlayerId, Position, Target, Unit, VillageId};
use crate::domain::world::{
    CommandApi, GroupService, LoadoutRegistry, TargetDirectory, UnitRoster, WorldError, WorldEvent,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub id: VillageId,
    #[serde(default)]
    pub name: String,
    pub position: Position,
    #[serde(default)]
    pub idle_forces: HashMap<String, u32>,
    #[serde(default)]
    pub storage_full: bool,
    #[serde(default = "default_true")]
    pub loaded: bool,
    #[serde(default)]
    pub outgoing: Vec<OutgoingOrder>,
    #[serde(default)]
    pub assigned_loadouts: Vec<LoadoutId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRecord {
    pub id: GroupId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub members: Vec<VillageId>,
}

/// Serializable description of a world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldSnapshot {
    pub player: PlayerId,
    #[serde(default)]
    pub units: Vec<UnitRecord>,
    #[serde(default)]
    pub targets: Vec<Target>,
    #[serde(default)]
    pub groups: Vec<GroupRecord>,
    #[serde(default)]
    pub loadouts: Vec<Loadout>,
    #[serde(default)]
    pub protected: Vec<VillageId>,
}

impl WorldSnapshot {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }
}

fn default_true() -> bool {
    true
}

struct UnitState {
    unit: Unit,
    snapshot: UnitSnapshot,
    assigned: Vec<LoadoutId>,
}

struct InFlight {
    unit: VillageId,
    loadout: LoadoutId,
}

struct WorldState {
    player: PlayerId,
    units: BTreeMap<VillageId, UnitState>,
    targets: BTreeMap<VillageId, Target>,
    protected: HashSet<VillageId>,
    groups: HashMap<GroupId, Vec<VillageId>>,
    loadouts: Vec<Loadout>,
    dispatched: Vec<AttackOrder>,
    in_flight: Vec<InFlight>,
    stalled: bool,
    reject_reason: Option<String>,
}

pub struct InMemoryWorld {
    state: Mutex<WorldState>,
    events: broadcast::Sender<WorldEvent>,
}

impl InMemoryWorld {
    pub fn new(snapshot: WorldSnapshot) -> Self {
        let player = snapshot.player;
        let units = snapshot
            .units
            .into_iter()
            .map(|record| (record.id, unit_state(player, record)))
            .collect();
        let (events, _) = broadcast::channel(256);

        Self {
            state: Mutex::new(WorldState {
                player,
                units,
                targets: snapshot.targets.into_iter().map(|t| (t.id, t)).collect(),
                protected: snapshot.protected.into_iter().collect(),
                groups: snapshot
                    .groups
                    .into_iter()
                    .map(|group| (group.id, group.members))
                    .collect(),
                loadouts: snapshot.loadouts,
                dispatched: Vec::new(),
                in_flight: Vec::new(),
                stalled: false,
                reject_reason: None,
            }),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorldEvent> {
        self.events.subscribe()
    }

    pub fn emit(&self, event: WorldEvent) {
        let _ = self.events.send(event);
    }

    /// Every order accepted so far, oldest first.
    pub fn dispatched(&self) -> Vec<AttackOrder> {
        self.state.lock().dispatched.clone()
    }

    pub fn set_target_points(&self, target: VillageId, points: u32) {
        if let Some(t) = self.state.lock().targets.get_mut(&target) {
            t.points = points;
        }
    }

    pub fn set_target_owner(&self, target: VillageId, owner: Option<PlayerId>) {
        if let Some(t) = self.state.lock().targets.get_mut(&target) {
            t.owner = owner;
        }
    }

    pub fn set_protected(&self, target: VillageId, protected: bool) {
        let mut state = self.state.lock();
        if protected {
            state.protected.insert(target);
        } else {
            state.protected.remove(&target);
        }
    }

    /// While stalled, target status queries never complete.
    pub fn set_stalled(&self, stalled: bool) {
        self.state.lock().stalled = stalled;
    }

    pub fn reject_dispatches(&self, reason: Option<String>) {
        self.state.lock().reject_reason = reason;
    }

    pub fn set_unit_loaded(&self, unit: VillageId, loaded: bool) {
        if let Some(u) = self.state.lock().units.get_mut(&unit) {
            u.snapshot.loaded = loaded;
        }
    }

    pub fn set_storage_full(&self, unit: VillageId, full: bool) {
        if let Some(u) = self.state.lock().units.get_mut(&unit) {
            u.snapshot.storage_full = full;
        }
    }

    pub fn set_idle_forces(&self, unit: VillageId, forces: HashMap<String, u32>) {
        if let Some(u) = self.state.lock().units.get_mut(&unit) {
            u.snapshot.idle_forces = forces;
        }
    }

    pub fn push_outgoing(&self, unit: VillageId, order: OutgoingOrder) {
        if let Some(u) = self.state.lock().units.get_mut(&unit) {
            u.snapshot.outgoing.push(order);
        }
    }

    /// Land every in-flight order and return the forces to their units.
    pub fn resolve_orders(&self) {
        let mut state = self.state.lock();
        let in_flight = std::mem::take(&mut state.in_flight);
        for order in in_flight {
            let composition = state
                .loadouts
                .iter()
                .find(|l| l.id == order.loadout)
                .map(|l| l.composition.clone())
                .unwrap_or_default();
            if let Some(unit) = state.units.get_mut(&order.unit) {
                for (kind, amount) in composition {
                    *unit.snapshot.idle_forces.entry(kind).or_insert(0) += amount;
                }
            }
        }
        for unit in state.units.values_mut() {
            unit.snapshot.outgoing.clear();
        }
    }

    pub fn add_unit(&self, record: UnitRecord) {
        let id = record.id;
        {
            let mut state = self.state.lock();
            let player = state.player;
            state.units.insert(id, unit_state(player, record));
        }
        self.emit(WorldEvent::UnitAdded { unit: id });
    }

    pub fn remove_unit(&self, unit: VillageId) {
        self.state.lock().units.remove(&unit);
        self.emit(WorldEvent::UnitRemoved { unit });
    }

    pub fn unlink(&self, group: GroupId, village: VillageId) {
        if let Some(members) = self.state.lock().groups.get_mut(&group) {
            members.retain(|id| *id != village);
        }
        self.emit(WorldEvent::GroupUnlinked { group, village });
    }
}

fn unit_state(player: PlayerId, record: UnitRecord) -> UnitState {
    UnitState {
        unit: Unit {
            id: record.id,
            name: if record.name.is_empty() {
                format!("Unit {}", record.id)
            } else {
                record.name
            },
            position: record.position,
            owner: player,
        },
        snapshot: UnitSnapshot {
            loaded: record.loaded,
            storage_full: record.storage_full,
            idle_forces: record.idle_forces,
            outgoing: record.outgoing,
        },
        assigned: record.assigned_loadouts,
    }
}

#[async_trait]
impl TargetDirectory for InMemoryWorld {
    async fn load_targets(&self, _origin: Position) -> Result<Vec<Target>, WorldError> {
        Ok(self.state.lock().targets.values().cloned().collect())
    }

    async fn target_status(&self, id: VillageId) -> Result<TargetStatus, WorldError> {
        let stalled = self.state.lock().stalled;
        if stalled {
            std::future::pending::<()>().await;
        }
        let state = self.state.lock();
        let target = state
            .targets
            .get(&id)
            .ok_or_else(|| WorldError::NotFound(format!("target {}", id)))?;
        Ok(TargetStatus {
            points: target.points,
            owner: target.owner,
            protected: state.protected.contains(&id),
        })
    }
}

#[async_trait]
impl GroupService for InMemoryWorld {
    async fn members(&self, group: GroupId) -> Result<Vec<VillageId>, WorldError> {
        Ok(self.state.lock().groups.get(&group).cloned().unwrap_or_default())
    }

    async fn link(&self, group: GroupId, village: VillageId) -> Result<(), WorldError> {
        {
            let mut state = self.state.lock();
            let members = state.groups.entry(group).or_default();
            if members.contains(&village) {
                return Ok(());
            }
            members.push(village);
        }
        self.emit(WorldEvent::GroupLinked { group, village });
        Ok(())
    }
}

#[async_trait]
impl LoadoutRegistry for InMemoryWorld {
    async fn loadouts(&self) -> Result<Vec<Loadout>, WorldError> {
        Ok(self.state.lock().loadouts.clone())
    }

    async fn assigned(&self, unit: VillageId) -> Result<Vec<LoadoutId>, WorldError> {
        let state = self.state.lock();
        let unit = state
            .units
            .get(&unit)
            .ok_or_else(|| WorldError::NotFound(format!("unit {}", unit)))?;
        Ok(unit.assigned.clone())
    }

    async fn assign(&self, unit: VillageId, loadouts: &[LoadoutId]) -> Result<(), WorldError> {
        let mut state = self.state.lock();
        let unit = state
            .units
            .get_mut(&unit)
            .ok_or_else(|| WorldError::NotFound(format!("unit {}", unit)))?;
        for id in loadouts {
            if !unit.assigned.contains(id) {
                unit.assigned.push(*id);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl CommandApi for InMemoryWorld {
    async fn dispatch_attack(&self, order: &AttackOrder) -> Result<(), WorldError> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.reject_reason {
            return Err(WorldError::Rejected(reason.clone()));
        }

        let loadout = state
            .loadouts
            .iter()
            .find(|l| l.id == order.loadout_id)
            .cloned()
            .ok_or_else(|| WorldError::NotFound(format!("loadout {}", order.loadout_id.0)))?;
        let target_position = state
            .targets
            .get(&order.target_id)
            .map(|t| t.position)
            .ok_or_else(|| WorldError::NotFound(format!("target {}", order.target_id)))?;
        let unit = state
            .units
            .get_mut(&order.unit_id)
            .ok_or_else(|| WorldError::NotFound(format!("unit {}", order.unit_id)))?;

        if !loadout.fits(&unit.snapshot.idle_forces) {
            return Err(WorldError::Rejected("not enough forces".to_string()));
        }
        let travel = loadout
            .travel_time(unit.unit.position.distance_to(&target_position))
            .ok_or_else(|| WorldError::Rejected("target out of reach".to_string()))?;
        for (kind, amount) in &loadout.composition {
            if let Some(idle) = unit.snapshot.idle_forces.get_mut(kind) {
                *idle -= amount;
            }
        }

        let arrival = Utc::now()
            + chrono::Duration::from_std(travel).unwrap_or_else(|_| chrono::Duration::zero());
        unit.snapshot.outgoing.push(OutgoingOrder {
            target_id: order.target_id,
            arrival,
            returning: false,
        });

        debug!(unit_id = %order.unit_id, target_id = %order.target_id, "In-memory attack accepted");
        state.in_flight.push(InFlight { unit: order.unit_id, loadout: order.loadout_id });
        state.dispatched.push(order.clone());
        Ok(())
    }

    async fn incoming_orders(&self, target: VillageId) -> Result<Vec<IncomingOrder>, WorldError> {
        let state = self.state.lock();
        Ok(state
            .units
            .values()
            .flat_map(|unit| {
                unit.snapshot.attacks_on(target).map(|order| IncomingOrder {
                    origin_unit: unit.unit.id,
                    arrival: order.arrival,
                })
            })
            .collect())
    }
}

#[async_trait]
impl UnitRoster for InMemoryWorld {
    fn player(&self) -> PlayerId {
        self.state.lock().player
    }

    async fn controlled_units(&self) -> Result<Vec<Unit>, WorldError> {
        Ok(self.state.lock().units.values().map(|u| u.unit.clone()).collect())
    }

    /// An unloaded unit exposes no cached orders or forces; the authoritative
    /// side still reports its attacks through `incoming_orders`.
    async fn snapshot(&self, unit: VillageId) -> Result<Option<UnitSnapshot>, WorldError> {
        Ok(self.state.lock().units.get(&unit).map(|u| {
            if u.snapshot.loaded {
                u.snapshot.clone()
            } else {
                UnitSnapshot::default()
            }
        }))
    }

    async fn fully_loaded(&self) -> Result<bool, WorldError> {
        Ok(self.state.lock().units.values().all(|u| u.snapshot.loaded))
    }
}
