// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shared fixtures for the engine integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use farmer_core::application::{Collaborators, FarmEngine};
use farmer_core::domain::events::FarmEvent;
use farmer_core::domain::farm_config::FarmSettings;
use farmer_core::domain::order::{Loadout, LoadoutId};
use farmer_core::domain::village::{PlayerId, Position, Target, VillageId};
use farmer_core::infrastructure::memory_world::{InMemoryWorld, UnitRecord, WorldSnapshot};
use farmer_core::infrastructure::repositories::InMemoryStore;

pub const PLAYER: PlayerId = PlayerId(1);

pub fn unit(id: u64, x: i32, y: i32, light: u32) -> UnitRecord {
    UnitRecord {
        id: VillageId(id),
        name: format!("Unit {}", id),
        position: Position::new(x, y),
        idle_forces: HashMap::from([("light".to_string(), light)]),
        storage_full: false,
        loaded: true,
        outgoing: Vec::new(),
        assigned_loadouts: Vec::new(),
    }
}

pub fn target(id: u64, x: i32, y: i32, points: u32) -> Target {
    Target {
        id: VillageId(id),
        position: Position::new(x, y),
        owner: None,
        tribe: None,
        points,
    }
}

pub fn light_loadout() -> Loadout {
    Loadout {
        id: LoadoutId(1),
        name: "Light".to_string(),
        composition: HashMap::from([("light".to_string(), 5)]),
        seconds_per_field: 60.0,
    }
}

pub fn world(units: Vec<UnitRecord>, targets: Vec<Target>) -> Arc<InMemoryWorld> {
    world_with_loadouts(units, targets, vec![light_loadout()])
}

pub fn world_with_loadouts(
    units: Vec<UnitRecord>,
    targets: Vec<Target>,
    loadouts: Vec<Loadout>,
) -> Arc<InMemoryWorld> {
    Arc::new(InMemoryWorld::new(WorldSnapshot {
        player: PLAYER,
        units,
        targets,
        groups: Vec::new(),
        loadouts,
        protected: Vec::new(),
    }))
}

pub fn settings() -> FarmSettings {
    FarmSettings {
        attack_interval: Duration::from_secs(2),
        cycle_interval: Duration::from_secs(300),
        step_timeout: Duration::from_secs(30),
        ..Default::default()
    }
}

pub async fn engine(world: &Arc<InMemoryWorld>, settings: FarmSettings) -> Arc<FarmEngine> {
    FarmEngine::init(
        Collaborators::from_world(world.clone()),
        Arc::new(InMemoryStore::new()),
        settings,
    )
    .await
    .expect("engine init")
}

/// Poll `condition` every 50ms of (virtual) time until it holds or `limit` passes.
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let step = Duration::from_millis(50);
    let mut waited = Duration::ZERO;
    while waited <= limit {
        if condition() {
            return true;
        }
        tokio::time::sleep(step).await;
        waited += step;
    }
    false
}

pub fn count_events(engine: &FarmEngine, matches: impl Fn(&FarmEvent) -> bool) -> usize {
    engine.logs().iter().filter(|entry| matches(&entry.event)).count()
}
