// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shared engine context handed to every Unit Agent, the Cycle Orchestrator
//! and the watchdog.

use anyhow::Result;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::application::event_log::EventLog;
use crate::application::exceptions::ExceptionService;
use crate::domain::events::FarmEvent;
use crate::domain::exceptions::ExceptionDiff;
use crate::domain::farm_config::FarmSettings;
use crate::domain::village::PlayerId;
use crate::domain::world::{CommandApi, GroupService, LoadoutRegistry, TargetDirectory, UnitRoster};

/// The five external collaborators the engine talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub directory: Arc<dyn TargetDirectory>,
    pub groups: Arc<dyn GroupService>,
    pub loadouts: Arc<dyn LoadoutRegistry>,
    pub commands: Arc<dyn CommandApi>,
    pub roster: Arc<dyn UnitRoster>,
}

impl Collaborators {
    /// Use one object for every collaborator role.
    pub fn from_world<W>(world: Arc<W>) -> Self
    where
        W: TargetDirectory + GroupService + LoadoutRegistry + CommandApi + UnitRoster + 'static,
    {
        Self {
            directory: world.clone(),
            groups: world.clone(),
            loadouts: world.clone(),
            commands: world.clone(),
            roster: world,
        }
    }
}

/// Timestamp of the last forward progress, read by the watchdog.
pub struct ActivityClock {
    last: Mutex<Instant>,
}

impl ActivityClock {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(Instant::now()),
        }
    }

    pub fn touch(&self) {
        *self.last.lock() = Instant::now();
    }

    pub fn silent_for(&self) -> Duration {
        self.last.lock().elapsed()
    }
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}

pub struct FarmContext {
    pub world: Collaborators,
    pub exceptions: ExceptionService,
    pub log: EventLog,
    pub activity: ActivityClock,
    settings: RwLock<FarmSettings>,
    player: PlayerId,
}

impl FarmContext {
    pub fn new(
        world: Collaborators,
        settings: FarmSettings,
        exceptions: ExceptionService,
        log: EventLog,
    ) -> Self {
        let player = world.roster.player();
        Self {
            world,
            exceptions,
            log,
            activity: ActivityClock::new(),
            settings: RwLock::new(settings),
            player,
        }
    }

    pub fn settings(&self) -> FarmSettings {
        self.settings.read().clone()
    }

    pub(crate) fn settings_mut(&self) -> parking_lot::RwLockWriteGuard<'_, FarmSettings> {
        self.settings.write()
    }

    pub fn player(&self) -> PlayerId {
        self.player
    }

    /// Rebuild the exception sets and log every newly included or ignored target.
    pub async fn rebuild_exceptions(&self) -> Result<ExceptionDiff> {
        let settings = self.settings();
        let diff = self
            .exceptions
            .rebuild(self.world.groups.as_ref(), &settings)
            .await?;

        for target in &diff.included {
            self.log.record(FarmEvent::TargetIncluded { target: *target }).await;
        }
        for target in &diff.excluded {
            self.log.record(FarmEvent::TargetIgnored { target: *target }).await;
        }
        Ok(diff)
    }
}
