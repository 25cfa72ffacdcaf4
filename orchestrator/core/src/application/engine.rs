// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Farm Engine
//!
//! Facade over the whole attack scheduling engine. Constructed once through
//! [`FarmEngine::init`] and shared as `Arc<FarmEngine>`; there is no global
//! state.
//!
//! Owns:
//! - the [`CycleOrchestrator`] and its Unit Agents
//! - the run/stop state and the cancellation token of the current run
//! - the liveness watchdog and world-event listener tasks
//!
//! # Example
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use std::sync::Arc;
//! use farmer_core::application::{Collaborators, FarmEngine};
//! use farmer_core::domain::farm_config::FarmSettings;
//! use farmer_core::infrastructure::memory_world::{InMemoryWorld, WorldSnapshot};
//! use farmer_core::infrastructure::repositories::InMemoryStore;
//!
//! let world = Arc::new(InMemoryWorld::new(WorldSnapshot::from_yaml_file("world.yaml")?));
//! let engine = FarmEngine::init(
//!     Collaborators::from_world(world.clone()),
//!     Arc::new(InMemoryStore::new()),
//!     FarmSettings::default(),
//! )
//! .await?;
//! engine.spawn_event_listener(world.subscribe());
//! engine.start().await?;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::context::{Collaborators, FarmContext};
use crate::application::event_log::EventLog;
use crate::application::exceptions::{collect_members, ExceptionService};
use crate::application::farmer::Farmer;
use crate::application::orchestrator::{CycleExit, CycleOrchestrator};
use crate::application::watchdog;
use crate::domain::events::{FarmEvent, LogEntry, StopReason};
use crate::domain::exceptions::ExceptionEntry;
use crate::domain::farm_config::{ChangedSettings, FarmSettings, SettingKey};
use crate::domain::farmer::FarmerSnapshot;
use crate::domain::order::CombatReport;
use crate::domain::outcome::StepOutcome;
use crate::domain::repository::KeyValueStore;
use crate::domain::village::{Unit, VillageId};
use crate::domain::world::WorldEvent;
use crate::infrastructure::event_bus::{EventBus, EventReceiver, UnitEventReceiver};

struct EngineState {
    running: bool,
    stopped_by: Option<StopReason>,
    session: u64,
    token: Option<CancellationToken>,
}

pub struct FarmEngine {
    ctx: Arc<FarmContext>,
    orchestrator: Arc<CycleOrchestrator>,
    state: Mutex<EngineState>,
    sync_lock: tokio::sync::Mutex<()>,
    /// Wakes the watchdog so a new `watchdog_tick` applies immediately.
    watchdog_retick: Arc<Notify>,
    shutdown: CancellationToken,
}

impl FarmEngine {
    /// Load the persisted Event Log and Exception Registry and spawn the
    /// watchdog. The engine starts stopped.
    pub async fn init(
        world: Collaborators,
        store: Arc<dyn KeyValueStore>,
        settings: FarmSettings,
    ) -> Result<Arc<Self>> {
        settings.validate().context("Invalid farm settings")?;

        let bus = EventBus::with_default_capacity();
        let log = EventLog::load(store.clone(), bus, settings.logs_limit).await;
        let exceptions = ExceptionService::load(store).await;

        let ctx = Arc::new(FarmContext::new(world, settings, exceptions, log));
        let engine = Arc::new(Self {
            orchestrator: Arc::new(CycleOrchestrator::new(ctx.clone())),
            ctx,
            state: Mutex::new(EngineState {
                running: false,
                stopped_by: None,
                session: 0,
                token: None,
            }),
            sync_lock: tokio::sync::Mutex::new(()),
            watchdog_retick: Arc::new(Notify::new()),
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(watchdog::run(
            Arc::downgrade(&engine),
            engine.watchdog_retick.clone(),
            engine.shutdown.child_token(),
        ));

        info!(player = %engine.ctx.player(), "Farm engine initialised");
        Ok(engine)
    }

    pub(crate) fn context(&self) -> &Arc<FarmContext> {
        &self.ctx
    }

    /// Start the engine. A no-op when already running.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        if self.is_running() {
            debug!("Farm engine already running");
            return Ok(());
        }

        if let Err(e) = self.ctx.rebuild_exceptions().await {
            warn!(error = %e, "Failed to rebuild exceptions, keeping previous sets");
        }
        self.sync_farmers().await?;

        let (token, session) = {
            let mut state = self.state.lock();
            if state.running {
                return Ok(());
            }
            let token = CancellationToken::new();
            state.running = true;
            state.stopped_by = None;
            state.session += 1;
            state.token = Some(token.clone());
            (token, state.session)
        };

        self.orchestrator.reset();
        self.ctx.activity.touch();
        self.ctx.log.record(FarmEvent::EngineStarted).await;
        info!(farmers = self.orchestrator.len(), session, "Farm engine started");

        let engine = Arc::clone(self);
        let orchestrator = self.orchestrator.clone();
        tokio::spawn(async move {
            if orchestrator.run(token).await == CycleExit::Halted {
                engine.halt(session).await;
            }
        });
        Ok(())
    }

    /// Stop the engine and every agent. Pending steps resume as `UserStop`
    /// and dispatch nothing.
    pub async fn stop(&self, reason: StopReason) {
        let token = {
            let mut state = self.state.lock();
            if !state.running {
                return;
            }
            state.running = false;
            state.stopped_by = Some(reason);
            state.token.take()
        };

        if let Some(token) = token {
            token.cancel();
        }
        for farmer in self.orchestrator.agents() {
            farmer.stop(StepOutcome::UserStop);
        }
        self.orchestrator.reset();

        self.ctx.log.record(FarmEvent::EngineStopped { reason }).await;
        info!(reason = ?reason, "Farm engine stopped");
    }

    async fn halt(&self, session: u64) {
        let current = {
            let state = self.state.lock();
            state.running && state.session == session
        };
        if current {
            self.stop(StopReason::User).await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Reason of the most recent stop; cleared by `start`.
    pub fn stopped_by(&self) -> Option<StopReason> {
        self.state.lock().stopped_by
    }

    pub fn agents(&self) -> Vec<FarmerSnapshot> {
        self.orchestrator.agents().iter().map(|f| f.snapshot()).collect()
    }

    pub fn agent(&self, unit: VillageId) -> Option<FarmerSnapshot> {
        self.orchestrator.agent(unit).map(|f| f.snapshot())
    }

    pub fn active_agent(&self) -> Option<usize> {
        self.orchestrator.active_index()
    }

    pub fn exceptions(&self) -> HashMap<VillageId, ExceptionEntry> {
        self.ctx.exceptions.entries()
    }

    pub fn logs(&self) -> Vec<LogEntry> {
        self.ctx.log.entries()
    }

    pub async fn clear_logs(&self) {
        self.ctx.log.clear().await;
    }

    pub fn next_cycle_deadline(&self) -> Option<DateTime<Utc>> {
        self.orchestrator.next_cycle_deadline()
    }

    pub fn settings(&self) -> FarmSettings {
        self.ctx.settings()
    }

    /// Live feed of every Event Log entry.
    pub fn subscribe(&self) -> EventReceiver {
        self.ctx.log.bus().subscribe()
    }

    /// Live feed of the entries concerning one unit.
    pub fn subscribe_unit(&self, unit: VillageId) -> UnitEventReceiver {
        self.ctx.log.bus().subscribe_unit(unit)
    }

    /// Replace the settings and apply whatever the change set touches.
    pub async fn update_settings(&self, next: FarmSettings) -> Result<ChangedSettings> {
        next.validate().context("Invalid farm settings")?;
        let changed = self.ctx.settings_mut().update(next);
        if changed.is_empty() {
            return Ok(changed);
        }

        if changed.contains(SettingKey::LogsLimit) {
            self.ctx.log.set_limit(self.ctx.settings().logs_limit).await;
        }
        if changed.contains(SettingKey::WatchdogTick) {
            self.watchdog_retick.notify_one();
        }
        if changed.affects_exceptions() {
            self.ctx.rebuild_exceptions().await?;
        }
        if changed.affects_farmers() {
            self.sync_farmers().await?;
        }
        if changed.affects_targets() {
            self.refresh_targets().await;
        }

        info!(changed = changed.len(), "Settings updated");
        Ok(changed)
    }

    pub async fn handle_world_event(&self, event: WorldEvent) -> Result<()> {
        debug!(event = ?event, "World event");
        match event {
            WorldEvent::UnitAdded { .. } | WorldEvent::UnitRemoved { .. } => {
                self.sync_farmers().await?;
            }
            WorldEvent::GroupLinked { group, .. } | WorldEvent::GroupUnlinked { group, .. } => {
                let settings = self.ctx.settings();
                let exception_group =
                    settings.include_groups.contains(&group) || settings.ignore_groups.contains(&group);
                if exception_group {
                    self.ctx.rebuild_exceptions().await?;
                    self.refresh_targets().await;
                }
                if settings.farmer_groups.contains(&group) || settings.ignore_groups.contains(&group) {
                    self.sync_farmers().await?;
                }
            }
            WorldEvent::DirectoryReloaded => self.refresh_targets().await,
            WorldEvent::TargetInvalidated { target } => self.drop_target(target),
            WorldEvent::CombatReport { report } => self.handle_combat_report(report).await?,
        }
        Ok(())
    }

    /// Consume world events in the background until the engine shuts down.
    pub fn spawn_event_listener(
        self: &Arc<Self>,
        mut receiver: broadcast::Receiver<WorldEvent>,
    ) -> JoinHandle<()> {
        let engine = Arc::downgrade(self);
        let token = self.shutdown.child_token();

        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    received = receiver.recv() => received,
                    _ = token.cancelled() => break,
                };
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                match received {
                    Ok(event) => {
                        if let Err(e) = engine.handle_world_event(event).await {
                            warn!(error = %e, "Failed to apply world event");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("World event listener lagged by {} events, resyncing", n);
                        if let Err(e) = engine.sync_farmers().await {
                            warn!(error = %e, "Resync after lag failed");
                        }
                        engine.refresh_targets().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("World event listener stopped");
        })
    }

    /// Stop the engine and its background tasks.
    pub async fn shutdown(&self) {
        self.stop(StopReason::User).await;
        self.shutdown.cancel();
    }

    /// Create and destroy agents so there is exactly one per eligible unit.
    async fn sync_farmers(&self) -> Result<()> {
        let _guard = self.sync_lock.lock().await;
        let settings = self.ctx.settings();
        let world = &self.ctx.world;

        let units = world
            .roster
            .controlled_units()
            .await
            .context("Failed to list controlled units")?;
        let allowed = if settings.farmer_groups.is_empty() {
            None
        } else {
            Some(collect_members(world.groups.as_ref(), &settings.farmer_groups).await?)
        };
        let ignored = collect_members(world.groups.as_ref(), &settings.ignore_groups).await?;

        let wanted: Vec<Unit> = units
            .into_iter()
            .filter(|u| allowed.as_ref().map_or(true, |a| a.contains(&u.id)))
            .filter(|u| !ignored.contains(&u.id))
            .collect();
        let wanted_ids: HashSet<VillageId> = wanted.iter().map(|u| u.id).collect();

        for farmer in self.orchestrator.retain(|f| wanted_ids.contains(&f.id())) {
            farmer.stop(StepOutcome::UserStop);
            info!(unit_id = %farmer.id(), "Farmer removed");
        }

        for unit in wanted {
            if self.orchestrator.agent(unit.id).is_some() {
                continue;
            }
            let farmer = Arc::new(Farmer::new(unit, self.ctx.clone()));
            if let Err(e) = farmer.refresh_targets().await {
                warn!(unit_id = %farmer.id(), error = %e, "Failed to load targets");
            }
            info!(unit_id = %farmer.id(), "Farmer created");
            self.orchestrator.push(farmer);
        }

        metrics::gauge!("farmer_active_agents").set(self.orchestrator.len() as f64);
        Ok(())
    }

    async fn refresh_targets(&self) {
        for farmer in self.orchestrator.agents() {
            if let Err(e) = farmer.refresh_targets().await {
                warn!(unit_id = %farmer.id(), error = %e, "Failed to refresh targets");
            }
        }
    }

    fn drop_target(&self, target: VillageId) {
        for farmer in self.orchestrator.agents() {
            if farmer.remove_target(target) {
                debug!(unit_id = %farmer.id(), target_id = %target, "Target dropped");
            }
        }
    }

    /// Force-exclude a target after a lost attack by linking it into the
    /// first ignore group.
    async fn handle_combat_report(&self, report: CombatReport) -> Result<()> {
        let settings = self.ctx.settings();
        if !settings.ignore_on_loss || !report.lost {
            return Ok(());
        }
        let Some(group) = settings.ignore_groups.first().copied() else {
            debug!(target_id = %report.target, "Lost attack, but no ignore group configured");
            return Ok(());
        };
        if self.ctx.exceptions.sets().is_included(report.target) {
            return Ok(());
        }
        let controlled = self
            .ctx
            .world
            .roster
            .controlled_units()
            .await?
            .iter()
            .any(|u| u.id == report.attacker_unit);
        if !controlled {
            return Ok(());
        }

        let target = report.target;
        // Remembered before linking: the link's own group event may trigger a rebuild
        self.ctx.exceptions.remember_outcome(report);
        if let Err(e) = self.ctx.world.groups.link(group, target).await {
            self.ctx.exceptions.forget_outcome(target);
            return Err(anyhow::Error::new(e)
                .context(format!("Failed to link target {} into group {}", target, group)));
        }
        self.ctx.rebuild_exceptions().await?;
        self.drop_target(target);

        info!(target_id = %target, group = %group, "Target ignored after lost attack");
        Ok(())
    }
}

impl Drop for FarmEngine {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
