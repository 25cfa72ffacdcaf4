// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Attack Step Pipeline
//!
//! One pass of a Unit Agent: an optional attack-interval delay, the checked
//! stages (command slots through remote collision re-check) raced against the
//! step deadline, then the commit.
//!
//! Every stage returns `Err(StepOutcome)` to short-circuit; collaborator
//! errors convert through `From<WorldError>`. The commit runs outside the
//! deadline so a timed-out step can never dispatch.

use chrono::{DateTime, Utc};
use rand::Rng;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::farmer::Farmer;
use crate::domain::events::FarmEvent;
use crate::domain::farm_config::FarmSettings;
use crate::domain::order::{sort_by_travel_time, AttackOrder, Loadout, LoadoutId};
use crate::domain::outcome::StepOutcome;
use crate::domain::village::{FarmTarget, VillageId};
use crate::domain::world::WorldError;

pub(crate) struct AttackPlan {
    target: FarmTarget,
    loadout: LoadoutId,
}

/// An attack already heading for the target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Attack {
    pub origin: VillageId,
    pub arrival: DateTime<Utc>,
}

/// Busy-target policy shared by the local and remote collision checks.
///
/// Either policy switched to its restrictive setting makes any concurrent
/// attack, including one from this unit, enough to make the target busy.
pub(crate) fn is_busy(attacks: &[Attack], single_attack: bool, multiple_farmers: bool) -> bool {
    (single_attack || !multiple_farmers) && !attacks.is_empty()
}

/// Whether an existing arrival lands within `window` of `arrival`.
pub(crate) fn clashes(attacks: &[Attack], arrival: DateTime<Utc>, window: Duration) -> bool {
    attacks.iter().any(|a| {
        (a.arrival - arrival)
            .abs()
            .to_std()
            .map(|gap| gap < window)
            .unwrap_or(false)
    })
}

/// Base interval ±50%.
pub(crate) fn jittered(base: Duration) -> Duration {
    let secs = base.as_secs_f64();
    if secs <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_secs_f64(rand::rng().random_range(secs * 0.5..=secs * 1.5))
}

impl Farmer {
    pub(crate) async fn step(&self, token: &CancellationToken, after_commit: bool) -> StepOutcome {
        let settings = self.ctx.settings();

        if after_commit {
            let delay = jittered(settings.attack_interval);
            debug!(unit_id = %self.id(), delay_ms = delay.as_millis() as u64, "Waiting attack interval");
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = token.cancelled() => return StepOutcome::UserStop,
            }
        }
        if token.is_cancelled() {
            return StepOutcome::UserStop;
        }

        let plan = tokio::select! {
            _ = token.cancelled() => return StepOutcome::UserStop,
            checked = tokio::time::timeout(settings.step_timeout, self.prepare(&settings, token)) => {
                match checked {
                    Err(_) => return StepOutcome::ExpiredStep,
                    Ok(Err(outcome)) => return outcome,
                    Ok(Ok(plan)) => plan,
                }
            }
        };

        self.commit(plan, &settings, token).await
    }

    async fn prepare(
        &self,
        settings: &FarmSettings,
        token: &CancellationToken,
    ) -> Result<AttackPlan, StepOutcome> {
        let world = &self.ctx.world;
        let unit_id = self.id();

        let snapshot = world
            .roster
            .snapshot(unit_id)
            .await?
            .ok_or_else(|| StepOutcome::Unknown(format!("unit {} left the roster", unit_id)))?;
        if snapshot.outgoing.len() >= settings.usable_command_slots() {
            return Err(StepOutcome::CommandLimit);
        }

        if settings.ignore_full_storage && snapshot.storage_full {
            return Err(StepOutcome::FullStorage);
        }

        let target = self.select_target()?;
        let target_id = target.id();

        let status = world.directory.target_status(target_id).await?;
        if !settings.points_allowed(status.points) {
            debug!(unit_id = %unit_id, target_id = %target_id, points = status.points, "Points out of range");
            return Err(StepOutcome::NotAllowedPoints);
        }
        let included = self.ctx.exceptions.sets().is_included(target_id);
        let claimed = target.target.is_unaffiliated() && status.owner.is_some() && !included;
        if claimed || status.owner == Some(self.ctx.player()) {
            return Err(StepOutcome::AbandonedConquered);
        }
        if status.protected {
            return Err(StepOutcome::ProtectedVillage);
        }

        let loadouts = self.usable_loadouts(settings).await?;
        let assigned = world.loadouts.assigned(unit_id).await?;
        let missing: Vec<LoadoutId> = loadouts
            .iter()
            .map(|l| l.id)
            .filter(|id| !assigned.contains(id))
            .collect();
        if !missing.is_empty() {
            debug!(unit_id = %unit_id, missing = missing.len(), "Assigning loadouts");
            world.loadouts.assign(unit_id, &missing).await?;
        }
        if token.is_cancelled() {
            return Err(StepOutcome::UserStop);
        }

        let loadout = loadouts
            .iter()
            .find(|l| l.fits(&snapshot.idle_forces))
            .ok_or(StepOutcome::NoUnits)?;
        let travel = loadout
            .travel_time(target.distance)
            .filter(|travel| *travel <= settings.max_travel_time)
            .ok_or(StepOutcome::TimeLimit)?;
        let arrival = Utc::now()
            + chrono::Duration::from_std(travel).map_err(|e| StepOutcome::Unknown(e.to_string()))?;

        let local = self.local_attacks(target_id).await?;
        if is_busy(&local, settings.single_attack, settings.multiple_farmers) {
            let attackers: Vec<VillageId> = local.iter().map(|a| a.origin).collect();
            debug!(unit_id = %unit_id, target_id = %target_id, ?attackers, "Target busy");
            return Err(StepOutcome::BusyTarget);
        }
        if clashes(&local, arrival, settings.min_reattack_interval) {
            debug!(unit_id = %unit_id, target_id = %target_id, "Arrival too close to another attack");
            return Err(StepOutcome::BusyTarget);
        }

        if !world.roster.fully_loaded().await? {
            let remote: Vec<Attack> = world
                .commands
                .incoming_orders(target_id)
                .await?
                .into_iter()
                .map(|o| Attack { origin: o.origin_unit, arrival: o.arrival })
                .collect();
            if is_busy(&remote, settings.single_attack, settings.multiple_farmers) {
                return Err(StepOutcome::BusyTarget);
            }
        }

        Ok(AttackPlan {
            target,
            loadout: loadout.id,
        })
    }

    async fn commit(
        &self,
        plan: AttackPlan,
        settings: &FarmSettings,
        token: &CancellationToken,
    ) -> StepOutcome {
        if token.is_cancelled() {
            return StepOutcome::UserStop;
        }

        let order = AttackOrder::new(self.id(), plan.target.id(), plan.loadout);
        let dispatch = self.ctx.world.commands.dispatch_attack(&order);
        match tokio::time::timeout(settings.step_timeout, dispatch).await {
            Err(_) => StepOutcome::Unknown("dispatch timed out".to_string()),
            Ok(Err(e)) => {
                warn!(unit_id = %order.unit_id, target_id = %order.target_id, error = %e, "Attack dispatch failed");
                e.into()
            }
            Ok(Ok(())) => {
                info!(
                    unit_id = %order.unit_id,
                    target_id = %order.target_id,
                    loadout = order.loadout_id.0,
                    distance = plan.target.distance,
                    "Attack sent"
                );
                metrics::counter!("farmer_attacks_sent_total").increment(1);
                self.ctx
                    .log
                    .record(FarmEvent::AttackSent {
                        unit: order.unit_id,
                        target: order.target_id,
                        loadout: order.loadout_id,
                    })
                    .await;
                StepOutcome::Committed
            }
        }
    }

    /// Configured loadouts (every registry loadout when none are configured),
    /// fastest first.
    async fn usable_loadouts(&self, settings: &FarmSettings) -> Result<Vec<Loadout>, WorldError> {
        let mut loadouts: Vec<Loadout> = self
            .ctx
            .world
            .loadouts
            .loadouts()
            .await?
            .into_iter()
            .filter(|l| settings.loadouts.is_empty() || settings.loadouts.contains(&l.id))
            .collect();
        sort_by_travel_time(&mut loadouts);
        Ok(loadouts)
    }

    /// Live attacks on `target` from every controlled unit's cached orders.
    async fn local_attacks(&self, target: VillageId) -> Result<Vec<Attack>, WorldError> {
        let roster = &self.ctx.world.roster;
        let units = roster.controlled_units().await?;
        let snapshots = futures::future::join_all(units.iter().map(|u| roster.snapshot(u.id))).await;

        let mut attacks = Vec::new();
        for (unit, snapshot) in units.iter().zip(snapshots) {
            if let Some(snapshot) = snapshot? {
                attacks.extend(snapshot.attacks_on(target).map(|order| Attack {
                    origin: unit.id,
                    arrival: order.arrival,
                }));
            }
        }
        Ok(attacks)
    }
}
