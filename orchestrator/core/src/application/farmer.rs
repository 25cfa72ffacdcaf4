// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Unit Agent ("Farmer")
//!
//! One instance per controlled unit. Owns the unit's target list and cursor
//! and runs the attack pipeline as a
//! tokio task while started.
//!
//! # Lifecycle
//!
//! ```text
//! start() ──► ATTACKING ──► step ──► route ──┬─► step again
//!                                           └─► stop(outcome) ──► completion channel
//! ```
//!
//! Completion is delivered once through the `oneshot` receiver returned by
//! [`Farmer::start`]. Each start opens a new session; a task left over from an
//! earlier session can never touch the state of a later one.

use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::application::context::FarmContext;
use crate::domain::events::FarmEvent;
use crate::domain::farmer::{FarmerSnapshot, TargetCursor};
use crate::domain::filter::{filter_targets, FilterPolicy};
use crate::domain::outcome::{FarmerStatus, NextAction, StepOutcome};
use crate::domain::village::{FarmTarget, Unit, VillageId};
use crate::domain::world::WorldError;

/// Why a Farmer refused to start. Callers treat these as stop conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StartRefusal {
    #[error("farmer is already running")]
    AlreadyRunning,
    #[error("unit data is not loaded")]
    NotReady,
    #[error("no targets")]
    NoTargets,
}

struct FarmerState {
    cursor: TargetCursor,
    running: bool,
    status: FarmerStatus,
    session: u64,
    token: Option<CancellationToken>,
    done: Option<oneshot::Sender<StepOutcome>>,
}

pub struct Farmer {
    unit: Unit,
    pub(crate) ctx: Arc<FarmContext>,
    state: Mutex<FarmerState>,
}

impl Farmer {
    pub fn new(unit: Unit, ctx: Arc<FarmContext>) -> Self {
        Self {
            unit,
            ctx,
            state: Mutex::new(FarmerState {
                cursor: TargetCursor::new(Vec::new()),
                running: false,
                status: FarmerStatus::WaitingCycle,
                session: 0,
                token: None,
                done: None,
            }),
        }
    }

    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    pub fn id(&self) -> VillageId {
        self.unit.id
    }

    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    pub fn status(&self) -> FarmerStatus {
        self.state.lock().status.clone()
    }

    pub fn cursor(&self) -> TargetCursor {
        self.state.lock().cursor.clone()
    }

    pub fn snapshot(&self) -> FarmerSnapshot {
        let state = self.state.lock();
        FarmerSnapshot {
            unit_id: self.unit.id,
            unit_name: self.unit.name.clone(),
            running: state.running,
            status: state.status.clone(),
            status_text: state.status.status_text(),
            cursor: state.cursor.position(),
            targets: state.cursor.targets().iter().map(|t| t.id()).collect(),
        }
    }

    /// Recompute the target list from the directory. The cursor is kept and
    /// clamped to the new length.
    pub async fn refresh_targets(&self) -> Result<usize, WorldError> {
        let settings = self.ctx.settings();
        let raw = self.ctx.world.directory.load_targets(self.unit.position).await?;
        let policy = FilterPolicy {
            player: self.ctx.player(),
            min_distance: settings.min_distance,
            max_distance: settings.max_distance,
            limit: settings.target_limit_per_unit,
        };
        let targets = filter_targets(&raw, self.unit.position, &policy, &self.ctx.exceptions.sets());
        let count = targets.len();

        self.state.lock().cursor.replace(targets);
        debug!(unit_id = %self.unit.id, targets = count, "Target list refreshed");
        Ok(count)
    }

    /// Target under the cursor, or the outcome that ends target selection.
    pub(crate) fn select_target(&self) -> Result<FarmTarget, StepOutcome> {
        let state = self.state.lock();
        if state.cursor.is_empty() {
            return Err(StepOutcome::NoTargets);
        }
        state.cursor.current().cloned().ok_or(StepOutcome::TargetCycleEnd)
    }

    pub fn remove_target(&self, target: VillageId) -> bool {
        self.state.lock().cursor.remove(target)
    }

    /// Begin attacking. The receiver resolves with the outcome that stopped
    /// this session.
    pub async fn start(
        self: &Arc<Self>,
        parent: &CancellationToken,
    ) -> Result<oneshot::Receiver<StepOutcome>, StartRefusal> {
        if self.is_running() {
            return Err(StartRefusal::AlreadyRunning);
        }

        let loaded = matches!(
            self.ctx.world.roster.snapshot(self.unit.id).await,
            Ok(Some(snapshot)) if snapshot.loaded
        );
        if !loaded {
            warn!(unit_id = %self.unit.id, "Farmer not ready, unit data not loaded");
            return Err(StartRefusal::NotReady);
        }

        let (tx, rx) = oneshot::channel();
        let token = parent.child_token();
        let session = {
            let mut state = self.state.lock();
            if state.running {
                return Err(StartRefusal::AlreadyRunning);
            }
            if state.cursor.is_empty() {
                return Err(StartRefusal::NoTargets);
            }
            state.session += 1;
            state.running = true;
            state.status = FarmerStatus::Attacking;
            state.token = Some(token.clone());
            state.done = Some(tx);
            state.session
        };

        self.ctx.activity.touch();
        info!(unit_id = %self.unit.id, session, "Farmer started");

        let farmer = Arc::clone(self);
        let task = tokio::spawn(Arc::clone(self).run(session, token));
        tokio::spawn(async move {
            if let Err(e) = task.await {
                farmer.fail(session, e).await;
            }
        });
        Ok(rx)
    }

    /// A session whose task died still settles, so the orchestrator moves on.
    async fn fail(&self, session: u64, cause: JoinError) {
        let outcome = StepOutcome::Unknown(format!("farmer task failed: {}", cause));
        error!(unit_id = %self.unit.id, session, error = %cause, "Farmer task failed");
        if self.finish(session, outcome.clone()) {
            self.ctx
                .log
                .record(FarmEvent::FarmerStopped { unit: self.unit.id, outcome })
                .await;
        }
    }

    /// Stop the current session. Fires the completion channel at most once;
    /// returns false if nothing was running.
    pub fn stop(&self, outcome: StepOutcome) -> bool {
        let session = self.state.lock().session;
        self.finish(session, outcome)
    }

    fn finish(&self, session: u64, outcome: StepOutcome) -> bool {
        let done = {
            let mut state = self.state.lock();
            if state.session != session || !state.running {
                return false;
            }
            state.running = false;
            state.status = FarmerStatus::Settled(outcome.clone());
            if let Some(token) = state.token.take() {
                token.cancel();
            }
            state.done.take()
        };

        if let Some(done) = done {
            let _ = done.send(outcome);
        }
        true
    }

    async fn run(self: Arc<Self>, session: u64, token: CancellationToken) {
        let mut after_commit = false;

        loop {
            let outcome = self.step(&token, after_commit).await;
            let route = outcome.route();

            if outcome != StepOutcome::ExpiredStep {
                self.ctx.activity.touch();
            }
            metrics::counter!("farmer_step_outcomes_total", "outcome" => outcome.label()).increment(1);

            {
                let mut state = self.state.lock();
                if state.session != session {
                    return;
                }
                state.cursor.apply(route.cursor);
                state.status = FarmerStatus::Settled(outcome.clone());
                debug!(
                    unit_id = %self.unit.id,
                    outcome = %outcome,
                    cursor = state.cursor.position(),
                    "Step settled"
                );
            }

            match route.next {
                NextAction::StepAfterInterval => after_commit = true,
                NextAction::RetryNow => after_commit = false,
                NextAction::StopUnit | NextAction::Halt => {
                    if outcome.is_policy_stop() {
                        info!(unit_id = %self.unit.id, outcome = %outcome, "Farmer stopped");
                    } else if outcome != StepOutcome::UserStop {
                        warn!(unit_id = %self.unit.id, outcome = %outcome, "Farmer stopped: {}", outcome.status_text());
                    }
                    if self.finish(session, outcome.clone()) {
                        self.ctx
                            .log
                            .record(FarmEvent::FarmerStopped { unit: self.unit.id, outcome })
                            .await;
                    }
                    return;
                }
            }
        }
    }
}
