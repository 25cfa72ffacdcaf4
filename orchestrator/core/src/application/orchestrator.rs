// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Cycle Orchestrator
//!
//! Owns the ordered list of Unit Agents and activates them one at a time.
//! Each agent's completion arrives on its `oneshot` channel; the orchestrator
//! then moves to the agent after it. When the list is exhausted the cycle
//! ends and the next one starts after `cycle_interval`.
//!
//! At most one agent is inside the attack pipeline at any instant.

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::application::context::FarmContext;
use crate::application::farmer::Farmer;
use crate::domain::events::FarmEvent;
use crate::domain::outcome::StepOutcome;
use crate::domain::village::VillageId;

/// How a run of the cycle loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleExit {
    /// The engine token was cancelled.
    Cancelled,
    /// An agent settled as `UserStop`; the engine must stop until restarted.
    Halted,
}

pub struct CycleOrchestrator {
    ctx: Arc<FarmContext>,
    agents: RwLock<Vec<Arc<Farmer>>>,
    active: Mutex<Option<usize>>,
    next_cycle_deadline: Mutex<Option<DateTime<Utc>>>,
}

impl CycleOrchestrator {
    pub fn new(ctx: Arc<FarmContext>) -> Self {
        Self {
            ctx,
            agents: RwLock::new(Vec::new()),
            active: Mutex::new(None),
            next_cycle_deadline: Mutex::new(None),
        }
    }

    pub fn agents(&self) -> Vec<Arc<Farmer>> {
        self.agents.read().clone()
    }

    pub fn agent(&self, unit: VillageId) -> Option<Arc<Farmer>> {
        self.agents.read().iter().find(|f| f.id() == unit).cloned()
    }

    /// Index of the agent currently holding the pipeline.
    pub fn active_index(&self) -> Option<usize> {
        *self.active.lock()
    }

    pub fn next_cycle_deadline(&self) -> Option<DateTime<Utc>> {
        *self.next_cycle_deadline.lock()
    }

    pub fn push(&self, farmer: Arc<Farmer>) {
        self.agents.write().push(farmer);
    }

    /// Drop every agent rejected by `keep` and return them.
    pub fn retain(&self, keep: impl Fn(&Farmer) -> bool) -> Vec<Arc<Farmer>> {
        let mut agents = self.agents.write();
        let (kept, removed): (Vec<_>, Vec<_>) = agents.drain(..).partition(|f| keep(f));
        *agents = kept;
        removed
    }

    pub fn len(&self) -> usize {
        self.agents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn reset(&self) {
        *self.active.lock() = None;
        *self.next_cycle_deadline.lock() = None;
    }

    pub async fn run(&self, token: CancellationToken) -> CycleExit {
        loop {
            let ran = !self.is_empty();
            if ran {
                if let Some(exit) = self.run_cycle(&token).await {
                    return exit;
                }
            } else {
                debug!("No farmers, skipping cycle");
            }

            let interval = self.ctx.settings().cycle_interval;
            let deadline = Utc::now()
                + chrono::Duration::from_std(interval).unwrap_or_else(|_| chrono::Duration::zero());
            *self.active.lock() = None;
            *self.next_cycle_deadline.lock() = Some(deadline);
            if ran {
                self.ctx.log.record(FarmEvent::CycleEnd { next_cycle_at: deadline }).await;
                info!(next_cycle_at = %deadline, "Cycle finished");
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = token.cancelled() => return CycleExit::Cancelled,
            }
        }
    }

    /// One pass over every agent. `None` once the list is exhausted.
    async fn run_cycle(&self, token: &CancellationToken) -> Option<CycleExit> {
        let farmers = self.len();
        *self.next_cycle_deadline.lock() = None;
        self.ctx.activity.touch();
        metrics::counter!("farmer_cycles_total").increment(1);
        self.ctx.log.record(FarmEvent::CycleBegin { farmers }).await;
        info!(farmers, "Cycle started");

        let mut index = 0;
        loop {
            if token.is_cancelled() {
                return Some(CycleExit::Cancelled);
            }
            let Some(farmer) = self.agents.read().get(index).cloned() else {
                return None;
            };
            *self.active.lock() = Some(index);

            let completion = match farmer.start(token).await {
                Ok(completion) => completion,
                Err(refusal) => {
                    debug!(unit_id = %farmer.id(), reason = %refusal, "Farmer skipped");
                    index += 1;
                    continue;
                }
            };

            let outcome = tokio::select! {
                outcome = completion => outcome.unwrap_or_else(|_| {
                    StepOutcome::Unknown("farmer dropped its completion".to_string())
                }),
                _ = token.cancelled() => return Some(CycleExit::Cancelled),
            };

            // Position may have shifted if agents were added or removed meanwhile
            let position = self.agents.read().iter().position(|f| Arc::ptr_eq(f, &farmer));
            match (outcome, position) {
                (StepOutcome::UserStop, Some(_)) => return Some(CycleExit::Halted),
                (_, Some(position)) => index = position + 1,
                (_, None) => {}
            }
        }
    }
}
