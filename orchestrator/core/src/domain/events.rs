// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::order::LoadoutId;
use crate::domain::outcome::StepOutcome;
use crate::domain::village::VillageId;

/// Why the whole engine stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Requested by a caller; requires an explicit restart.
    User,
    /// Forced by the liveness watchdog; a restart follows.
    Watchdog,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FarmEvent {
    EngineStarted,
    EngineStopped {
        reason: StopReason,
    },
    CycleBegin {
        farmers: usize,
    },
    CycleEnd {
        next_cycle_at: DateTime<Utc>,
    },
    AttackSent {
        unit: VillageId,
        target: VillageId,
        loadout: LoadoutId,
    },
    FarmerStopped {
        unit: VillageId,
        outcome: StepOutcome,
    },
    TargetIgnored {
        target: VillageId,
    },
    TargetIncluded {
        target: VillageId,
    },
    WatchdogRestart {
        silent_for_secs: u64,
    },
}

/// One Event Log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub event: FarmEvent,
}

impl LogEntry {
    pub fn now(event: FarmEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }
}
