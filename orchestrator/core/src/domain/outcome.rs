// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Step Outcomes and Routing
//!
//! Every pass through the attack pipeline ends in exactly one [`StepOutcome`].
//! [`StepOutcome::route`] is the single routing table: adding a variant does not
//! compile until it has a routing decision.
//!
//! ## Routing Table
//! | Outcome | Cursor | Next |
//! |---------|--------|------|
//! | `Committed` | +1 | next step after the attack interval |
//! | `TimeLimit`, `BusyTarget`, `AbandonedConquered`, `ProtectedVillage` | +1 | retry now |
//! | `NotAllowedPoints` | target removed | retry now |
//! | `ExpiredStep` | unchanged | retry now |
//! | `UserStop` | unchanged | stop, engine halts |
//! | `NoUnits`, `NoTargets`, `FullStorage`, `CommandLimit`, `CommandRejected` | +1 | stop unit |
//! | `TargetCycleEnd` | reset to 0 | stop unit |
//! | `Unknown` | +1 | stop unit |

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::world::WorldError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum StepOutcome {
    /// The attack order was dispatched.
    Committed,
    TimeLimit,
    BusyTarget,
    AbandonedConquered,
    ProtectedVillage,
    NotAllowedPoints,
    ExpiredStep,
    UserStop,
    NoUnits,
    NoTargets,
    FullStorage,
    CommandLimit,
    TargetCycleEnd,
    /// The remote order API refused the dispatch.
    CommandRejected(String),
    Unknown(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorEffect {
    Unchanged,
    Advance,
    /// Drop the current target; the next one slides under the cursor.
    RemoveTarget,
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    /// Run the pipeline again after the randomized attack interval.
    StepAfterInterval,
    RetryNow,
    /// Stop this unit and hand control back to the orchestrator.
    StopUnit,
    /// Stop this unit; the orchestrator halts as well.
    Halt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub cursor: CursorEffect,
    pub next: NextAction,
}

impl StepOutcome {
    pub fn route(&self) -> Route {
        use CursorEffect::*;
        use NextAction::*;

        let (cursor, next) = match self {
            StepOutcome::Committed => (Advance, StepAfterInterval),
            StepOutcome::TimeLimit
            | StepOutcome::BusyTarget
            | StepOutcome::AbandonedConquered
            | StepOutcome::ProtectedVillage => (Advance, RetryNow),
            StepOutcome::NotAllowedPoints => (RemoveTarget, RetryNow),
            StepOutcome::ExpiredStep => (Unchanged, RetryNow),
            StepOutcome::UserStop => (Unchanged, Halt),
            StepOutcome::NoUnits
            | StepOutcome::NoTargets
            | StepOutcome::FullStorage
            | StepOutcome::CommandLimit
            | StepOutcome::CommandRejected(_) => (Advance, StopUnit),
            StepOutcome::TargetCycleEnd => (Reset, StopUnit),
            StepOutcome::Unknown(_) => (Advance, StopUnit),
        };

        Route { cursor, next }
    }

    /// Policy-driven stops are expected and never reported as errors.
    pub fn is_policy_stop(&self) -> bool {
        matches!(
            self,
            StepOutcome::NoUnits
                | StepOutcome::NoTargets
                | StepOutcome::FullStorage
                | StepOutcome::CommandLimit
                | StepOutcome::TargetCycleEnd
        )
    }

    /// Stable label for metrics and structured logs.
    pub fn label(&self) -> &'static str {
        match self {
            StepOutcome::Committed => "committed",
            StepOutcome::TimeLimit => "time_limit",
            StepOutcome::BusyTarget => "busy_target",
            StepOutcome::AbandonedConquered => "abandoned_conquered",
            StepOutcome::ProtectedVillage => "protected_village",
            StepOutcome::NotAllowedPoints => "not_allowed_points",
            StepOutcome::ExpiredStep => "expired_step",
            StepOutcome::UserStop => "user_stop",
            StepOutcome::NoUnits => "no_units",
            StepOutcome::NoTargets => "no_targets",
            StepOutcome::FullStorage => "full_storage",
            StepOutcome::CommandLimit => "command_limit",
            StepOutcome::TargetCycleEnd => "target_cycle_end",
            StepOutcome::CommandRejected(_) => "command_rejected",
            StepOutcome::Unknown(_) => "unknown",
        }
    }

    /// Short status line shown to the user.
    pub fn status_text(&self) -> String {
        match self {
            StepOutcome::Committed => "Attack sent".to_string(),
            StepOutcome::TimeLimit => "Target too far for the travel time limit".to_string(),
            StepOutcome::BusyTarget => "Target already under attack".to_string(),
            StepOutcome::AbandonedConquered => "Target was conquered".to_string(),
            StepOutcome::ProtectedVillage => "Target is protected".to_string(),
            StepOutcome::NotAllowedPoints => "Target points out of range".to_string(),
            StepOutcome::ExpiredStep => "Step timed out, retrying".to_string(),
            StepOutcome::UserStop => "Stopped".to_string(),
            StepOutcome::NoUnits => "Not enough forces".to_string(),
            StepOutcome::NoTargets => "No targets".to_string(),
            StepOutcome::FullStorage => "Storage full".to_string(),
            StepOutcome::CommandLimit => "Command limit reached".to_string(),
            StepOutcome::TargetCycleEnd => "All targets attacked".to_string(),
            StepOutcome::CommandRejected(reason) => format!("Command rejected: {}", reason),
            StepOutcome::Unknown(reason) => format!("Unknown error: {}", reason),
        }
    }
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Collaborator failures never escape a pipeline; they settle as outcomes.
impl From<WorldError> for StepOutcome {
    fn from(err: WorldError) -> Self {
        match err {
            WorldError::Rejected(reason) => StepOutcome::CommandRejected(reason),
            other => StepOutcome::Unknown(other.to_string()),
        }
    }
}

/// Unit Agent status as surfaced through `FarmEngine::agents`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "outcome", rename_all = "snake_case")]
pub enum FarmerStatus {
    WaitingCycle,
    Attacking,
    /// Last settled outcome of the pipeline.
    Settled(StepOutcome),
}

impl FarmerStatus {
    pub fn status_text(&self) -> String {
        match self {
            FarmerStatus::WaitingCycle => "Waiting for cycle".to_string(),
            FarmerStatus::Attacking => "Attacking".to_string(),
            FarmerStatus::Settled(outcome) => outcome.status_text(),
        }
    }
}
