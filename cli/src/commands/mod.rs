// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the farmer CLI

pub mod config;
pub mod logs;
pub mod run;

pub use self::config::ConfigCommand;
pub use self::logs::LogsCommand;
pub use self::run::RunArgs;

use colored::Colorize;
use std::path::PathBuf;

use farmer_core::domain::events::{FarmEvent, LogEntry};

/// `--store` when given, else `~/.farmer/store`.
pub(crate) fn store_dir(explicit: Option<PathBuf>) -> PathBuf {
    explicit.unwrap_or_else(|| {
        dirs::home_dir()
            .map(|home| home.join(".farmer").join("store"))
            .unwrap_or_else(|| PathBuf::from(".farmer/store"))
    })
}

pub(crate) fn describe(event: &FarmEvent) -> String {
    match event {
        FarmEvent::EngineStarted => "engine started".green().to_string(),
        FarmEvent::EngineStopped { reason } => format!("engine stopped ({:?})", reason).yellow().to_string(),
        FarmEvent::CycleBegin { farmers } => format!("cycle started with {} farmers", farmers),
        FarmEvent::CycleEnd { next_cycle_at } => {
            format!("cycle finished, next at {}", next_cycle_at.format("%H:%M:%S"))
        }
        FarmEvent::AttackSent { unit, target, loadout } => {
            format!("{} → {} (loadout {})", unit, target, loadout.0).cyan().to_string()
        }
        FarmEvent::FarmerStopped { unit, outcome } => {
            format!("farmer {} stopped: {}", unit, outcome.status_text())
        }
        FarmEvent::TargetIgnored { target } => format!("target {} ignored", target).dimmed().to_string(),
        FarmEvent::TargetIncluded { target } => format!("target {} included", target),
        FarmEvent::WatchdogRestart { silent_for_secs } => {
            format!("watchdog restart after {}s of silence", silent_for_secs).red().to_string()
        }
    }
}

pub(crate) fn print_entry(entry: &LogEntry) {
    println!(
        "{} {}",
        entry.timestamp.format("%Y-%m-%d %H:%M:%S").to_string().dimmed(),
        describe(&entry.event)
    );
}
