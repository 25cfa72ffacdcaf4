// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Persisted Event Log commands
//!
//! Commands: show, clear

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use farmer_core::domain::events::LogEntry;
use farmer_core::domain::repository::{KeyValueStore, LOGS_KEY};
use farmer_core::infrastructure::repositories::FileStore;

use super::{print_entry, store_dir};

#[derive(Subcommand)]
pub enum LogsCommand {
    /// Print the persisted Event Log
    Show {
        /// Store directory (default: ~/.farmer/store)
        #[arg(long, env = "FARMER_STORE_DIR", value_name = "DIR")]
        store: Option<PathBuf>,

        /// Only the newest N entries
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },

    /// Remove every persisted entry
    Clear {
        /// Store directory (default: ~/.farmer/store)
        #[arg(long, env = "FARMER_STORE_DIR", value_name = "DIR")]
        store: Option<PathBuf>,
    },
}

pub async fn handle_command(command: LogsCommand) -> Result<()> {
    match command {
        LogsCommand::Show { store, limit } => show(store_dir(store), limit).await,
        LogsCommand::Clear { store } => clear(store_dir(store)).await,
    }
}

async fn read_entries(store: &FileStore) -> Result<Vec<LogEntry>> {
    let Some(bytes) = store.load(LOGS_KEY).await? else {
        return Ok(Vec::new());
    };
    serde_json::from_slice(&bytes).context("Event log is corrupt")
}

async fn show(dir: PathBuf, limit: Option<usize>) -> Result<()> {
    let store = FileStore::new(&dir).with_context(|| format!("Failed to open store at {:?}", dir))?;
    let entries = read_entries(&store).await?;

    if entries.is_empty() {
        println!("{}", "No log entries".dimmed());
        return Ok(());
    }

    let skip = limit.map_or(0, |n| entries.len().saturating_sub(n));
    for entry in entries.iter().skip(skip) {
        print_entry(entry);
    }
    Ok(())
}

async fn clear(dir: PathBuf) -> Result<()> {
    let store = FileStore::new(&dir).with_context(|| format!("Failed to open store at {:?}", dir))?;
    let removed = read_entries(&store).await.map(|e| e.len()).unwrap_or(0);
    store.save(LOGS_KEY, b"[]").await?;

    println!("{}", format!("✓ Cleared {} log entries", removed).green());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use farmer_core::domain::events::FarmEvent;
    use tempfile::TempDir;

    #[tokio::test]
    async fn clear_empties_persisted_log() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        let entries = vec![LogEntry::now(FarmEvent::EngineStarted)];
        store.save(LOGS_KEY, &serde_json::to_vec(&entries).unwrap()).await.unwrap();

        clear(dir.path().to_path_buf()).await.unwrap();

        assert!(read_entries(&store).await.unwrap().is_empty());
    }
}
