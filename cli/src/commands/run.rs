// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `farmer run`: start the engine over an in-memory world and stream its
//! Event Log until interrupted.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use farmer_core::application::{Collaborators, FarmEngine};
use farmer_core::domain::farm_config::FarmConfigManifest;
use farmer_core::domain::events::LogEntry;
use farmer_core::domain::village::VillageId;
use farmer_core::infrastructure::event_bus::{EventBusError, EventReceiver, UnitEventReceiver};
use farmer_core::infrastructure::memory_world::{InMemoryWorld, WorldSnapshot};
use farmer_core::infrastructure::repositories::FileStore;

use super::{print_entry, store_dir};

#[derive(Args)]
pub struct RunArgs {
    /// World description (YAML)
    #[arg(long, value_name = "FILE")]
    world: PathBuf,

    /// Directory for persisted logs and exceptions (default: ~/.farmer/store)
    #[arg(long, env = "FARMER_STORE_DIR", value_name = "DIR")]
    store: Option<PathBuf>,

    /// Stop after this many seconds
    #[arg(long, value_name = "SECS")]
    duration: Option<u64>,

    /// Only stream events concerning this unit
    #[arg(long, value_name = "ID")]
    unit: Option<u64>,

    /// Serve Prometheus metrics on this address
    #[arg(long, env = "FARMER_METRICS_ADDR", value_name = "ADDR")]
    metrics_addr: Option<SocketAddr>,
}

pub async fn execute(args: RunArgs, config_override: Option<PathBuf>) -> Result<()> {
    let manifest =
        FarmConfigManifest::load_or_default(config_override).context("Failed to load configuration")?;
    manifest.validate().context("Configuration validation failed")?;

    if let Some(addr) = args.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(%addr, "Serving metrics");
    }

    let snapshot = WorldSnapshot::from_yaml_file(&args.world)
        .with_context(|| format!("Failed to load world from {:?}", args.world))?;
    let world = Arc::new(InMemoryWorld::new(snapshot));

    let store_path = store_dir(args.store);
    let store = FileStore::new(&store_path)
        .with_context(|| format!("Failed to open store at {:?}", store_path))?;

    let engine = FarmEngine::init(
        Collaborators::from_world(world.clone()),
        Arc::new(store),
        manifest.spec.clone(),
    )
    .await?;
    engine.spawn_event_listener(world.subscribe());

    let mut events = match args.unit {
        Some(id) => Feed::Unit(engine.subscribe_unit(VillageId(id))),
        None => Feed::All(engine.subscribe()),
    };
    engine.start().await.context("Failed to start engine")?;
    println!(
        "{}",
        format!("✓ Farming with {} units (Ctrl-C to stop)", engine.agents().len()).green()
    );

    let deadline = async {
        match args.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(interrupt);

    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(entry) => print_entry(&entry),
                Err(EventBusError::Lagged(n)) => warn!("Dropped {} events from the live feed", n),
                Err(_) => break,
            },
            _ = &mut interrupt => {
                println!();
                break;
            }
            _ = &mut deadline => break,
        }
    }

    engine.shutdown().await;
    loop {
        match events.try_recv() {
            Ok(entry) => print_entry(&entry),
            Err(EventBusError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    print_agents(&engine);
    Ok(())
}

/// The live event stream, whole or narrowed to one unit.
enum Feed {
    All(EventReceiver),
    Unit(UnitEventReceiver),
}

impl Feed {
    async fn recv(&mut self) -> Result<LogEntry, EventBusError> {
        match self {
            Feed::All(receiver) => receiver.recv().await,
            Feed::Unit(receiver) => receiver.recv().await,
        }
    }

    fn try_recv(&mut self) -> Result<LogEntry, EventBusError> {
        match self {
            Feed::All(receiver) => receiver.try_recv(),
            Feed::Unit(receiver) => receiver.try_recv(),
        }
    }
}

fn print_agents(engine: &FarmEngine) {
    println!();
    println!("{}", "Farmers:".bold());
    for agent in engine.agents() {
        println!(
            "  {} {} - {} ({}/{} targets)",
            agent.unit_id.to_string().bold(),
            agent.unit_name,
            agent.status_text,
            agent.cursor,
            agent.targets.len()
        );
    }
}
