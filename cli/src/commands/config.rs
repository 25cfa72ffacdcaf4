// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use farmer_core::domain::farm_config::FarmConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate default configuration
    Generate {
        /// Output path (default: ./farmer-config.yaml)
        #[arg(short, long, default_value = "./farmer-config.yaml")]
        output: PathBuf,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output } => generate(output).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = FarmConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. FARMER_CONFIG_PATH: {}",
            std::env::var("FARMER_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./farmer-config.yaml");
        println!("  4. ~/.farmer/config.yaml");
        println!("  5. /etc/farmer/config.yaml");
        println!();
    }

    let settings = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Targeting:".bold());
    println!("  Distance: {} - {}", settings.min_distance, settings.max_distance);
    println!("  Points: {} - {}", settings.min_points, settings.max_points);
    println!("  Targets per unit: {}", settings.target_limit_per_unit);
    println!("  Single attack: {}", settings.single_attack);
    println!("  Multiple farmers: {}", settings.multiple_farmers);
    println!();

    println!("{}", "Timing:".bold());
    println!("  Attack interval: {:?}", settings.attack_interval);
    println!("  Cycle interval: {:?}", settings.cycle_interval);
    println!("  Step timeout: {:?}", settings.step_timeout);
    println!("  Max travel time: {:?}", settings.max_travel_time);
    println!("  Watchdog threshold: {:?}", settings.watchdog_threshold());
    println!();

    println!("{}", "Groups:".bold());
    println!("  Farmers: {:?}", settings.farmer_groups.iter().map(|g| g.0).collect::<Vec<_>>());
    println!("  Include: {:?}", settings.include_groups.iter().map(|g| g.0).collect::<Vec<_>>());
    println!("  Ignore: {:?}", settings.ignore_groups.iter().map(|g| g.0).collect::<Vec<_>>());
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = FarmConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf) -> Result<()> {
    FarmConfigManifest::default()
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn generated_config_validates() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("farmer-config.yaml");
        generate(path.clone()).await.unwrap();

        let manifest = FarmConfigManifest::from_yaml_file(&path).unwrap();
        manifest.validate().unwrap();
        assert_eq!(manifest, FarmConfigManifest::default());
    }
}
