// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Farm Configuration Types
//
// Defines the configuration schema for the attack scheduling engine:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Target selection bounds (distance, points, travel time)
// - Pacing (attack interval, cycle interval, step deadline, watchdog)
// - Collision policy (single attack, multiple farmers, re-attack separation)
// - Group-driven exceptions and farmer selection

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::domain::order::LoadoutId;
use crate::domain::village::GroupId;

pub const API_VERSION: &str = "100monkeys.ai/v1";
pub const KIND: &str = "FarmConfig";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field}: minimum {min} is greater than maximum {max}")]
    InvertedRange { field: &'static str, min: String, max: String },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
    #[error("reserved_command_slots ({reserved}) exceeds command_slot_limit ({limit})")]
    ReservedSlots { reserved: usize, limit: usize },
}

/// Engine settings (content under spec:)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FarmSettings {
    /// Loadouts the engine may use; empty means every registry loadout
    pub loadouts: Vec<LoadoutId>,

    /// Only units in these groups farm; empty means every controlled unit
    pub farmer_groups: Vec<GroupId>,

    /// Members are force-included targets
    pub include_groups: Vec<GroupId>,

    /// Members are force-excluded targets
    pub ignore_groups: Vec<GroupId>,

    pub min_distance: f64,
    pub max_distance: f64,
    pub min_points: u32,
    pub max_points: u32,

    #[serde(with = "humantime_serde")]
    pub max_travel_time: Duration,

    /// Base delay between two attacks of one unit (jittered ±50%)
    #[serde(with = "humantime_serde")]
    pub attack_interval: Duration,

    /// Delay between the end of a cycle and the start of the next
    #[serde(with = "humantime_serde")]
    pub cycle_interval: Duration,

    /// Wall-clock deadline for one pass of the pipeline
    #[serde(with = "humantime_serde")]
    pub step_timeout: Duration,

    /// Minimum separation between arrivals on the same target
    #[serde(with = "humantime_serde")]
    pub min_reattack_interval: Duration,

    pub target_limit_per_unit: usize,
    pub command_slot_limit: usize,
    pub reserved_command_slots: usize,

    /// Skip units whose storage is completely full
    pub ignore_full_storage: bool,

    /// Never send a second attack to a target already under attack
    pub single_attack: bool,

    /// Allow several controlled units to attack the same target
    pub multiple_farmers: bool,

    /// Force-exclude targets where an attack was lost
    pub ignore_on_loss: bool,

    pub logs_limit: usize,

    /// How often the watchdog checks for silence; changes apply live
    #[serde(with = "humantime_serde")]
    pub watchdog_tick: Duration,

    #[serde(with = "humantime_serde")]
    pub watchdog_restart_delay: Duration,
}

impl Default for FarmSettings {
    fn default() -> Self {
        Self {
            loadouts: Vec::new(),
            farmer_groups: Vec::new(),
            include_groups: Vec::new(),
            ignore_groups: Vec::new(),
            min_distance: 0.0,
            max_distance: 25.0,
            min_points: 0,
            max_points: 12_500,
            max_travel_time: Duration::from_secs(90 * 60),
            attack_interval: Duration::from_secs(2),
            cycle_interval: Duration::from_secs(5 * 60),
            step_timeout: Duration::from_secs(30),
            min_reattack_interval: Duration::from_secs(60),
            target_limit_per_unit: 100,
            command_slot_limit: 50,
            reserved_command_slots: 0,
            ignore_full_storage: true,
            single_attack: true,
            multiple_farmers: true,
            ignore_on_loss: true,
            logs_limit: 500,
            watchdog_tick: Duration::from_secs(10),
            watchdog_restart_delay: Duration::from_secs(5),
        }
    }
}

/// Identifies one field of [`FarmSettings`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingKey {
    Loadouts,
    FarmerGroups,
    IncludeGroups,
    IgnoreGroups,
    MinDistance,
    MaxDistance,
    MinPoints,
    MaxPoints,
    MaxTravelTime,
    AttackInterval,
    CycleInterval,
    StepTimeout,
    MinReattackInterval,
    TargetLimitPerUnit,
    CommandSlotLimit,
    ReservedCommandSlots,
    IgnoreFullStorage,
    SingleAttack,
    MultipleFarmers,
    IgnoreOnLoss,
    LogsLimit,
    WatchdogTick,
    WatchdogRestartDelay,
}

/// Fields changed by [`FarmSettings::update`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangedSettings(HashSet<SettingKey>);

impl ChangedSettings {
    pub fn contains(&self, key: SettingKey) -> bool {
        self.0.contains(&key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Target lists must be recomputed.
    pub fn affects_targets(&self) -> bool {
        [
            SettingKey::MinDistance,
            SettingKey::MaxDistance,
            SettingKey::TargetLimitPerUnit,
            SettingKey::IncludeGroups,
            SettingKey::IgnoreGroups,
        ]
        .iter()
        .any(|key| self.contains(*key))
    }

    /// Exception sets must be rebuilt from group membership.
    pub fn affects_exceptions(&self) -> bool {
        self.contains(SettingKey::IncludeGroups) || self.contains(SettingKey::IgnoreGroups)
    }

    /// The set of Unit Agents must be re-synced with the roster.
    pub fn affects_farmers(&self) -> bool {
        self.contains(SettingKey::FarmerGroups) || self.contains(SettingKey::IgnoreGroups)
    }
}

impl FarmSettings {
    /// Replace every field with `next` and report which ones changed.
    pub fn update(&mut self, next: FarmSettings) -> ChangedSettings {
        let mut changed = HashSet::new();

        macro_rules! diff {
            ($($field:ident => $key:ident),* $(,)?) => {
                $(
                    if self.$field != next.$field {
                        changed.insert(SettingKey::$key);
                    }
                )*
            };
        }

        diff! {
            loadouts => Loadouts,
            farmer_groups => FarmerGroups,
            include_groups => IncludeGroups,
            ignore_groups => IgnoreGroups,
            min_distance => MinDistance,
            max_distance => MaxDistance,
            min_points => MinPoints,
            max_points => MaxPoints,
            max_travel_time => MaxTravelTime,
            attack_interval => AttackInterval,
            cycle_interval => CycleInterval,
            step_timeout => StepTimeout,
            min_reattack_interval => MinReattackInterval,
            target_limit_per_unit => TargetLimitPerUnit,
            command_slot_limit => CommandSlotLimit,
            reserved_command_slots => ReservedCommandSlots,
            ignore_full_storage => IgnoreFullStorage,
            single_attack => SingleAttack,
            multiple_farmers => MultipleFarmers,
            ignore_on_loss => IgnoreOnLoss,
            logs_limit => LogsLimit,
            watchdog_tick => WatchdogTick,
            watchdog_restart_delay => WatchdogRestartDelay,
        }

        *self = next;
        ChangedSettings(changed)
    }

    /// Silence longer than this means the engine has stalled.
    pub fn watchdog_threshold(&self) -> Duration {
        self.cycle_interval.mul_f64(1.5) + self.attack_interval
    }

    /// Outgoing orders a unit may have before it hits the command limit.
    pub fn usable_command_slots(&self) -> usize {
        self.command_slot_limit.saturating_sub(self.reserved_command_slots)
    }

    pub fn points_allowed(&self, points: u32) -> bool {
        points >= self.min_points && points <= self.max_points
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_distance > self.max_distance {
            return Err(ConfigError::InvertedRange {
                field: "distance",
                min: self.min_distance.to_string(),
                max: self.max_distance.to_string(),
            });
        }
        if self.min_points > self.max_points {
            return Err(ConfigError::InvertedRange {
                field: "points",
                min: self.min_points.to_string(),
                max: self.max_points.to_string(),
            });
        }
        let non_zero = [
            ("attack_interval", self.attack_interval),
            ("cycle_interval", self.cycle_interval),
            ("step_timeout", self.step_timeout),
            ("max_travel_time", self.max_travel_time),
            ("watchdog_tick", self.watchdog_tick),
        ];
        for (name, value) in non_zero {
            if value.is_zero() {
                return Err(ConfigError::Zero(name));
            }
        }
        if self.target_limit_per_unit == 0 {
            return Err(ConfigError::Zero("target_limit_per_unit"));
        }
        if self.logs_limit == 0 {
            return Err(ConfigError::Zero("logs_limit"));
        }
        if self.reserved_command_slots > self.command_slot_limit {
            return Err(ConfigError::ReservedSlots {
                reserved: self.reserved_command_slots,
                limit: self.command_slot_limit,
            });
        }
        Ok(())
    }
}

/// Manifest metadata (Kubernetes-style)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Top-level Kubernetes-style farm configuration manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmConfigManifest {
    /// API version (must be "100monkeys.ai/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "FarmConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: FarmSettings,
}

impl Default for FarmConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "farmer".to_string(),
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: FarmSettings::default(),
        }
    }
}

impl FarmConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. FARMER_CONFIG_PATH environment variable
    /// 2. ./farmer-config.yaml (working directory)
    /// 3. ~/.farmer/config.yaml (user home)
    /// 4. /etc/farmer/config.yaml (system, Unix)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("FARMER_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./farmer-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".farmer").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        {
            let system_config = PathBuf::from("/etc/farmer/config.yaml");
            if system_config.exists() {
                return Some(system_config);
            }
        }

        None
    }

    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist and parse
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(ms) = env_number::<u64>("FARMER_ATTACK_INTERVAL_MS") {
            tracing::info!("Environment override: FARMER_ATTACK_INTERVAL_MS={}", ms);
            self.spec.attack_interval = Duration::from_millis(ms);
        }
        if let Some(secs) = env_number::<u64>("FARMER_CYCLE_INTERVAL_SECS") {
            tracing::info!("Environment override: FARMER_CYCLE_INTERVAL_SECS={}", secs);
            self.spec.cycle_interval = Duration::from_secs(secs);
        }
        if let Some(distance) = env_number::<f64>("FARMER_MAX_DISTANCE") {
            tracing::info!("Environment override: FARMER_MAX_DISTANCE={}", distance);
            self.spec.max_distance = distance;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        self.spec.validate()?;
        Ok(())
    }
}

fn env_number<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Invalid value for {}: '{}'. Ignoring.", name, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = FarmConfigManifest::default();
        assert_eq!(manifest.api_version, API_VERSION);
        assert_eq!(manifest.kind, KIND);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_yaml_with_human_durations() {
        let yaml = r#"
apiVersion: 100monkeys.ai/v1
kind: FarmConfig
metadata:
  name: main-account
spec:
  max_distance: 15
  attack_interval: 3s
  cycle_interval: 10m
  include_groups: [4]
  single_attack: false
"#;
        let manifest = FarmConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.metadata.name, "main-account");
        assert_eq!(manifest.spec.max_distance, 15.0);
        assert_eq!(manifest.spec.attack_interval, Duration::from_secs(3));
        assert_eq!(manifest.spec.cycle_interval, Duration::from_secs(600));
        assert_eq!(manifest.spec.include_groups, vec![GroupId(4)]);
        assert!(!manifest.spec.single_attack);
        // Unspecified fields keep their defaults
        assert_eq!(manifest.spec.command_slot_limit, 50);
    }

    #[test]
    fn test_validation() {
        let mut settings = FarmSettings::default();
        assert!(settings.validate().is_ok());

        settings.min_distance = 30.0;
        assert!(matches!(settings.validate(), Err(ConfigError::InvertedRange { field: "distance", .. })));
        settings.min_distance = 0.0;

        settings.step_timeout = Duration::ZERO;
        assert_eq!(settings.validate(), Err(ConfigError::Zero("step_timeout")));
        settings.step_timeout = Duration::from_secs(30);

        settings.reserved_command_slots = 51;
        assert!(matches!(settings.validate(), Err(ConfigError::ReservedSlots { .. })));
    }

    #[test]
    fn test_update_reports_changed_fields() {
        let mut settings = FarmSettings::default();
        let mut next = settings.clone();
        next.max_distance = 10.0;
        next.ignore_groups = vec![GroupId(2)];

        let changed = settings.update(next);
        assert_eq!(changed.len(), 2);
        assert!(changed.contains(SettingKey::MaxDistance));
        assert!(changed.affects_targets());
        assert!(changed.affects_exceptions());
        assert!(changed.affects_farmers());
        assert_eq!(settings.max_distance, 10.0);

        let unchanged = settings.update(settings.clone());
        assert!(unchanged.is_empty());
    }

    #[test]
    fn test_watchdog_threshold() {
        let settings = FarmSettings {
            cycle_interval: Duration::from_secs(60),
            attack_interval: Duration::from_secs(2),
            ..Default::default()
        };
        assert_eq!(settings.watchdog_threshold(), Duration::from_secs(92));
    }
}
