// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Layer
//!
//! Pure types and rules of the attack scheduling engine. No I/O dependencies;
//! external systems are reached only through the traits in [`world`] and
//! [`repository`].
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`village`] | `VillageId`, `Unit`, `Target`, `FarmTarget` |
//! | [`order`] | `AttackOrder`, `Loadout`, `UnitSnapshot`, `CombatReport` |
//! | [`outcome`] | `StepOutcome`, `Route`, `FarmerStatus` |
//! | [`farmer`] | `TargetCursor`, `FarmerSnapshot` |
//! | [`filter`] | `filter_targets`, `FilterPolicy` |
//! | [`exceptions`] | `ExceptionRegistry`, `ExceptionSets` |
//! | [`events`] | `FarmEvent`, `LogEntry`, `StopReason` |
//! | [`farm_config`] | `FarmSettings`, `FarmConfigManifest` |
//! | [`world`] | collaborator traits, `WorldEvent`, `WorldError` |
//! | [`repository`] | `KeyValueStore` |

pub mod village;
pub mod order;
pub mod outcome;
pub mod farmer;
pub mod filter;
pub mod exceptions;
pub mod events;
pub mod farm_config;
pub mod world;
pub mod repository;
