// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Villages, Units and Targets
//!
//! Identity and position types shared by every layer. Controlled units and
//! candidate targets are both villages on the same map, so they share the
//! [`VillageId`] namespace; group membership and the exception registry rely on
//! that.
//!
//! All of these are read-only snapshots owned by external collaborators. The
//! engine never mutates a [`Unit`] or a [`Target`]; the per-unit `distance` lives
//! on [`FarmTarget`], not on the target itself.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Map-wide identifier of a village (controlled unit or target).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VillageId(pub u64);

impl fmt::Display for VillageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub u64);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Map coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Straight-line distance in map fields.
    pub fn distance_to(&self, other: &Position) -> f64 {
        let dx = f64::from(self.x - other.x);
        let dy = f64::from(self.y - other.y);
        (dx * dx + dy * dy).sqrt()
    }
}

/// A controlled production unit able to dispatch forces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub id: VillageId,
    pub name: String,
    pub position: Position,
    pub owner: PlayerId,
}

/// A candidate attack target as published by the map directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: VillageId,
    pub position: Position,
    /// `None` for unaffiliated (barbarian) villages.
    pub owner: Option<PlayerId>,
    #[serde(default)]
    pub tribe: Option<u64>,
    pub points: u32,
}

impl Target {
    pub fn is_unaffiliated(&self) -> bool {
        self.owner.is_none()
    }
}

/// A target as seen from one specific unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmTarget {
    pub target: Target,
    pub distance: f64,
}

impl FarmTarget {
    pub fn id(&self) -> VillageId {
        self.target.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_is_euclidean() {
        let a = Position::new(500, 500);
        let b = Position::new(503, 504);
        assert!((a.distance_to(&b) - 5.0).abs() < f64::EPSILON);
        assert_eq!(a.distance_to(&a), 0.0);
    }
}
