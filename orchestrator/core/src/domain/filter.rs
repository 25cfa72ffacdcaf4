// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Target Filter
//!
//! Pure functions turning the raw directory listing around a unit into the
//! unit's distance-sorted, capped target list.
//!
//! Rejection rules, in order:
//! 1. distance outside `[min_distance, max_distance]`
//! 2. owned by the controlling player
//! 3. owned by anyone and not force-included
//! 4. force-excluded
//!
//! Points are not checked here: they may change before the attack, so the
//! pipeline re-checks them right before commit.

use crate::domain::exceptions::ExceptionSets;
use crate::domain::village::{FarmTarget, PlayerId, Position, Target};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterPolicy {
    pub player: PlayerId,
    pub min_distance: f64,
    pub max_distance: f64,
    pub limit: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    Distance,
    OwnVillage,
    Affiliated,
    Excluded,
}

/// Why `target` is not eligible from `origin`, if it isn't.
pub fn rejection(
    target: &Target,
    origin: Position,
    policy: &FilterPolicy,
    exceptions: &ExceptionSets,
) -> Option<Rejection> {
    let distance = origin.distance_to(&target.position);
    if distance < policy.min_distance || distance > policy.max_distance {
        return Some(Rejection::Distance);
    }
    if target.owner == Some(policy.player) {
        return Some(Rejection::OwnVillage);
    }
    if !target.is_unaffiliated() && !exceptions.is_included(target.id) {
        return Some(Rejection::Affiliated);
    }
    if exceptions.is_excluded(target.id) {
        return Some(Rejection::Excluded);
    }
    None
}

pub fn filter_targets(
    raw: &[Target],
    origin: Position,
    policy: &FilterPolicy,
    exceptions: &ExceptionSets,
) -> Vec<FarmTarget> {
    let mut eligible: Vec<FarmTarget> = raw
        .iter()
        .filter(|target| rejection(target, origin, policy, exceptions).is_none())
        .map(|target| FarmTarget {
            distance: origin.distance_to(&target.position),
            target: target.clone(),
        })
        .collect();

    eligible.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.id().cmp(&b.id())));
    eligible.truncate(policy.limit);
    eligible
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::village::VillageId;

    const ME: PlayerId = PlayerId(1);

    fn policy() -> FilterPolicy {
        FilterPolicy { player: ME, min_distance: 0.0, max_distance: 20.0, limit: 50 }
    }

    fn target(id: u64, x: i32, y: i32, owner: Option<u64>) -> Target {
        Target {
            id: VillageId(id),
            position: Position::new(x, y),
            owner: owner.map(PlayerId),
            tribe: None,
            points: 300,
        }
    }

    #[test]
    fn sorts_by_distance_ascending() {
        let origin = Position::new(0, 0);
        let raw = vec![target(1, 5, 0, None), target(2, 2, 0, None)];
        let ids: Vec<u64> = filter_targets(&raw, origin, &policy(), &ExceptionSets::default())
            .iter()
            .map(|t| t.id().0)
            .collect();
        assert_eq!(ids, vec![2, 1]);
    }

    #[test]
    fn applies_each_rejection_rule() {
        let origin = Position::new(0, 0);
        let mut exceptions = ExceptionSets::default();
        exceptions.include.insert(VillageId(5));
        exceptions.exclude.insert(VillageId(6));

        assert_eq!(rejection(&target(1, 30, 0, None), origin, &policy(), &exceptions), Some(Rejection::Distance));
        assert_eq!(rejection(&target(2, 3, 0, Some(1)), origin, &policy(), &exceptions), Some(Rejection::OwnVillage));
        assert_eq!(rejection(&target(3, 3, 0, Some(9)), origin, &policy(), &exceptions), Some(Rejection::Affiliated));
        assert_eq!(rejection(&target(5, 3, 0, Some(9)), origin, &policy(), &exceptions), None);
        assert_eq!(rejection(&target(6, 3, 0, None), origin, &policy(), &exceptions), Some(Rejection::Excluded));
        assert_eq!(rejection(&target(7, 3, 0, None), origin, &policy(), &exceptions), None);
    }

    #[test]
    fn force_include_does_not_allow_own_villages() {
        let mut exceptions = ExceptionSets::default();
        exceptions.include.insert(VillageId(2));
        let own = target(2, 1, 1, Some(1));
        assert_eq!(rejection(&own, Position::new(0, 0), &policy(), &exceptions), Some(Rejection::OwnVillage));
    }

    #[test]
    fn min_distance_bound_is_respected() {
        let p = FilterPolicy { min_distance: 3.0, ..policy() };
        let raw = vec![target(1, 1, 0, None), target(2, 3, 0, None), target(3, 4, 0, None)];
        let ids: Vec<u64> = filter_targets(&raw, Position::new(0, 0), &p, &ExceptionSets::default())
            .iter()
            .map(|t| t.id().0)
            .collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[test]
    fn truncates_to_limit_keeping_nearest() {
        let p = FilterPolicy { limit: 3, ..policy() };
        let raw: Vec<Target> = (1..=10).rev().map(|i| target(i, i as i32, 0, None)).collect();
        let kept = filter_targets(&raw, Position::new(0, 0), &p, &ExceptionSets::default());
        let ids: Vec<u64> = kept.iter().map(|t| t.id().0).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn never_returns_ineligible_targets() {
        let origin = Position::new(50, 50);
        let mut exceptions = ExceptionSets::default();
        let mut raw = Vec::new();
        let mut id = 0;
        for x in (20..80).step_by(3) {
            for y in (20..80).step_by(4) {
                id += 1;
                let owner = match id % 4 {
                    0 => Some(1),
                    1 => Some(7),
                    _ => None,
                };
                if id % 5 == 0 {
                    exceptions.exclude.insert(VillageId(id));
                }
                if id % 9 == 0 {
                    exceptions.include.insert(VillageId(id));
                }
                raw.push(target(id, x, y, owner));
            }
        }
        let p = FilterPolicy { min_distance: 4.0, max_distance: 18.0, limit: usize::MAX, player: ME };
        let kept = filter_targets(&raw, origin, &p, &exceptions);
        assert!(!kept.is_empty());
        for t in &kept {
            assert!(t.distance >= 4.0 && t.distance <= 18.0);
            assert_ne!(t.target.owner, Some(ME));
            assert!(t.target.owner.is_none() || exceptions.is_included(t.id()));
            assert!(!exceptions.is_excluded(t.id()));
        }
        assert!(kept.windows(2).all(|w| w[0].distance <= w[1].distance));
    }
}
