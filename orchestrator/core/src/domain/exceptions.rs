// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Exception Registry
//!
//! Force-included and force-excluded target sets, derived from group
//! membership, plus one registry entry per excepted id.
//!
//! # Invariants
//!
//! - Every id in `include ∪ exclude` has exactly one [`ExceptionEntry`].
//! - No entry exists for an id outside `include ∪ exclude`; [`ExceptionRegistry::reconcile`]
//!   purges them eagerly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::domain::order::CombatReport;
use crate::domain::village::VillageId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionSets {
    pub include: HashSet<VillageId>,
    pub exclude: HashSet<VillageId>,
}

impl ExceptionSets {
    pub fn is_included(&self, id: VillageId) -> bool {
        self.include.contains(&id)
    }

    pub fn is_excluded(&self, id: VillageId) -> bool {
        self.exclude.contains(&id)
    }

    pub fn union(&self) -> HashSet<VillageId> {
        self.include.union(&self.exclude).copied().collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionEntry {
    pub added_at: DateTime<Utc>,
    /// Report that caused an automatic exclusion, if any.
    #[serde(default)]
    pub outcome: Option<CombatReport>,
}

/// Ids that joined or left the exception sets during a reconcile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionDiff {
    pub included: Vec<VillageId>,
    pub excluded: Vec<VillageId>,
    pub purged: Vec<VillageId>,
}

impl ExceptionDiff {
    pub fn is_empty(&self) -> bool {
        self.included.is_empty() && self.excluded.is_empty() && self.purged.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ExceptionRegistry {
    sets: ExceptionSets,
    entries: HashMap<VillageId, ExceptionEntry>,
    /// Reports waiting for their target to show up in the exclude set.
    pending_outcomes: HashMap<VillageId, CombatReport>,
}

impl ExceptionRegistry {
    /// Restore persisted entries. Sets stay empty until the first reconcile,
    /// which also drops stale entries.
    pub fn with_entries(entries: HashMap<VillageId, ExceptionEntry>) -> Self {
        Self {
            entries,
            ..Default::default()
        }
    }

    pub fn sets(&self) -> &ExceptionSets {
        &self.sets
    }

    pub fn entries(&self) -> &HashMap<VillageId, ExceptionEntry> {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Attach `report` to the entry created when its target gets excluded.
    pub fn remember_outcome(&mut self, report: CombatReport) {
        self.pending_outcomes.insert(report.target, report);
    }

    pub fn forget_outcome(&mut self, target: VillageId) -> Option<CombatReport> {
        self.pending_outcomes.remove(&target)
    }

    /// Replace the sets and bring the entries in line with them.
    pub fn reconcile(&mut self, next: ExceptionSets, now: DateTime<Utc>) -> ExceptionDiff {
        let mut diff = ExceptionDiff {
            included: next.include.difference(&self.sets.include).copied().collect(),
            excluded: next.exclude.difference(&self.sets.exclude).copied().collect(),
            purged: Vec::new(),
        };
        diff.included.sort();
        diff.excluded.sort();

        let keep = next.union();
        let mut purged: Vec<VillageId> = self
            .entries
            .keys()
            .filter(|id| !keep.contains(id))
            .copied()
            .collect();
        purged.sort();
        for id in &purged {
            self.entries.remove(id);
        }
        diff.purged = purged;

        for id in &keep {
            let outcome = if next.exclude.contains(id) {
                self.pending_outcomes.remove(id)
            } else {
                None
            };
            match self.entries.get_mut(id) {
                Some(entry) => {
                    if outcome.is_some() {
                        entry.outcome = outcome;
                    }
                }
                None => {
                    self.entries.insert(*id, ExceptionEntry { added_at: now, outcome });
                }
            }
        }

        self.sets = next;
        diff
    }
}
