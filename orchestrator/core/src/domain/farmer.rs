// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Unit Agent State
//!
//! The target list and cursor owned by one Unit Agent ("farmer").
//!
//! # Invariants
//!
//! - `cursor ∈ [0, targets.len()]`.
//! - Within a cycle the cursor never decreases; the only reset to 0 is
//!   [`CursorEffect::Reset`] on target-list exhaustion.

use serde::{Deserialize, Serialize};

use crate::domain::outcome::{CursorEffect, FarmerStatus};
use crate::domain::village::{FarmTarget, VillageId};

#[derive(Debug, Clone, PartialEq)]
pub struct TargetCursor {
    targets: Vec<FarmTarget>,
    cursor: usize,
}

impl TargetCursor {
    pub fn new(targets: Vec<FarmTarget>) -> Self {
        Self { targets, cursor: 0 }
    }

    pub fn targets(&self) -> &[FarmTarget] {
        &self.targets
    }

    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Target under the cursor; `None` once the list is exhausted.
    pub fn current(&self) -> Option<&FarmTarget> {
        self.targets.get(self.cursor)
    }

    pub fn apply(&mut self, effect: CursorEffect) {
        match effect {
            CursorEffect::Unchanged => {}
            CursorEffect::Advance => {
                self.cursor = (self.cursor + 1).min(self.targets.len());
            }
            CursorEffect::RemoveTarget => {
                if self.cursor < self.targets.len() {
                    self.targets.remove(self.cursor);
                }
            }
            CursorEffect::Reset => self.cursor = 0,
        }
    }

    /// Swap in a recomputed list, keeping the cursor where it was.
    pub fn replace(&mut self, targets: Vec<FarmTarget>) {
        self.targets = targets;
        self.cursor = self.cursor.min(self.targets.len());
    }

    /// Drop `id` wherever it sits. Entries before the cursor shift it back by
    /// one so the cursor keeps pointing at the same upcoming target.
    pub fn remove(&mut self, id: VillageId) -> bool {
        let Some(index) = self.targets.iter().position(|t| t.id() == id) else {
            return false;
        };
        self.targets.remove(index);
        if index < self.cursor {
            self.cursor -= 1;
        }
        true
    }
}

/// Read-only view of a Unit Agent for callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarmerSnapshot {
    pub unit_id: VillageId,
    pub unit_name: String,
    pub running: bool,
    pub status: FarmerStatus,
    pub status_text: String,
    pub cursor: usize,
    pub targets: Vec<VillageId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::village::{Position, Target};

    fn targets(ids: &[u64]) -> Vec<FarmTarget> {
        ids.iter()
            .map(|id| FarmTarget {
                target: Target {
                    id: VillageId(*id),
                    position: Position::new(*id as i32, 0),
                    owner: None,
                    tribe: None,
                    points: 100,
                },
                distance: *id as f64,
            })
            .collect()
    }

    #[test]
    fn cursor_stays_in_bounds() {
        let mut cursor = TargetCursor::new(targets(&[1, 2]));
        for _ in 0..5 {
            cursor.apply(CursorEffect::Advance);
            assert!(cursor.position() <= cursor.targets().len());
        }
        assert_eq!(cursor.position(), 2);
        assert!(cursor.current().is_none());
        cursor.apply(CursorEffect::Reset);
        assert_eq!(cursor.current().map(|t| t.id()), Some(VillageId(1)));
    }

    #[test]
    fn removing_current_slides_next_under_cursor() {
        let mut cursor = TargetCursor::new(targets(&[1, 2, 3]));
        cursor.apply(CursorEffect::Advance);
        cursor.apply(CursorEffect::RemoveTarget);
        assert_eq!(cursor.position(), 1);
        assert_eq!(cursor.current().map(|t| t.id()), Some(VillageId(3)));
        assert_eq!(cursor.targets().len(), 2);
    }

    #[test]
    fn remove_before_cursor_keeps_upcoming_target() {
        let mut cursor = TargetCursor::new(targets(&[1, 2, 3, 4]));
        cursor.apply(CursorEffect::Advance);
        cursor.apply(CursorEffect::Advance);
        assert!(cursor.remove(VillageId(1)));
        assert_eq!(cursor.current().map(|t| t.id()), Some(VillageId(3)));
        assert!(!cursor.remove(VillageId(99)));
    }

    #[test]
    fn replace_clamps_cursor() {
        let mut cursor = TargetCursor::new(targets(&[1, 2, 3]));
        cursor.apply(CursorEffect::Advance);
        cursor.apply(CursorEffect::Advance);
        cursor.replace(targets(&[5]));
        assert_eq!(cursor.position(), 1);
    }
}
