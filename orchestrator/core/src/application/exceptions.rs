// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Exception Registry Application Service
//!
//! Rebuilds the force-include / force-exclude sets from group membership and
//! keeps the persisted registry in step with them.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::domain::exceptions::{ExceptionDiff, ExceptionEntry, ExceptionRegistry, ExceptionSets};
use crate::domain::farm_config::FarmSettings;
use crate::domain::order::CombatReport;
use crate::domain::repository::{KeyValueStore, PersistenceError, EXCEPTIONS_KEY};
use crate::domain::village::{GroupId, VillageId};
use crate::domain::world::GroupService;

#[derive(Debug, Serialize, Deserialize)]
struct StoredException {
    target: VillageId,
    added_at: DateTime<Utc>,
    #[serde(default)]
    outcome: Option<CombatReport>,
}

pub struct ExceptionService {
    registry: Mutex<ExceptionRegistry>,
    store: Arc<dyn KeyValueStore>,
    persist_lock: tokio::sync::Mutex<()>,
}

impl ExceptionService {
    pub async fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let entries = match load_entries(store.as_ref()).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Failed to load exception registry, starting empty");
                HashMap::new()
            }
        };

        Self {
            registry: Mutex::new(ExceptionRegistry::with_entries(entries)),
            store,
            persist_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn sets(&self) -> ExceptionSets {
        self.registry.lock().sets().clone()
    }

    pub fn entries(&self) -> HashMap<VillageId, ExceptionEntry> {
        self.registry.lock().entries().clone()
    }

    /// Keep `report` until the next rebuild excludes its target.
    pub fn remember_outcome(&self, report: CombatReport) {
        self.registry.lock().remember_outcome(report);
    }

    /// Drop a report whose target never got excluded.
    pub fn forget_outcome(&self, target: VillageId) {
        self.registry.lock().forget_outcome(target);
    }

    /// Recompute both sets from the configured groups and reconcile the registry.
    pub async fn rebuild(
        &self,
        groups: &dyn GroupService,
        settings: &FarmSettings,
    ) -> Result<ExceptionDiff> {
        let next = ExceptionSets {
            include: collect_members(groups, &settings.include_groups).await?,
            exclude: collect_members(groups, &settings.ignore_groups).await?,
        };

        let diff = self.registry.lock().reconcile(next, Utc::now());
        debug!(
            included = diff.included.len(),
            excluded = diff.excluded.len(),
            purged = diff.purged.len(),
            "Exception registry reconciled"
        );
        self.persist().await;
        Ok(diff)
    }

    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        let mut stored: Vec<StoredException> = self
            .entries()
            .into_iter()
            .map(|(target, entry)| StoredException {
                target,
                added_at: entry.added_at,
                outcome: entry.outcome,
            })
            .collect();
        stored.sort_by_key(|e| e.target);

        let result = match serde_json::to_vec(&stored) {
            Ok(bytes) => self.store.save(EXCEPTIONS_KEY, &bytes).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            warn!(error = %e, "Failed to persist exception registry");
        }
    }
}

pub(crate) async fn collect_members(
    groups: &dyn GroupService,
    ids: &[GroupId],
) -> Result<HashSet<VillageId>> {
    let mut members = HashSet::new();
    for group in ids {
        let villages = groups
            .members(*group)
            .await
            .with_context(|| format!("Failed to read members of group {}", group))?;
        members.extend(villages);
    }
    Ok(members)
}

async fn load_entries(
    store: &dyn KeyValueStore,
) -> Result<HashMap<VillageId, ExceptionEntry>, PersistenceError> {
    let Some(bytes) = store.load(EXCEPTIONS_KEY).await? else {
        return Ok(HashMap::new());
    };
    let stored: Vec<StoredException> = serde_json::from_slice(&bytes)?;
    Ok(stored
        .into_iter()
        .map(|e| {
            (
                e.target,
                ExceptionEntry {
                    added_at: e.added_at,
                    outcome: e.outcome,
                },
            )
        })
        .collect())
}
