// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Liveness Watchdog
//!
//! Independent periodic task that force-restarts the engine when it has made
//! no forward progress for longer than `cycle_interval × 1.5 + attack_interval`.
//! It only acts while the engine is meant to be running, and holds a weak
//! reference so it never keeps a dropped engine alive.

use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::engine::FarmEngine;
use crate::domain::events::{FarmEvent, StopReason};

/// `silent > threshold`, strictly.
pub fn is_stale(silent: Duration, threshold: Duration) -> bool {
    silent > threshold
}

/// Check the engine every `watchdog_tick`. The tick is re-read from the
/// current settings before each wait; `retick` cuts a pending wait short.
pub(crate) async fn run(engine: Weak<FarmEngine>, retick: Arc<Notify>, token: CancellationToken) {
    info!("Starting liveness watchdog");

    loop {
        let Some(tick) = engine.upgrade().map(|e| e.context().settings().watchdog_tick) else {
            break;
        };

        tokio::select! {
            _ = tokio::time::sleep(tick) => {
                let Some(engine) = engine.upgrade() else {
                    break;
                };
                check(&engine).await;
            }
            _ = retick.notified() => {
                debug!("Watchdog tick changed");
            }
            _ = token.cancelled() => break,
        }
    }

    info!("Liveness watchdog stopped");
}

async fn check(engine: &Arc<FarmEngine>) {
    if !engine.is_running() {
        // An earlier forced restart failed to come back up
        if engine.stopped_by() == Some(StopReason::Watchdog) {
            if let Err(e) = engine.start().await {
                warn!(error = %e, "Watchdog restart failed");
            }
        }
        return;
    }

    let ctx = engine.context();
    let settings = ctx.settings();
    let silent = ctx.activity.silent_for();
    let threshold = settings.watchdog_threshold();
    if !is_stale(silent, threshold) {
        debug!(silent_secs = silent.as_secs(), "Engine alive");
        return;
    }

    warn!(
        silent_secs = silent.as_secs(),
        threshold_secs = threshold.as_secs(),
        "Engine silent for too long, forcing restart"
    );
    metrics::counter!("farmer_watchdog_restarts_total").increment(1);
    ctx.log
        .record(FarmEvent::WatchdogRestart { silent_for_secs: silent.as_secs() })
        .await;
    engine.stop(StopReason::Watchdog).await;

    tokio::time::sleep(settings.watchdog_restart_delay).await;

    // A user stop or start during the delay takes precedence
    if engine.stopped_by() != Some(StopReason::Watchdog) {
        return;
    }
    if let Err(e) = engine.start().await {
        warn!(error = %e, "Watchdog restart failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_is_strict() {
        let threshold = Duration::from_secs(452);
        assert!(!is_stale(Duration::from_secs(452), threshold));
        assert!(is_stale(Duration::from_millis(452_001), threshold));
        assert!(!is_stale(Duration::ZERO, threshold));
    }
}
