// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Unit Agent pipeline scenarios driven through the engine against an
//! in-memory world. Time is paused so attack intervals, step deadlines and
//! cycle delays run on virtual time.

mod common;

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use common::*;
use farmer_core::application::{Collaborators, FarmEngine};
use farmer_core::domain::events::{FarmEvent, StopReason};
use farmer_core::domain::order::{Loadout, OutgoingOrder, TargetStatus};
use farmer_core::domain::outcome::{FarmerStatus, StepOutcome};
use farmer_core::domain::village::{PlayerId, Position, Target, VillageId};
use farmer_core::domain::world::{TargetDirectory, WorldError};
use farmer_core::infrastructure::memory_world::InMemoryWorld;
use farmer_core::infrastructure::repositories::InMemoryStore;

const WAIT: Duration = Duration::from_secs(60);

fn settled(outcome: StepOutcome) -> FarmerStatus {
    FarmerStatus::Settled(outcome)
}

#[tokio::test(start_paused = true)]
async fn test_full_command_slots_stop_farmer() {
    let mut home = unit(1, 500, 500, 100);
    home.outgoing = (0..50)
        .map(|_| OutgoingOrder {
            target_id: VillageId(999),
            arrival: Utc::now() + chrono::Duration::hours(1),
            returning: false,
        })
        .collect();
    let world = world(vec![home], vec![target(10, 501, 500, 300)]);
    let engine = engine(&world, settings()).await;

    engine.start().await.unwrap();

    assert!(
        wait_until(WAIT, || {
            engine
                .agent(VillageId(1))
                .is_some_and(|a| a.status == settled(StepOutcome::CommandLimit))
        })
        .await
    );
    let agent = engine.agent(VillageId(1)).unwrap();
    assert!(!agent.running);
    assert_eq!(agent.cursor, 1);
    assert!(world.dispatched().is_empty());
    assert_eq!(
        count_events(&engine, |e| matches!(
            e,
            FarmEvent::FarmerStopped { outcome: StepOutcome::CommandLimit, .. }
        )),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_points_out_of_range_drops_target_and_moves_on() {
    let world = world(
        vec![unit(1, 500, 500, 100)],
        vec![target(10, 501, 500, 500), target(11, 502, 500, 500)],
    );
    let engine = engine(&world, settings()).await;
    world.set_target_points(VillageId(10), 50_000);

    engine.start().await.unwrap();

    assert!(wait_until(WAIT, || world.dispatched().len() == 1).await);
    assert_eq!(world.dispatched()[0].target_id, VillageId(11));

    assert!(
        wait_until(WAIT, || {
            engine
                .agent(VillageId(1))
                .is_some_and(|a| a.status == settled(StepOutcome::TargetCycleEnd))
        })
        .await
    );
    let agent = engine.agent(VillageId(1)).unwrap();
    assert_eq!(agent.targets, vec![VillageId(11)]);
    assert_eq!(agent.cursor, 0);
}

#[tokio::test(start_paused = true)]
async fn test_single_attack_policy_makes_second_farmer_back_off() {
    let world = world(
        vec![unit(1, 500, 500, 100), unit(2, 502, 500, 100)],
        vec![target(10, 501, 500, 300)],
    );
    let engine = engine(&world, settings()).await;

    engine.start().await.unwrap();

    assert!(wait_until(WAIT, || engine.next_cycle_deadline().is_some()).await);
    let dispatched = world.dispatched();
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].unit_id, VillageId(1));
    assert_eq!(
        count_events(&engine, |e| matches!(e, FarmEvent::AttackSent { unit, .. } if *unit == VillageId(2))),
        0
    );
}

#[tokio::test(start_paused = true)]
async fn test_multiple_farmers_allowed_when_single_attack_is_off() {
    let world = world(
        vec![unit(1, 500, 500, 100), unit(2, 500, 520, 100)],
        vec![target(10, 500, 510, 300)],
    );
    let mut settings = settings();
    settings.single_attack = false;
    settings.min_reattack_interval = Duration::ZERO;
    let engine = engine(&world, settings).await;

    engine.start().await.unwrap();

    assert!(wait_until(WAIT, || world.dispatched().len() == 2).await);
    let units: Vec<VillageId> = world.dispatched().iter().map(|o| o.unit_id).collect();
    assert_eq!(units, vec![VillageId(1), VillageId(2)]);
}

#[tokio::test(start_paused = true)]
async fn test_reattack_window_blocks_clumped_arrivals() {
    // Equal distances give equal arrivals, well within the window
    let world = world(
        vec![unit(1, 500, 500, 100), unit(2, 500, 520, 100)],
        vec![target(10, 500, 510, 300)],
    );
    let mut settings = settings();
    settings.single_attack = false;
    settings.min_reattack_interval = Duration::from_secs(600);
    let engine = engine(&world, settings).await;

    engine.start().await.unwrap();

    assert!(wait_until(WAIT, || engine.next_cycle_deadline().is_some()).await);
    assert_eq!(world.dispatched().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_user_stop_during_attack_interval_dispatches_nothing() {
    let world = world(
        vec![unit(1, 500, 500, 100)],
        vec![target(10, 501, 500, 300), target(11, 502, 500, 300)],
    );
    let mut settings = settings();
    settings.attack_interval = Duration::from_secs(60);
    let engine = engine(&world, settings).await;

    engine.start().await.unwrap();
    assert!(wait_until(WAIT, || world.dispatched().len() == 1).await);

    engine.stop(StopReason::User).await;
    tokio::time::sleep(Duration::from_secs(600)).await;

    assert_eq!(world.dispatched().len(), 1);
    assert!(!engine.is_running());
    let agent = engine.agent(VillageId(1)).unwrap();
    assert!(!agent.running);
    assert_eq!(agent.status, settled(StepOutcome::UserStop));
    assert_eq!(
        count_events(&engine, |e| matches!(e, FarmEvent::EngineStopped { reason: StopReason::User })),
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_expired_step_retries_same_target() {
    let world = world(vec![unit(1, 500, 500, 100)], vec![target(10, 501, 500, 300)]);
    let engine = engine(&world, settings()).await;
    world.set_stalled(true);

    engine.start().await.unwrap();
    tokio::time::sleep(Duration::from_secs(100)).await;

    let agent = engine.agent(VillageId(1)).unwrap();
    assert!(agent.running);
    assert_eq!(agent.status, settled(StepOutcome::ExpiredStep));
    assert_eq!(agent.cursor, 0);
    assert!(world.dispatched().is_empty());

    world.set_stalled(false);
    assert!(wait_until(WAIT, || world.dispatched().len() == 1).await);
    assert_eq!(world.dispatched()[0].target_id, VillageId(10));
}

#[tokio::test(start_paused = true)]
async fn test_protected_and_conquered_targets_are_skipped() {
    let world = world(
        vec![unit(1, 500, 500, 100)],
        vec![target(10, 501, 500, 300), target(11, 502, 500, 300), target(12, 503, 500, 300)],
    );
    let engine = engine(&world, settings()).await;
    engine.start().await.unwrap();

    // Target lists are loaded by now; the first step has not run yet
    world.set_protected(VillageId(10), true);
    world.set_target_owner(VillageId(11), Some(PlayerId(77)));

    assert!(wait_until(WAIT, || engine.next_cycle_deadline().is_some()).await);
    let targets: Vec<VillageId> = world.dispatched().iter().map(|o| o.target_id).collect();
    assert_eq!(targets, vec![VillageId(12)]);
}

#[tokio::test(start_paused = true)]
async fn test_missing_forces_stop_farmer_with_no_units() {
    let world = world(vec![unit(1, 500, 500, 4)], vec![target(10, 501, 500, 300)]);
    let engine = engine(&world, settings()).await;

    engine.start().await.unwrap();

    assert!(
        wait_until(WAIT, || {
            engine
                .agent(VillageId(1))
                .is_some_and(|a| a.status == settled(StepOutcome::NoUnits))
        })
        .await
    );
    assert!(world.dispatched().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_rejected_dispatch_stops_unit_but_not_engine() {
    let world = world(
        vec![unit(1, 500, 500, 100), unit(2, 502, 500, 100)],
        vec![target(10, 501, 500, 300), target(11, 503, 500, 300)],
    );
    let engine = engine(&world, settings()).await;
    world.reject_dispatches(Some("captcha".to_string()));

    engine.start().await.unwrap();

    assert!(wait_until(WAIT, || engine.next_cycle_deadline().is_some()).await);
    assert!(engine.is_running());
    for id in [1, 2] {
        let agent = engine.agent(VillageId(id)).unwrap();
        assert_eq!(agent.status, settled(StepOutcome::CommandRejected("captcha".to_string())));
    }
}

#[tokio::test(start_paused = true)]
async fn test_full_storage_stops_farmer_and_passes_control() {
    let world = world(
        vec![unit(1, 500, 500, 100), unit(2, 600, 600, 100)],
        vec![target(10, 501, 500, 300), target(20, 601, 600, 300)],
    );
    let engine = engine(&world, settings()).await;
    world.set_storage_full(VillageId(1), true);

    engine.start().await.unwrap();

    assert!(wait_until(WAIT, || engine.next_cycle_deadline().is_some()).await);
    let agent = engine.agent(VillageId(1)).unwrap();
    assert!(!agent.running);
    assert_eq!(agent.status, settled(StepOutcome::FullStorage));
    let dispatched = world.dispatched();
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].unit_id, VillageId(2));
    assert_eq!(dispatched[0].target_id, VillageId(20));
}

#[tokio::test(start_paused = true)]
async fn test_full_storage_ignored_when_policy_is_off() {
    let world = world(vec![unit(1, 500, 500, 100)], vec![target(10, 501, 500, 300)]);
    let mut settings = settings();
    settings.ignore_full_storage = false;
    let engine = engine(&world, settings).await;
    world.set_storage_full(VillageId(1), true);

    engine.start().await.unwrap();

    assert!(wait_until(WAIT, || world.dispatched().len() == 1).await);
}

#[tokio::test(start_paused = true)]
async fn test_distant_target_over_travel_limit_is_skipped_but_kept() {
    // 60s per field: target 10 is one minute away, target 11 three minutes
    let world = world(
        vec![unit(1, 500, 500, 100)],
        vec![target(10, 501, 500, 300), target(11, 503, 500, 300)],
    );
    let mut settings = settings();
    settings.max_travel_time = Duration::from_secs(120);
    let engine = engine(&world, settings).await;

    engine.start().await.unwrap();

    assert!(wait_until(WAIT, || engine.next_cycle_deadline().is_some()).await);
    let targets: Vec<VillageId> = world.dispatched().iter().map(|o| o.target_id).collect();
    assert_eq!(targets, vec![VillageId(10)]);
    let agent = engine.agent(VillageId(1)).unwrap();
    assert_eq!(agent.targets, vec![VillageId(10), VillageId(11)]);
    assert_eq!(agent.status, settled(StepOutcome::TargetCycleEnd));
}

#[tokio::test(start_paused = true)]
async fn test_unrepresentable_travel_time_skips_target_without_crashing() {
    let crawler = Loadout { seconds_per_field: 1e300, ..light_loadout() };
    let world = world_with_loadouts(
        vec![unit(1, 100, 100, 100), unit(2, 500, 500, 100)],
        vec![target(10, 101, 100, 300), target(20, 501, 500, 300)],
        vec![crawler],
    );
    let engine = engine(&world, settings()).await;

    engine.start().await.unwrap();

    assert!(wait_until(WAIT, || engine.next_cycle_deadline().is_some()).await);
    assert!(engine.is_running());
    assert!(world.dispatched().is_empty());
    for id in [1, 2] {
        let agent = engine.agent(VillageId(id)).unwrap();
        assert!(!agent.running);
        assert_eq!(agent.status, settled(StepOutcome::TargetCycleEnd));
    }
}

#[tokio::test(start_paused = true)]
async fn test_remote_orders_make_target_busy_while_roster_loads() {
    // Unit 2's cached orders are hidden until it loads; only the command API sees them
    let mut pending = unit(2, 500, 520, 100);
    pending.loaded = false;
    pending.outgoing = vec![OutgoingOrder {
        target_id: VillageId(10),
        arrival: Utc::now() + chrono::Duration::hours(1),
        returning: false,
    }];
    let world = world(vec![unit(1, 500, 500, 100), pending], vec![target(10, 500, 510, 300)]);
    let engine = engine(&world, settings()).await;

    engine.start().await.unwrap();

    assert!(wait_until(WAIT, || engine.next_cycle_deadline().is_some()).await);
    assert!(world.dispatched().is_empty());
    assert_eq!(
        engine.agent(VillageId(1)).unwrap().status,
        settled(StepOutcome::TargetCycleEnd)
    );
    assert!(!engine.agent(VillageId(2)).unwrap().running);
}

#[tokio::test(start_paused = true)]
async fn test_own_attack_blocks_target_when_multiple_farmers_off() {
    let mut home = unit(1, 500, 500, 100);
    home.outgoing = vec![OutgoingOrder {
        target_id: VillageId(10),
        arrival: Utc::now() + chrono::Duration::hours(1),
        returning: false,
    }];
    let world = world(vec![home], vec![target(10, 501, 500, 300)]);
    let mut settings = settings();
    settings.single_attack = false;
    settings.multiple_farmers = false;
    let engine = engine(&world, settings).await;

    engine.start().await.unwrap();

    assert!(wait_until(WAIT, || engine.next_cycle_deadline().is_some()).await);
    assert!(world.dispatched().is_empty());
}

/// Directory whose status lookup crashes for one target.
struct CrashingDirectory {
    world: Arc<InMemoryWorld>,
    crash_on: VillageId,
}

#[async_trait]
impl TargetDirectory for CrashingDirectory {
    async fn load_targets(&self, origin: Position) -> Result<Vec<Target>, WorldError> {
        self.world.load_targets(origin).await
    }

    async fn target_status(&self, id: VillageId) -> Result<TargetStatus, WorldError> {
        if id == self.crash_on {
            panic!("status lookup crashed for {}", id);
        }
        self.world.target_status(id).await
    }
}

#[tokio::test(start_paused = true)]
async fn test_crashed_farmer_settles_and_cycle_continues() {
    let world = world(
        vec![unit(1, 500, 500, 100), unit(2, 600, 600, 100)],
        vec![target(10, 501, 500, 300), target(20, 601, 600, 300)],
    );
    let collaborators = Collaborators {
        directory: Arc::new(CrashingDirectory { world: world.clone(), crash_on: VillageId(10) }),
        ..Collaborators::from_world(world.clone())
    };
    let engine = FarmEngine::init(collaborators, Arc::new(InMemoryStore::new()), settings())
        .await
        .unwrap();

    engine.start().await.unwrap();

    assert!(wait_until(WAIT, || engine.next_cycle_deadline().is_some()).await);
    assert!(engine.is_running());
    let agent = engine.agent(VillageId(1)).unwrap();
    assert!(!agent.running);
    assert!(matches!(
        &agent.status,
        FarmerStatus::Settled(StepOutcome::Unknown(reason)) if reason.starts_with("farmer task failed")
    ));
    assert_eq!(
        count_events(&engine, |e| matches!(
            e,
            FarmEvent::FarmerStopped { unit, outcome: StepOutcome::Unknown(_) } if *unit == VillageId(1)
        )),
        1
    );
    let dispatched = world.dispatched();
    assert_eq!(dispatched.len(), 1);
    assert_eq!(dispatched[0].target_id, VillageId(20));
}
