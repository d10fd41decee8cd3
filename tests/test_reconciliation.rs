//! Reconciliation against authoritative updates under latency, loss and reordering.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp
)]

mod common;

use std::sync::Arc;

use common::{rtt_for_latency, Harness, TICK_RATE};
use parking_lot::Mutex;
use rebound::prelude::*;
use rebound::telemetry::ViolationKind;

#[test]
fn arena_change_is_corrected_and_converges() -> ReboundResult<()> {
    let mut harness = Harness::new(LinkConfig::high_latency(3), EntityConfig::default())?;
    harness.set_rtt_for_latency(3);
    harness.run(30)?;
    assert_eq!(harness.client_stats().reconcile.corrections, 0);

    // Predictions already made for the next few ticks assumed the old arena.
    harness.set_bounds(Bounds::new(5.0, 5.0));
    harness.run(60)?;

    let settled = harness.client_stats().reconcile;
    assert!(settled.corrections > 0);
    assert!(settled.resimulated_steps > 0);
    assert_eq!(harness.client_prediction(), harness.shadow_prediction());

    harness.run(60)?;
    let later = harness.client_stats().reconcile;
    assert_eq!(later.corrections, settled.corrections, "no further corrections once converged");
    assert!(later.confirmations > settled.confirmations);
    assert_eq!(harness.client_prediction(), harness.shadow_prediction());

    let client = harness.client.lock();
    assert_eq!(
        client.history().unwrap().newest(),
        client.local_prediction()
    );
    Ok(())
}

#[test]
fn lossy_link_drops_superseded_predictions() -> ReboundResult<()> {
    let link = LinkConfig::builder()
        .latency_ticks(2)
        .loss_rate(0.3)
        .seed(5)
        .build();
    let mut harness = Harness::new(link, EntityConfig::default())?;
    harness.set_rtt_for_latency(2);
    harness.run(200)?;

    let stats = harness.client_stats();
    assert!(harness.link_stats().dropped > 0);
    assert!(stats.reconcile.stale_dropped > 0);
    assert!(stats.reconcile.confirmations > 0);
    assert_eq!(stats.reconcile.corrections, 0);
    assert_eq!(harness.client_prediction(), harness.shadow_prediction());
    Ok(())
}

#[test]
fn reordered_notifications_are_ignored_as_stale() -> ReboundResult<()> {
    let link = LinkConfig::builder()
        .latency_ticks(4)
        .jitter_ticks(3)
        .allow_reordering(true)
        .seed(9)
        .build();
    let mut harness = Harness::new(link, EntityConfig::default())?;
    harness.set_rtt_for_latency(4);

    let mut newest = harness.client.lock().authoritative().tick;
    for _ in 0..200 {
        harness.step()?;
        let cached = harness.client.lock().authoritative().tick;
        assert!(cached >= newest, "cached authoritative tick moved backwards");
        newest = cached;
    }

    let stats = harness.client_stats();
    assert!(stats.stale_notifications > 0);
    assert_eq!(stats.reconcile.corrections, 0);
    rebound::assert_violation!(harness.observer, ViolationKind::Replication);
    Ok(())
}

#[test]
fn small_history_overflows_with_warnings_but_stays_correct() -> ReboundResult<()> {
    let config = EntityConfig {
        history_capacity: 4,
        max_catch_up_steps: 4,
        ..EntityConfig::default()
    };
    let mut harness = Harness::new(LinkConfig::high_latency(5), config)?;
    harness.set_rtt_for_latency(5);
    harness.run(50)?;

    assert!(harness.client.lock().history().unwrap().len() <= 4);
    assert_eq!(harness.client_stats().reconcile.corrections, 0);
    assert_eq!(harness.client_prediction(), harness.shadow_prediction());
    rebound::assert_violation!(harness.observer, ViolationKind::History);
    Ok(())
}

#[derive(Default)]
struct Recorder(Mutex<Vec<(TickState, TickState)>>);

impl ChangeObserver for Recorder {
    fn on_change(&self, previous: &TickState, current: &TickState) {
        self.0.lock().push((*previous, *current));
    }
}

impl Recorder {
    fn take(&self) -> Vec<(TickState, TickState)> {
        std::mem::take(&mut *self.0.lock())
    }
}

#[test]
fn misprediction_is_replayed_from_the_authoritative_state() -> ReboundResult<()> {
    // Two units per tick, exactly representable.
    let dt = 0.25;
    let server_bounds = Bounds::new(4.0, 4.0);
    let client_bounds = Bounds::new(10.0, 10.0);

    let mut clock = ManualClock::new(TICK_RATE);
    clock.set_rtt(PeerId::new(0), rtt_for_latency(2));

    let mut server = EntityBuilder::new().spawn_authoritative(
        Vec2::new(3.0, 0.0),
        Vec2::new(8.0, 0.0),
        Tick::new(0),
    )?;
    let recorder = Arc::new(Recorder::default());
    server.subscribe(recorder.clone())?;
    let mut client = EntityBuilder::new().spawn_owning_client(*server.authoritative())?;

    clock.advance();
    // Re-seeds and predicts ticks 1..=4 against the wide arena.
    client.tick(&clock, dt, client_bounds, false)?;
    assert_eq!(client.local_prediction().unwrap().tick, Tick::new(4));
    assert_eq!(client.current_position(), Vec2::new(9.5, 0.0));

    // The server's narrow arena bounces the entity on its first step.
    server.tick(&clock, dt, server_bounds, false)?;
    let notifications = recorder.take();
    assert_eq!(notifications.len(), 1);
    let (previous, current) = notifications[0];
    assert_eq!(current.position, Vec2::new(3.5, 0.0));

    let outcome = client.on_authoritative_changed(&previous, &current)?;
    let ReconcileOutcome::Corrected(correction) = outcome else {
        panic!("expected a correction, got {outcome:?}");
    };
    assert_eq!(correction.tick, Tick::new(1));
    assert_eq!(correction.resimulated, 3);
    assert_eq!(correction.before.position, Vec2::new(9.5, 0.0));
    assert_eq!(correction.after.position, Vec2::new(-2.5, 0.0));
    assert_eq!(correction.after.velocity, Vec2::new(-8.0, 0.0));

    let local = *client.local_prediction().unwrap();
    assert_eq!(local.tick, Tick::new(4));
    assert_eq!(local.state(), correction.after);

    let ticks: Vec<i32> = client
        .history()
        .unwrap()
        .iter()
        .map(|s| s.tick.as_i32())
        .collect();
    assert_eq!(ticks, vec![2, 3, 4]);

    // The replayed tick 2 now agrees with the server.
    clock.advance();
    server.tick(&clock, dt, server_bounds, false)?;
    let (previous, current) = recorder.take()[0];
    assert_eq!(
        client.on_authoritative_changed(&previous, &current)?,
        ReconcileOutcome::Confirmed { tick: Tick::new(2) }
    );
    Ok(())
}

#[test]
fn notification_before_prediction_is_no_match() -> ReboundResult<()> {
    let first = TickState::new(Tick::new(0), EntityState::default());
    let mut client = EntityBuilder::new().spawn_owning_client(first)?;
    let ahead = TickState::new(
        Tick::new(7),
        EntityState::new(Vec2::new(1.0, 1.0), Vec2::ZERO),
    );

    assert_eq!(
        client.on_authoritative_changed(&first, &ahead)?,
        ReconcileOutcome::NoMatch
    );
    assert_eq!(client.authoritative(), &ahead);
    assert_eq!(client.local_prediction(), Some(&first));
    Ok(())
}

#[test]
fn server_rejects_notifications() -> ReboundResult<()> {
    let mut server = EntityBuilder::new().spawn_authoritative(Vec2::ZERO, Vec2::ZERO, Tick::new(0))?;
    let state = *server.authoritative();
    assert!(matches!(
        server.on_authoritative_changed(&state, &state),
        Err(ReboundError::InvalidRequest { .. })
    ));
    Ok(())
}
