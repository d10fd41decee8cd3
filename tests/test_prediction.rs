//! Owning-client prediction driven end to end through a server and a delayed link.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp
)]

mod common;

use std::sync::Arc;

use common::{Harness, ARENA, DT, TICK_RATE};
use parking_lot::Mutex;
use rebound::prelude::*;
use rebound::telemetry::ViolationKind;
use web_time::Duration;

#[test]
fn lossless_prediction_is_always_confirmed() -> ReboundResult<()> {
    let mut harness = Harness::new(LinkConfig::high_latency(3), EntityConfig::default())?;
    harness.set_rtt_for_latency(3);
    harness.run(120)?;

    let stats = harness.client_stats();
    assert_eq!(stats.reconcile.corrections, 0);
    assert!(stats.reconcile.confirmations > 100);
    assert_eq!(stats.hard_catch_ups, 1, "only the first tick re-seeds");
    assert_eq!(harness.client_prediction(), harness.shadow_prediction());
    rebound::assert_no_violations!(harness.observer);
    Ok(())
}

#[test]
fn rtt_aware_client_leads_by_server_lag() -> ReboundResult<()> {
    let latency = 3;
    let mut harness = Harness::new(LinkConfig::high_latency(latency), EntityConfig::default())?;
    harness.set_rtt_for_latency(latency);

    for _ in 0..60 {
        harness.step()?;
        assert_eq!(harness.lead(), 2 * latency as i32 - 1);
    }
    Ok(())
}

#[test]
fn zero_rtt_client_stays_level_with_server() -> ReboundResult<()> {
    let mut harness = Harness::new(LinkConfig::passthrough(), EntityConfig::default())?;
    for _ in 0..30 {
        let rendered = harness.step()?;
        assert_eq!(harness.lead(), 0);
        assert_eq!(rendered, harness.server.current_state());
    }
    assert_eq!(harness.client_stats().hard_catch_ups, 0);
    Ok(())
}

#[test]
fn clamped_catch_up_reaches_steady_state() -> ReboundResult<()> {
    let config = EntityConfig {
        history_capacity: 512,
        ..EntityConfig::default()
    };
    let mut harness = Harness::new(LinkConfig::passthrough(), config)?;
    // five seconds at 60Hz: 300 ticks of lag against the default cap of 240
    harness.set_rtt(Duration::from_secs(5));
    let cap = harness.client.lock().config().max_catch_up_steps;
    assert_eq!(cap, 240);

    harness.step()?;
    assert_eq!(harness.lead(), 240);
    harness.step()?;
    assert_eq!(harness.lead(), 300);

    for _ in 0..30 {
        let before = harness.client_stats().steps;
        harness.step()?;
        assert_eq!(harness.client_stats().steps - before, 1);
        assert_eq!(harness.lead(), 300);
    }

    let stats = harness.client_stats();
    assert_eq!(stats.hard_catch_ups, 1);
    assert_eq!(stats.clamped_catch_ups, 1);
    assert_eq!(stats.reconcile.corrections, 0);
    assert_eq!(harness.client_prediction(), harness.shadow_prediction());
    rebound::assert_violation!(harness.observer, ViolationKind::CatchUp);
    Ok(())
}

#[test]
fn smaller_cap_bounds_each_tick() -> ReboundResult<()> {
    let config = EntityConfig {
        max_catch_up_steps: 5,
        ..EntityConfig::default()
    };
    let mut harness = Harness::new(LinkConfig::high_latency(10), config)?;
    harness.set_rtt_for_latency(10);

    let before = harness.client_stats().steps;
    harness.step()?;
    assert_eq!(harness.client_stats().steps - before, 5);
    assert_eq!(harness.client_prediction().tick, Tick::new(5));
    Ok(())
}

#[test]
fn tick_difference_policy_tracks_the_clock() -> ReboundResult<()> {
    let mut harness = Harness::new(LinkConfig::high_latency(2), EntityConfig::tick_difference())?;
    harness.run(20)?;
    assert_eq!(harness.client_prediction().tick, harness.clock.local_tick());

    // The host's clock jumps ahead; the next tick closes the whole gap.
    let jumped = harness.clock.local_tick() + 10;
    harness.clock.set_tick(jumped);
    let before = harness.client_stats().steps;
    harness.step()?;
    assert_eq!(harness.client_stats().steps - before, 11);
    assert_eq!(harness.client_prediction().tick, harness.clock.local_tick());
    assert_eq!(harness.client_stats().hard_catch_ups, 0);
    Ok(())
}

fn history_entries(harness: &Harness) -> Vec<TickState> {
    harness
        .client
        .lock()
        .history()
        .unwrap()
        .iter()
        .copied()
        .collect()
}

#[test]
fn suspend_is_a_no_op_for_every_role() -> ReboundResult<()> {
    let mut harness = Harness::new(LinkConfig::passthrough(), EntityConfig::default())?;
    harness.set_rtt_for_latency(2);
    harness.run(15)?;

    let server_before = *harness.server.authoritative();
    let client_before = harness.client_prediction();
    let history_before = history_entries(&harness);
    assert!(!history_before.is_empty());
    let client_stats_before = harness.client_stats();

    harness.set_suspended(true);
    for _ in 0..5 {
        let rendered = harness.step()?;
        assert_eq!(rendered, client_before.state());
    }

    assert_eq!(*harness.server.authoritative(), server_before);
    assert_eq!(harness.client_prediction(), client_before);
    assert_eq!(history_entries(&harness), history_before);
    assert_eq!(harness.server.stats().suspended_ticks, 5);

    let client_stats = harness.client_stats();
    assert_eq!(client_stats.suspended_ticks, 5);
    assert_eq!(client_stats.steps, client_stats_before.steps);
    assert_eq!(client_stats.reconcile, client_stats_before.reconcile);

    harness.set_suspended(false);
    harness.step()?;
    assert_eq!(harness.server.authoritative().tick, server_before.tick + 1);
    Ok(())
}

#[test]
fn tick_difference_lead_survives_suspension() -> ReboundResult<()> {
    let mut harness = Harness::new(LinkConfig::high_latency(2), EntityConfig::tick_difference())?;
    harness.run(20)?;
    let lead = harness.lead();

    for _ in 0..3 {
        harness.set_suspended(true);
        harness.run(30)?;
        harness.set_suspended(false);
        harness.run(10)?;
        assert_eq!(harness.lead(), lead);
    }
    assert_eq!(harness.client_stats().reconcile.corrections, 0);
    assert_eq!(harness.client_prediction(), harness.shadow_prediction());
    Ok(())
}

#[test]
fn remote_client_renders_and_interpolates_the_server() -> ReboundResult<()> {
    let clock = ManualClock::new(TICK_RATE);
    let arena = StaticArena::new(ARENA);
    let mut server = EntityBuilder::new().spawn_authoritative(
        Vec2::new(1.0, 1.0),
        Vec2::new(30.0, -12.0),
        Tick::new(0),
    )?;
    let remote = Arc::new(Mutex::new(
        EntityBuilder::new().spawn_remote_client(*server.authoritative())?,
    ));
    server.subscribe(remote.clone())?;

    let mut previous = server.current_position();
    for _ in 0..40 {
        server.advance(&clock, &arena, DT)?;
        let mut remote = remote.lock();
        let rendered = remote.advance(&clock, &arena, DT)?;
        assert_eq!(rendered, server.current_state());
        assert_eq!(remote.interpolated_position(0.0), previous);
        assert_eq!(remote.interpolated_position(1.0), server.current_position());
        assert!(remote.history().is_none());
        previous = server.current_position();
    }
    Ok(())
}

#[test]
fn rendered_state_matches_entity_accessors() -> ReboundResult<()> {
    let mut harness = Harness::new(LinkConfig::high_latency(2), EntityConfig::default())?;
    harness.set_rtt_for_latency(2);
    for _ in 0..25 {
        let rendered = harness.step()?;
        let client = harness.client.lock();
        assert_eq!(rendered.position, client.current_position());
        assert_eq!(rendered.velocity, client.current_velocity());
        assert_eq!(
            client.history().unwrap().newest().map(|s| s.state()),
            Some(rendered)
        );
    }
    Ok(())
}
