//! Determinism of full server/client runs.
//!
//! The physics step is pure and the link draws from a seeded generator, so two runs built
//! from the same configuration must agree bit for bit, including every correction.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use crate::common::Harness;
use rebound::prelude::*;
use rebound::{EntityStats, LinkStats};

/// Everything observable about one run.
#[derive(Debug, PartialEq)]
struct Trace {
    rendered: Vec<[u32; 4]>,
    server: TickState,
    client: EntityStats,
    link: LinkStats,
}

fn bits(state: EntityState) -> [u32; 4] {
    [
        state.position.x.to_bits(),
        state.position.y.to_bits(),
        state.velocity.x.to_bits(),
        state.velocity.y.to_bits(),
    ]
}

fn run(link: LinkConfig, config: EntityConfig) -> Trace {
    let mut harness = Harness::new(link, config).unwrap();
    harness.set_rtt_for_latency(link_latency(&harness));

    let mut rendered = Vec::new();
    for tick in 0..240 {
        if tick == 80 {
            harness.set_bounds(Bounds::new(6.0, 4.0));
        }
        if tick == 160 {
            harness.set_bounds(Bounds::new(9.0, 9.0));
        }
        rendered.push(bits(harness.step().unwrap()));
    }

    Trace {
        rendered,
        server: *harness.server.authoritative(),
        client: harness.client_stats(),
        link: harness.link_stats(),
    }
}

fn link_latency(harness: &Harness) -> u32 {
    harness.link.config().latency_ticks
}

#[test]
fn identical_runs_are_bit_identical() {
    let link = LinkConfig::builder()
        .latency_ticks(6)
        .jitter_ticks(3)
        .loss_rate(0.1)
        .burst_loss(0.02, 4)
        .seed(1234)
        .build();

    let first = run(link.clone(), EntityConfig::default());
    let second = run(link, EntityConfig::default());
    assert_eq!(first, second);
    assert!(first.client.reconcile.corrections > 0);
}

#[test]
fn identical_runs_agree_under_reordering() {
    let link = LinkConfig::builder()
        .latency_ticks(5)
        .jitter_ticks(4)
        .allow_reordering(true)
        .seed(77)
        .build();

    let first = run(link.clone(), EntityConfig::tick_difference());
    let second = run(link, EntityConfig::tick_difference());
    assert_eq!(first, second);
}

#[test]
fn every_preset_is_reproducible() {
    for link in [
        LinkConfig::passthrough(),
        LinkConfig::poor_network(),
        LinkConfig::terrible_network(),
    ] {
        for config in [EntityConfig::default(), EntityConfig::lan(), EntityConfig::high_latency()] {
            assert_eq!(run(link.clone(), config), run(link.clone(), config));
        }
    }
}

#[test]
fn server_trajectory_does_not_depend_on_the_link() {
    let calm = run(LinkConfig::passthrough(), EntityConfig::default());
    let rough = run(LinkConfig::terrible_network(), EntityConfig::default());
    assert_eq!(calm.server, rough.server);
}
