//! Property-based tests over whole server/client runs.
//!
//! # Properties Tested
//!
//! - After the arena stops changing, the client's prediction converges to the state the
//!   server will reach, whatever the link's latency, jitter and loss.
//! - The history stays bounded, ordered and contiguous, and its newest entry is the live
//!   prediction.
//! - The cached authoritative tick never moves backwards, even over a reordering link.
//! - No tick runs more physics steps than the configured cap.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

use crate::common::Harness;
use proptest::prelude::*;
use rebound::prelude::*;
use web_time::Duration;

fn link_strategy() -> impl Strategy<Value = LinkConfig> {
    (0u32..6, 0u32..4, 0.0f64..0.4, any::<bool>(), any::<u64>()).prop_map(
        |(latency, jitter, loss, reorder, seed)| {
            LinkConfig::builder()
                .latency_ticks(latency)
                .jitter_ticks(jitter)
                .loss_rate(loss)
                .allow_reordering(reorder)
                .seed(seed)
                .build()
        },
    )
}

fn policy_strategy() -> impl Strategy<Value = CatchUpPolicy> {
    prop_oneof![
        Just(CatchUpPolicy::RttAware),
        Just(CatchUpPolicy::TickDifference)
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prediction_converges_after_arena_change(
        link in link_strategy(),
        policy in policy_strategy(),
        change_at in 5usize..60,
        half_width in 3.0f32..9.5,
        half_height in 3.0f32..9.5,
    ) {
        let latency = link.latency_ticks;
        let settle = 80 + 4 * (link.latency_ticks + link.jitter_ticks) as usize;
        let config = EntityConfig { catch_up: policy, ..EntityConfig::default() };
        let mut harness = Harness::new(link, config).unwrap();
        harness.set_rtt_for_latency(latency);

        harness.run(change_at).unwrap();
        harness.set_bounds(Bounds::new(half_width, half_height));
        harness.run(settle).unwrap();

        prop_assert_eq!(harness.client_prediction(), harness.shadow_prediction());
    }

    #[test]
    fn history_stays_ordered_and_anchored(
        link in link_strategy(),
        capacity in 1usize..48,
        ticks in 1usize..150,
    ) {
        let latency = link.latency_ticks;
        let config = EntityConfig {
            history_capacity: capacity,
            max_catch_up_steps: capacity as u32,
            ..EntityConfig::default()
        };
        let mut harness = Harness::new(link, config).unwrap();
        harness.set_rtt_for_latency(latency);

        let mut cached = Tick::new(0);
        for _ in 0..ticks {
            harness.step().unwrap();
            let client = harness.client.lock();
            let history = client.history().unwrap();

            prop_assert!(history.len() <= capacity);
            let entries: Vec<TickState> = history.iter().copied().collect();
            for pair in entries.windows(2) {
                prop_assert_eq!(pair[1].tick, pair[0].tick + 1);
            }
            if let Some(newest) = history.newest() {
                prop_assert_eq!(Some(newest), client.local_prediction());
            }

            prop_assert!(client.authoritative().tick >= cached);
            cached = client.authoritative().tick;
        }
    }

    #[test]
    fn no_tick_exceeds_the_step_cap(
        rtt_ms in 0u64..20_000,
        cap in 1u32..=256,
        policy in policy_strategy(),
        clock_jump in 0i32..500,
    ) {
        let config = EntityConfig {
            catch_up: policy,
            max_catch_up_steps: cap,
            ..EntityConfig::default()
        };
        let mut harness = Harness::new(LinkConfig::passthrough(), config).unwrap();
        harness.set_rtt(Duration::from_millis(rtt_ms));

        for tick in 0..20 {
            if tick == 10 {
                let jumped = harness.clock.local_tick() + clock_jump;
                harness.clock.set_tick(jumped);
            }
            let before = harness.client_stats().steps;
            harness.step().unwrap();
            prop_assert!(harness.client_stats().steps - before <= u64::from(cap));
        }
    }
}
