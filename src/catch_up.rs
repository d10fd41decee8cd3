//! Decides how many physics steps an owning client runs on a given tick, and from which
//! baseline.
//!
//! Two policies are available:
//!
//! - [`CatchUpPolicy::RttAware`] (default) converts the server round-trip time into a tick
//!   lag. When the authoritative value plus that lag is more than one tick ahead of the
//!   local prediction, the client performs a *hard catch-up*: it re-seeds from the
//!   authoritative value and simulates `lag` steps. Otherwise it takes exactly one step
//!   from its own last state.
//! - [`CatchUpPolicy::TickDifference`] ignores RTT and runs one step for every clock tick
//!   that passed since the client last ticked. It recovers slower after latency spikes.
//!
//! A hard catch-up longer than the step cap is not abandoned. The plan runs the cap and
//! defers the rest, and the following ticks pay the deferred steps from the local state
//! before the lag is looked at again.

use web_time::Duration;

use crate::Tick;

/// Upper bound on steps in one tick unless configured otherwise.
pub const DEFAULT_MAX_CATCH_UP_STEPS: u32 = 240;

/// Which catch-up algorithm an owning client uses.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum CatchUpPolicy {
    /// Hard catch-up from the authoritative value when the RTT-derived lag exceeds the
    /// local lead, single steps otherwise.
    #[default]
    RttAware,
    /// Step from the local state until it matches the clock's local tick.
    TickDifference,
}

/// Where the steps of a [`CatchUpPlan`] start from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Baseline {
    /// Continue from the client's own last prediction.
    Local,
    /// Discard the prediction and history, and start from the authoritative value.
    Authoritative,
}

/// Everything a policy looks at.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CatchUpInput {
    /// Tick of the client's last prediction.
    pub local_tick: Tick,
    /// Tick of the latest authoritative value the client has seen.
    pub authoritative_tick: Tick,
    /// The clock's current local tick.
    pub clock_tick: Tick,
    /// The clock tick of the client's previous call, suspended calls included.
    pub last_clock_tick: Tick,
    /// Steps a clamped hard catch-up left for later ticks.
    pub deferred_steps: u32,
    /// Recent round-trip time to the server.
    pub rtt: Duration,
    /// Fixed simulation rate, in ticks per second.
    pub tick_rate: u32,
}

/// The outcome of [`CatchUpPolicy::plan`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CatchUpPlan {
    /// Starting point for the steps.
    pub baseline: Baseline,
    /// Number of physics steps to run, after clamping.
    pub steps: u32,
    /// Steps the policy wanted before clamping.
    pub requested: u32,
    /// Clamped steps to run on later ticks. Always zero for `TickDifference`, whose next
    /// clock difference already includes them.
    pub deferred: u32,
}

impl CatchUpPlan {
    /// Returns `true` if the step cap cut the plan short.
    #[must_use]
    pub const fn is_clamped(&self) -> bool {
        self.requested > self.steps
    }

    /// Returns `true` for a hard catch-up.
    #[must_use]
    pub const fn reseeds(&self) -> bool {
        matches!(self.baseline, Baseline::Authoritative)
    }
}

/// Converts a round-trip time into whole ticks at `tick_rate`, rounding down.
///
/// Computed on integer microseconds, so the result is the exact floor of
/// `rtt_seconds * tick_rate` with no float rounding at tick boundaries.
///
/// ```
/// use rebound::__internal::server_lag;
/// use web_time::Duration;
///
/// assert_eq!(server_lag(Duration::ZERO, 60), 0);
/// assert_eq!(server_lag(Duration::from_millis(100), 60), 6);
/// assert_eq!(server_lag(Duration::from_millis(49), 20), 0);
/// assert_eq!(server_lag(Duration::from_millis(50), 20), 1);
/// ```
#[must_use]
pub fn server_lag(rtt: Duration, tick_rate: u32) -> u32 {
    let ticks = rtt.as_micros() * u128::from(tick_rate) / 1_000_000;
    u32::try_from(ticks).unwrap_or(u32::MAX)
}

impl CatchUpPolicy {
    /// Plans this tick's steps, capping them at `max_steps`.
    ///
    /// ```
    /// use rebound::{Baseline, CatchUpInput, CatchUpPolicy, Tick};
    /// use web_time::Duration;
    ///
    /// let input = CatchUpInput {
    ///     local_tick: Tick::new(10),
    ///     authoritative_tick: Tick::new(8),
    ///     clock_tick: Tick::new(11),
    ///     last_clock_tick: Tick::new(10),
    ///     deferred_steps: 0,
    ///     rtt: Duration::from_millis(100),
    ///     tick_rate: 60,
    /// };
    ///
    /// // 8 + 6 > 10 + 1: fallen behind, re-seed and run six steps
    /// let plan = CatchUpPolicy::RttAware.plan(&input, 240);
    /// assert_eq!(plan.baseline, Baseline::Authoritative);
    /// assert_eq!(plan.steps, 6);
    ///
    /// // capped at four, the other two run next tick
    /// let plan = CatchUpPolicy::RttAware.plan(&input, 4);
    /// assert_eq!((plan.steps, plan.deferred), (4, 2));
    ///
    /// let plan = CatchUpPolicy::TickDifference.plan(&input, 240);
    /// assert_eq!(plan.baseline, Baseline::Local);
    /// assert_eq!(plan.steps, 1);
    /// ```
    #[must_use]
    pub fn plan(self, input: &CatchUpInput, max_steps: u32) -> CatchUpPlan {
        match self {
            Self::RttAware => {
                let (baseline, requested) = if input.deferred_steps > 0 {
                    (Baseline::Local, input.deferred_steps.saturating_add(1))
                } else {
                    let lag = server_lag(input.rtt, input.tick_rate);
                    let lagged = i64::from(input.authoritative_tick.as_i32()) + i64::from(lag);
                    let lead = i64::from(input.local_tick.as_i32()) + 1;
                    if lagged > lead {
                        (Baseline::Authoritative, lag)
                    } else {
                        (Baseline::Local, 1)
                    }
                };
                let steps = requested.min(max_steps);
                CatchUpPlan {
                    baseline,
                    steps,
                    requested,
                    deferred: requested - steps,
                }
            },
            Self::TickDifference => {
                let behind = input
                    .clock_tick
                    .as_i32()
                    .saturating_sub(input.last_clock_tick.as_i32());
                let requested = u32::try_from(behind.max(0)).unwrap_or(0);
                CatchUpPlan {
                    baseline: Baseline::Local,
                    steps: requested.min(max_steps),
                    requested,
                    deferred: 0,
                }
            },
        }
    }

    /// Returns a string representation suitable for logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RttAware => "rtt_aware",
            Self::TickDifference => "tick_difference",
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::test_config::miri_case_count;
    use proptest::prelude::*;

    fn input(local: i32, auth: i32, clock: i32, rtt_ms: u64) -> CatchUpInput {
        CatchUpInput {
            local_tick: Tick::new(local),
            authoritative_tick: Tick::new(auth),
            clock_tick: Tick::new(clock),
            last_clock_tick: Tick::new(local),
            deferred_steps: 0,
            rtt: Duration::from_millis(rtt_ms),
            tick_rate: 60,
        }
    }

    #[test]
    fn zero_rtt_steps_once_in_steady_state() {
        let plan = CatchUpPolicy::RttAware.plan(&input(20, 20, 21, 0), 240);
        assert_eq!(plan.baseline, Baseline::Local);
        assert_eq!(plan.steps, 1);
        assert!(!plan.reseeds());
    }

    #[test]
    fn lag_equal_to_lead_plus_one_does_not_reseed() {
        // 100ms at 60Hz is 6 ticks; 14 + 6 == 19 + 1
        let plan = CatchUpPolicy::RttAware.plan(&input(19, 14, 20, 100), 240);
        assert_eq!(plan.baseline, Baseline::Local);
        assert_eq!(plan.steps, 1);
    }

    #[test]
    fn large_rtt_triggers_hard_catch_up_of_exactly_lag_steps() {
        // 250ms at 60Hz is 15 ticks
        let plan = CatchUpPolicy::RttAware.plan(&input(10, 10, 11, 250), 240);
        assert_eq!(plan.baseline, Baseline::Authoritative);
        assert_eq!(plan.steps, 15);
        assert_eq!(plan.requested, 15);
    }

    #[test]
    fn zero_rtt_behind_server_reseeds_with_no_steps() {
        let plan = CatchUpPolicy::RttAware.plan(&input(3, 10, 11, 0), 240);
        assert_eq!(plan.baseline, Baseline::Authoritative);
        assert_eq!(plan.steps, 0);
    }

    #[test]
    fn plan_is_clamped_to_max_steps() {
        let plan = CatchUpPolicy::RttAware.plan(&input(0, 0, 1, 10_000), 240);
        assert_eq!(plan.requested, 600);
        assert_eq!(plan.steps, 240);
        assert_eq!(plan.deferred, 360);
        assert!(plan.is_clamped());
    }

    #[test]
    fn deferred_steps_are_paid_locally_before_lag_is_checked() {
        // lag is 600 and the client is far behind, but the previous plan still owes steps
        let owed = CatchUpInput {
            deferred_steps: 360,
            ..input(240, 1, 2, 10_000)
        };
        let plan = CatchUpPolicy::RttAware.plan(&owed, 240);
        assert_eq!(plan.baseline, Baseline::Local);
        assert_eq!(plan.requested, 361);
        assert_eq!(plan.steps, 240);
        assert_eq!(plan.deferred, 121);

        let last = CatchUpPolicy::RttAware.plan(
            &CatchUpInput {
                deferred_steps: 121,
                ..owed
            },
            240,
        );
        assert_eq!((last.steps, last.deferred), (122, 0));
        assert!(!last.is_clamped());
    }

    #[test]
    fn tick_difference_counts_clock_ticks_since_last_call() {
        // local tick lags the clock after a suspension; only the newest clock tick is owed
        let resumed = CatchUpInput {
            last_clock_tick: Tick::new(40),
            ..input(10, 8, 41, 0)
        };
        let plan = CatchUpPolicy::TickDifference.plan(&resumed, 240);
        assert_eq!(plan.steps, 1);
        assert_eq!(plan.deferred, 0);

        let clamped = CatchUpPolicy::TickDifference.plan(&input(0, 0, 300, 0), 240);
        assert_eq!((clamped.steps, clamped.deferred), (240, 0));
    }

    #[test]
    fn tick_difference_never_goes_negative() {
        let plan = CatchUpPolicy::TickDifference.plan(&input(30, 0, 25, 500), 240);
        assert_eq!(plan.steps, 0);
        assert_eq!(plan.baseline, Baseline::Local);

        let plan = CatchUpPolicy::TickDifference.plan(&input(30, 0, 34, 0), 240);
        assert_eq!(plan.steps, 4);
    }

    #[test]
    fn server_lag_saturates() {
        assert_eq!(server_lag(Duration::from_secs(u64::MAX), u32::MAX), u32::MAX);
    }

    #[test]
    fn server_lag_floors_at_tick_boundaries() {
        assert_eq!(server_lag(Duration::from_micros(16_666), 60), 0);
        assert_eq!(server_lag(Duration::from_micros(16_667), 60), 1);
        assert_eq!(server_lag(Duration::from_secs(1), 64), 64);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: miri_case_count(),
            ..ProptestConfig::default()
        })]

        #[test]
        fn plan_never_exceeds_cap(
            local in 0i32..10_000, auth in 0i32..10_000, clock in 0i32..10_000,
            rtt_ms in 0u64..20_000, cap in 0u32..500,
        ) {
            for policy in [CatchUpPolicy::RttAware, CatchUpPolicy::TickDifference] {
                let plan = policy.plan(&input(local, auth, clock, rtt_ms), cap);
                prop_assert!(plan.steps <= cap);
                prop_assert!(plan.requested >= plan.steps);
                if policy == CatchUpPolicy::RttAware {
                    prop_assert_eq!(plan.steps + plan.deferred, plan.requested);
                }
            }
        }

        #[test]
        fn rtt_aware_hard_catch_up_runs_server_lag_steps(
            local in 0i32..1_000, auth in 0i32..1_000, rtt_ms in 0u64..2_000,
        ) {
            let i = input(local, auth, local + 1, rtt_ms);
            let plan = CatchUpPolicy::RttAware.plan(&i, u32::MAX);
            let lag = server_lag(i.rtt, i.tick_rate);
            if plan.reseeds() {
                prop_assert_eq!(plan.steps, lag);
            } else {
                prop_assert_eq!(plan.steps, 1);
            }
        }
    }
}
