//! Matches authoritative updates against predicted history and rolls back on divergence.
//!
//! For every authoritative value an owning client receives:
//!
//! 1. history entries older than the authoritative tick are dropped as stale,
//! 2. if the oldest remaining entry has exactly the authoritative tick, it is popped and its
//!    position and velocity are compared with exact equality,
//! 3. on a mismatch every remaining entry is replayed, in order, from the authoritative
//!    state, replacing the history entry-for-entry and moving the live prediction to the
//!    last replayed state.
//!
//! When no entry matches the authoritative tick yet (the client has not simulated that far,
//! or just re-seeded), nothing happens. Disagreement is the expected signal that drives a
//! correction; it is logged at `debug` level and never reported as a violation.

use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::error::ReboundResult;
use crate::history::HistoryLog;
use crate::physics::{step, StepParams};
use crate::state::{EntityState, TickState};
use crate::Tick;

/// What processing one authoritative value did.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// No history entry carried the authoritative tick.
    NoMatch,
    /// The prediction for `tick` was exactly right.
    Confirmed {
        /// The confirmed tick.
        tick: Tick,
    },
    /// The prediction diverged and was rebuilt.
    Corrected(Correction),
}

impl ReconcileOutcome {
    /// Returns `true` if the local prediction was rewritten.
    #[must_use]
    pub const fn is_correction(&self) -> bool {
        matches!(self, Self::Corrected(_))
    }
}

/// Details of a rollback and resimulation.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Correction {
    /// The authoritative tick that disagreed with the prediction.
    pub tick: Tick,
    /// How many history entries were replayed.
    pub resimulated: usize,
    /// The live prediction before the correction.
    pub before: EntityState,
    /// The live prediction after the correction.
    pub after: EntityState,
}

/// Running counters over the lifetime of a [`ReconciliationEngine`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct ReconcileStats {
    /// Authoritative values processed.
    pub updates: u64,
    /// History entries discarded as older than an authoritative tick.
    pub stale_dropped: u64,
    /// Predictions that matched exactly.
    pub confirmations: u64,
    /// Predictions that diverged.
    pub corrections: u64,
    /// Total physics steps replayed across all corrections.
    pub resimulated_steps: u64,
    /// Most steps replayed by one correction.
    pub largest_resimulation: usize,
}

/// Consumes authoritative values for one owning client and keeps its history honest.
#[derive(Debug, Default, Clone)]
pub struct ReconciliationEngine {
    stats: ReconcileStats,
}

impl ReconciliationEngine {
    /// Creates an engine with zeroed statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-only view of the running counters.
    #[must_use]
    pub fn stats(&self) -> &ReconcileStats {
        &self.stats
    }

    /// Processes one authoritative value against `history`, correcting `local` if the
    /// prediction for the same tick diverged. `params` drives any resimulation.
    ///
    /// ```
    /// use rebound::{
    ///     Bounds, EntityState, HistoryLog, ReconcileOutcome, ReconciliationEngine, StepParams,
    ///     Tick, TickState, Vec2,
    /// };
    ///
    /// let params = StepParams::new(1.0, 1.0, Bounds::new(100.0, 100.0));
    /// let mut history = HistoryLog::default();
    /// let mut local = TickState::new(Tick::new(0), EntityState::new(Vec2::ZERO, Vec2::new(1.0, 0.0)));
    /// for _ in 0..3 {
    ///     local = params.apply(&local);
    ///     history.append(local)?;
    /// }
    ///
    /// // the server says the entity was somewhere else at tick 1
    /// let auth = TickState::new(Tick::new(1), EntityState::new(Vec2::new(5.0, 0.0), Vec2::new(1.0, 0.0)));
    /// let mut engine = ReconciliationEngine::new();
    /// let outcome = engine.on_authoritative(&auth, &mut history, &mut local, &params)?;
    ///
    /// assert!(outcome.is_correction());
    /// assert_eq!(local.tick, Tick::new(3));
    /// assert_eq!(local.position, Vec2::new(7.0, 0.0));
    /// # Ok::<(), rebound::ReboundError>(())
    /// ```
    pub fn on_authoritative(
        &mut self,
        authoritative: &TickState,
        history: &mut HistoryLog,
        local: &mut TickState,
        params: &StepParams,
    ) -> ReboundResult<ReconcileOutcome> {
        self.stats.updates += 1;

        let stale = history.drop_older_than(authoritative.tick);
        if stale > 0 {
            trace!(
                tick = %authoritative.tick,
                stale,
                "dropped predictions superseded by authoritative tick"
            );
            self.stats.stale_dropped += stale as u64;
        }

        let matches_tick = history
            .peek_oldest()
            .is_some_and(|oldest| oldest.tick == authoritative.tick);
        if !matches_tick {
            return Ok(ReconcileOutcome::NoMatch);
        }

        let Some(predicted) = history.pop_oldest() else {
            return Ok(ReconcileOutcome::NoMatch);
        };

        if predicted.same_physics(authoritative) {
            self.stats.confirmations += 1;
            return Ok(ReconcileOutcome::Confirmed {
                tick: authoritative.tick,
            });
        }

        let correction = self.resimulate(authoritative, history, local, params)?;
        debug!(
            tick = %correction.tick,
            resimulated = correction.resimulated,
            before = %correction.before.position,
            after = %correction.after.position,
            "prediction diverged from authoritative state, resimulated"
        );
        Ok(ReconcileOutcome::Corrected(correction))
    }

    /// Replays every remaining history entry from `authoritative`, keeping each entry's tick.
    fn resimulate(
        &mut self,
        authoritative: &TickState,
        history: &mut HistoryLog,
        local: &mut TickState,
        params: &StepParams,
    ) -> ReboundResult<Correction> {
        let ticks: SmallVec<[Tick; 32]> = history.drain().map(|entry| entry.tick).collect();

        let before = local.state();
        let mut current = *authoritative;
        for tick in &ticks {
            current = TickState::new(
                *tick,
                step(current.state(), params.dt, params.half_size, params.bounds),
            );
            history.append(current)?;
        }
        *local = current;

        self.stats.corrections += 1;
        self.stats.resimulated_steps += ticks.len() as u64;
        self.stats.largest_resimulation = self.stats.largest_resimulation.max(ticks.len());

        Ok(Correction {
            tick: authoritative.tick,
            resimulated: ticks.len(),
            before,
            after: current.state(),
        })
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp
)]
mod tests {
    use super::*;
    use crate::state::{Bounds, Vec2};
    use crate::test_config::miri_case_count;
    use proptest::prelude::*;

    const PARAMS: StepParams = StepParams::new(0.5, 1.0, Bounds::new(10.0, 10.0));

    fn predict(start: TickState, steps: usize) -> (TickState, HistoryLog) {
        let mut history = HistoryLog::new(64);
        let mut local = start;
        for _ in 0..steps {
            local = PARAMS.apply(&local);
            history.append(local).unwrap();
        }
        (local, history)
    }

    fn start() -> TickState {
        TickState::new(
            Tick::new(10),
            EntityState::new(Vec2::new(0.0, 0.0), Vec2::new(3.0, -2.0)),
        )
    }

    #[test]
    fn exact_match_confirms_and_leaves_prediction_alone() {
        let (mut local, mut history) = predict(start(), 4);
        let before_local = local;
        let auth = *history.peek_oldest().unwrap();

        let mut engine = ReconciliationEngine::new();
        let outcome = engine
            .on_authoritative(&auth, &mut history, &mut local, &PARAMS)
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Confirmed { tick: auth.tick });
        assert_eq!(local, before_local);
        assert_eq!(history.len(), 3);
        assert_eq!(engine.stats().confirmations, 1);
    }

    #[test]
    fn authoritative_ahead_of_history_is_no_match() {
        let (mut local, mut history) = predict(start(), 2);
        let before_local = local;
        let auth = TickState::new(Tick::new(50), EntityState::default());

        let mut engine = ReconciliationEngine::new();
        let outcome = engine
            .on_authoritative(&auth, &mut history, &mut local, &PARAMS)
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::NoMatch);
        assert_eq!(local, before_local);
        assert!(history.is_empty());
        assert_eq!(engine.stats().stale_dropped, 2);
    }

    #[test]
    fn authoritative_behind_history_is_no_match() {
        let (mut local, mut history) = predict(start(), 3);
        let auth = TickState::new(Tick::new(5), EntityState::default());

        let outcome = ReconciliationEngine::new()
            .on_authoritative(&auth, &mut history, &mut local, &PARAMS)
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::NoMatch);
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn empty_history_is_no_match() {
        let mut history = HistoryLog::new(4);
        let mut local = start();
        let outcome = ReconciliationEngine::new()
            .on_authoritative(&start(), &mut history, &mut local, &PARAMS)
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::NoMatch);
        assert_eq!(local, start());
    }

    #[test]
    fn mismatch_replays_remaining_entries_from_authoritative_state() {
        let (mut local, mut history) = predict(start(), 5);
        let mut auth = *history.peek_oldest().unwrap();
        auth.position.x += 0.25;

        let mut engine = ReconciliationEngine::new();
        let outcome = engine
            .on_authoritative(&auth, &mut history, &mut local, &PARAMS)
            .unwrap();

        let ReconcileOutcome::Corrected(correction) = outcome else {
            panic!("expected a correction, got {outcome:?}");
        };
        assert_eq!(correction.tick, auth.tick);
        assert_eq!(correction.resimulated, 4);

        let mut expected = auth;
        for _ in 0..4 {
            expected = PARAMS.apply(&expected);
        }
        assert_eq!(local, expected);
        assert_eq!(correction.after, expected.state());

        let ticks: Vec<i32> = history.iter().map(|s| s.tick.as_i32()).collect();
        assert_eq!(ticks, vec![12, 13, 14, 15]);
        assert_eq!(history.newest().copied(), Some(local));

        let stats = engine.stats();
        assert_eq!(stats.corrections, 1);
        assert_eq!(stats.resimulated_steps, 4);
        assert_eq!(stats.largest_resimulation, 4);
    }

    #[test]
    fn mismatch_on_newest_entry_snaps_to_authoritative() {
        let (mut local, mut history) = predict(start(), 1);
        let mut auth = local;
        auth.velocity.y = 7.0;

        let outcome = ReconciliationEngine::new()
            .on_authoritative(&auth, &mut history, &mut local, &PARAMS)
            .unwrap();

        assert!(outcome.is_correction());
        assert_eq!(local, auth);
        assert!(history.is_empty());
    }

    #[test]
    fn velocity_only_difference_is_a_divergence() {
        let (mut local, mut history) = predict(start(), 3);
        let mut auth = *history.peek_oldest().unwrap();
        auth.velocity.x = -auth.velocity.x;

        let outcome = ReconciliationEngine::new()
            .on_authoritative(&auth, &mut history, &mut local, &PARAMS)
            .unwrap();
        assert!(outcome.is_correction());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: miri_case_count(),
            ..ProptestConfig::default()
        })]

        #[test]
        fn correction_equals_replay_from_authoritative(
            steps in 1usize..40,
            offset in 0usize..40,
            dx in -3.0f32..3.0,
            dvy in -3.0f32..3.0,
        ) {
            prop_assume!(dx != 0.0 || dvy != 0.0);
            let offset = offset % steps;
            let (mut local, mut history) = predict(start(), steps);

            let mut auth = *history.iter().nth(offset).unwrap();
            auth.position.x += dx;
            auth.velocity.y += dvy;
            prop_assume!(!auth.same_physics(history.iter().nth(offset).unwrap()));

            let outcome = ReconciliationEngine::new()
                .on_authoritative(&auth, &mut history, &mut local, &PARAMS)
                .unwrap();
            prop_assert!(outcome.is_correction());

            let remaining = steps - offset - 1;
            let mut expected = auth;
            let mut expected_history = Vec::new();
            for _ in 0..remaining {
                expected = PARAMS.apply(&expected);
                expected_history.push(expected);
            }
            prop_assert_eq!(local, expected);
            prop_assert_eq!(history.iter().copied().collect::<Vec<_>>(), expected_history);
        }

        #[test]
        fn matching_prediction_is_never_corrected(steps in 1usize..40, offset in 0usize..40) {
            let offset = offset % steps;
            let (mut local, mut history) = predict(start(), steps);
            let before = local;
            let auth = *history.iter().nth(offset).unwrap();

            let outcome = ReconciliationEngine::new()
                .on_authoritative(&auth, &mut history, &mut local, &PARAMS)
                .unwrap();
            prop_assert_eq!(outcome, ReconcileOutcome::Confirmed { tick: auth.tick });
            prop_assert_eq!(local, before);
            prop_assert_eq!(history.len(), steps - offset - 1);
        }
    }
}
