//! The bounded, tick-ordered log of states an owning client predicted but the server has
//! not yet confirmed.
//!
//! The log is a pure FIFO. Entries enter at the back in strictly increasing tick order and
//! leave at the front, either because reconciliation consumed them or because they became
//! stale. Nothing ever needs random access.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::error::{ReboundError, ReboundResult};
use crate::report_violation_to;
use crate::state::TickState;
use crate::telemetry::{
    InvariantChecker, InvariantViolation, ViolationKind, ViolationObserver, ViolationSeverity,
};
use crate::Tick;

/// Default number of entries a [`HistoryLog`] keeps before discarding the oldest.
///
/// Four seconds of prediction at 64 ticks per second.
pub const DEFAULT_HISTORY_CAPACITY: usize = 256;

/// Ordered record of predicted [`TickState`]s for one entity on one client.
///
/// # Example
///
/// ```
/// use rebound::{HistoryLog, TickState, EntityState, Tick};
///
/// let mut log = HistoryLog::new(8);
/// log.append(TickState::new(Tick::new(1), EntityState::default()))?;
/// log.append(TickState::new(Tick::new(2), EntityState::default()))?;
///
/// // ticks must strictly increase
/// assert!(log.append(TickState::new(Tick::new(2), EntityState::default())).is_err());
///
/// assert_eq!(log.drop_older_than(Tick::new(2)), 1);
/// assert_eq!(log.pop_oldest().map(|s| s.tick), Some(Tick::new(2)));
/// assert!(log.is_empty());
/// # Ok::<(), rebound::ReboundError>(())
/// ```
#[derive(Clone)]
pub struct HistoryLog {
    entries: VecDeque<TickState>,
    capacity: usize,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl HistoryLog {
    /// Creates an empty log holding at most `capacity` entries (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            violation_observer: None,
        }
    }

    /// Routes overflow warnings to `observer` instead of the tracing fallback.
    #[must_use]
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    pub(crate) fn set_violation_observer(&mut self, observer: Option<Arc<dyn ViolationObserver>>) {
        self.violation_observer = observer;
    }

    /// Appends `state` at the back.
    ///
    /// # Errors
    ///
    /// Returns [`ReboundError::OutOfOrderHistory`] if `state.tick` is not strictly greater
    /// than the newest tick in the log. The log is left unchanged.
    pub fn append(&mut self, state: TickState) -> ReboundResult<()> {
        if let Some(newest) = self.entries.back() {
            if state.tick <= newest.tick {
                report_violation_to!(
                    &self.violation_observer,
                    ViolationSeverity::Critical,
                    ViolationKind::TickOrder,
                    tick = state.tick,
                    "history append of tick {} does not follow tick {}",
                    state.tick,
                    newest.tick
                );
                return Err(ReboundError::OutOfOrderHistory {
                    last: newest.tick,
                    attempted: state.tick,
                });
            }
        }

        if self.entries.len() >= self.capacity {
            if let Some(discarded) = self.entries.pop_front() {
                report_violation_to!(
                    &self.violation_observer,
                    ViolationSeverity::Warning,
                    ViolationKind::History,
                    tick = discarded.tick,
                    "history full at {} entries, discarding oldest unconfirmed prediction",
                    self.capacity
                );
            }
        }

        self.entries.push_back(state);
        crate::debug_check_invariants!(self, &self.violation_observer, "after append");
        Ok(())
    }

    /// Removes every entry whose tick is strictly less than `tick`, returning how many went.
    pub fn drop_older_than(&mut self, tick: Tick) -> usize {
        let mut dropped = 0;
        while self.entries.front().is_some_and(|s| s.tick < tick) {
            self.entries.pop_front();
            dropped += 1;
        }
        dropped
    }

    /// The lowest-tick entry, if any.
    #[must_use]
    pub fn peek_oldest(&self) -> Option<&TickState> {
        self.entries.front()
    }

    /// Removes and returns the lowest-tick entry.
    pub fn pop_oldest(&mut self) -> Option<TickState> {
        self.entries.pop_front()
    }

    /// The highest-tick entry, if any.
    #[must_use]
    pub fn newest(&self) -> Option<&TickState> {
        self.entries.back()
    }

    /// Number of entries currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the log holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries held before the oldest is discarded.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Discards every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterates oldest to newest.
    #[must_use]
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &TickState> + '_ {
        self.entries.iter()
    }

    /// Removes every entry, yielding them oldest to newest.
    pub fn drain(&mut self) -> impl ExactSizeIterator<Item = TickState> + '_ {
        self.entries.drain(..)
    }
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

impl std::fmt::Debug for HistoryLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryLog")
            .field("len", &self.entries.len())
            .field("capacity", &self.capacity)
            .field("oldest", &self.entries.front().map(|s| s.tick))
            .field("newest", &self.entries.back().map(|s| s.tick))
            .finish_non_exhaustive()
    }
}

impl InvariantChecker for HistoryLog {
    fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.entries.len() > self.capacity {
            return Err(InvariantViolation::new(
                "HistoryLog",
                "length must not exceed capacity",
            )
            .with_details(format!("len={}, capacity={}", self.entries.len(), self.capacity)));
        }

        for (earlier, later) in self.entries.iter().zip(self.entries.iter().skip(1)) {
            if later.tick <= earlier.tick {
                return Err(InvariantViolation::new(
                    "HistoryLog",
                    "ticks must strictly increase",
                )
                .with_details(format!("{} followed by {}", earlier.tick, later.tick)));
            }
        }

        Ok(())
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
    use crate::state::{EntityState, Vec2};
    use crate::telemetry::CollectingObserver;
    use crate::test_config::miri_case_count;
    use proptest::prelude::*;

    fn at(tick: i32) -> TickState {
        TickState::new(
            Tick::new(tick),
            EntityState::new(Vec2::new(tick as f32, 0.0), Vec2::new(1.0, 0.0)),
        )
    }

    #[test]
    fn append_accepts_increasing_ticks_with_gaps() {
        let mut log = HistoryLog::new(8);
        log.append(at(1)).unwrap();
        log.append(at(2)).unwrap();
        log.append(at(7)).unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log.peek_oldest().unwrap().tick, Tick::new(1));
        assert_eq!(log.newest().unwrap().tick, Tick::new(7));
        assert!(log.check_invariants().is_ok());
    }

    #[test]
    fn append_rejects_repeated_and_older_ticks() {
        let mut log = HistoryLog::new(8);
        log.append(at(5)).unwrap();

        let err = log.append(at(5)).unwrap_err();
        assert_eq!(
            err,
            ReboundError::OutOfOrderHistory {
                last: Tick::new(5),
                attempted: Tick::new(5),
            }
        );
        assert!(log.append(at(3)).is_err());
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn out_of_order_append_reports_tick_order_violation() {
        let observer = Arc::new(CollectingObserver::new());
        let mut log = HistoryLog::new(4).with_violation_observer(observer.clone());
        log.append(at(2)).unwrap();
        let _ = log.append(at(1));
        crate::assert_violation!(observer, ViolationKind::TickOrder);
    }

    #[test]
    fn drop_older_than_is_strict() {
        let mut log = HistoryLog::new(8);
        for t in 1..=5 {
            log.append(at(t)).unwrap();
        }
        assert_eq!(log.drop_older_than(Tick::new(3)), 2);
        assert_eq!(log.peek_oldest().unwrap().tick, Tick::new(3));
        assert_eq!(log.drop_older_than(Tick::new(3)), 0);
        assert_eq!(log.drop_older_than(Tick::new(100)), 3);
        assert!(log.is_empty());
    }

    #[test]
    fn pop_oldest_is_fifo() {
        let mut log = HistoryLog::new(8);
        log.append(at(1)).unwrap();
        log.append(at(2)).unwrap();
        assert_eq!(log.pop_oldest(), Some(at(1)));
        assert_eq!(log.pop_oldest(), Some(at(2)));
        assert_eq!(log.pop_oldest(), None);
        assert!(log.peek_oldest().is_none());
    }

    #[test]
    fn full_log_discards_oldest_and_warns() {
        let observer = Arc::new(CollectingObserver::new());
        let mut log = HistoryLog::new(3).with_violation_observer(observer.clone());
        for t in 1..=4 {
            log.append(at(t)).unwrap();
        }

        assert_eq!(log.len(), 3);
        assert_eq!(log.peek_oldest().unwrap().tick, Tick::new(2));
        let warnings = observer.violations_of_kind(ViolationKind::History);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].severity, ViolationSeverity::Warning);
        assert_eq!(warnings[0].tick, Some(Tick::new(1)));
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let mut log = HistoryLog::new(0);
        assert_eq!(log.capacity(), 1);
        log.append(at(1)).unwrap();
        log.append(at(2)).unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log.newest().unwrap().tick, Tick::new(2));
    }

    #[test]
    fn drain_yields_in_order_and_empties() {
        let mut log = HistoryLog::default();
        for t in 10..13 {
            log.append(at(t)).unwrap();
        }
        let ticks: Vec<i32> = log.drain().map(|s| s.tick.as_i32()).collect();
        assert_eq!(ticks, vec![10, 11, 12]);
        assert!(log.is_empty());

        // an emptied log accepts any tick again
        log.append(at(1)).unwrap();
    }

    #[test]
    fn clear_resets_ordering() {
        let mut log = HistoryLog::new(4);
        log.append(at(9)).unwrap();
        log.clear();
        assert!(log.is_empty());
        log.append(at(2)).unwrap();
        assert_eq!(log.iter().count(), 1);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: miri_case_count(),
            ..ProptestConfig::default()
        })]

        #[test]
        fn log_never_holds_non_increasing_ticks(ticks in proptest::collection::vec(-5i32..50, 0..64)) {
            let mut log = HistoryLog::new(16);
            for t in ticks {
                let before = log.newest().map(|s| s.tick);
                let result = log.append(at(t));
                match before {
                    Some(last) if Tick::new(t) <= last => prop_assert!(result.is_err()),
                    _ => prop_assert!(result.is_ok()),
                }
                prop_assert!(log.check_invariants().is_ok());
            }
        }
    }
}
