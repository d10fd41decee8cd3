//! The server-owned replicated value and its change notifications.
//!
//! An [`AuthoritativeChannel`] owns one [`TickState`]. [`publish`](AuthoritativeChannel::publish)
//! replaces it and then calls every subscribed [`ChangeObserver`] synchronously, in
//! subscription order, on the publishing thread, with the `(previous, current)` pair.
//! Anything asynchronous (latency, loss) is layered on by an observer such as
//! [`DelayedLink`](crate::DelayedLink).

use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::entity::PredictedEntity;
use crate::report_violation_to;
use crate::state::TickState;
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};

/// Receives `(previous, current)` pairs from an [`AuthoritativeChannel`].
#[cfg(feature = "sync-send")]
pub trait ChangeObserver: Send + Sync {
    /// Called once per published change.
    fn on_change(&self, previous: &TickState, current: &TickState);
}

/// Receives `(previous, current)` pairs from an [`AuthoritativeChannel`].
#[cfg(not(feature = "sync-send"))]
pub trait ChangeObserver {
    /// Called once per published change.
    fn on_change(&self, previous: &TickState, current: &TickState);
}

/// Handle returned by [`AuthoritativeChannel::subscribe`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

/// Owned authoritative value plus an ordered list of observers.
///
/// ```
/// use rebound::{AuthoritativeChannel, ChangeObserver, EntityState, Tick, TickState};
/// use parking_lot::Mutex;
/// use std::sync::Arc;
///
/// #[derive(Default)]
/// struct Seen(Mutex<Vec<(Tick, Tick)>>);
///
/// impl ChangeObserver for Seen {
///     fn on_change(&self, previous: &TickState, current: &TickState) {
///         self.0.lock().push((previous.tick, current.tick));
///     }
/// }
///
/// let mut channel = AuthoritativeChannel::new(TickState::new(Tick::new(0), EntityState::default()));
/// let seen = Arc::new(Seen::default());
/// channel.subscribe(seen.clone());
///
/// channel.publish(TickState::new(Tick::new(1), EntityState::default()));
/// assert_eq!(*seen.0.lock(), vec![(Tick::new(0), Tick::new(1))]);
/// ```
pub struct AuthoritativeChannel {
    value: TickState,
    observers: SmallVec<[(SubscriptionId, Arc<dyn ChangeObserver>); 4]>,
    next_id: u64,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl AuthoritativeChannel {
    /// A channel holding `initial` with no subscribers.
    #[must_use]
    pub fn new(initial: TickState) -> Self {
        Self {
            value: initial,
            observers: SmallVec::new(),
            next_id: 0,
            violation_observer: None,
        }
    }

    /// Routes tick-order warnings to `observer` instead of the tracing fallback.
    #[must_use]
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    pub(crate) fn set_violation_observer(&mut self, observer: Option<Arc<dyn ViolationObserver>>) {
        self.violation_observer = observer;
    }

    /// Adds `observer` at the end of the notification order.
    pub fn subscribe(&mut self, observer: Arc<dyn ChangeObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id += 1;
        self.observers.push((id, observer));
        id
    }

    /// Removes a subscription. Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(sub, _)| *sub != id);
        self.observers.len() != before
    }

    /// Replaces the value, then notifies every observer with `(previous, current)`.
    ///
    /// Publishing a tick older than the current one still goes through, but is reported as
    /// a `TickOrder` warning since subscribers assume non-decreasing ticks.
    pub fn publish(&mut self, value: TickState) {
        let previous = std::mem::replace(&mut self.value, value);
        if value.tick < previous.tick {
            report_violation_to!(
                &self.violation_observer,
                ViolationSeverity::Warning,
                ViolationKind::TickOrder,
                "published tick {} is older than tick {}",
                value.tick,
                previous.tick
            );
        }
        for (_, observer) in &self.observers {
            observer.on_change(&previous, &self.value);
        }
    }

    /// The current authoritative value.
    #[must_use]
    pub fn value(&self) -> &TickState {
        &self.value
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.observers.len()
    }
}

impl std::fmt::Debug for AuthoritativeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthoritativeChannel")
            .field("value", &self.value)
            .field("subscribers", &self.observers.len())
            .finish_non_exhaustive()
    }
}

/// Lets a shared client entity subscribe directly. Errors cannot travel back through the
/// channel, so they are reported to the entity's violation observer instead.
impl ChangeObserver for Mutex<PredictedEntity> {
    fn on_change(&self, previous: &TickState, current: &TickState) {
        let mut entity = self.lock();
        if let Err(err) = entity.on_authoritative_changed(previous, current) {
            let observer = entity.violation_observer().cloned();
            report_violation_to!(
                &observer,
                ViolationSeverity::Error,
                ViolationKind::Replication,
                "authoritative update for tick {} failed: {}",
                current.tick,
                err
            );
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
    use crate::state::EntityState;
    use crate::telemetry::CollectingObserver;
    use crate::Tick;

    #[derive(Default)]
    struct Recorder {
        label: u8,
        log: Arc<Mutex<Vec<(u8, i32, i32)>>>,
    }

    impl ChangeObserver for Recorder {
        fn on_change(&self, previous: &TickState, current: &TickState) {
            self.log
                .lock()
                .push((self.label, previous.tick.as_i32(), current.tick.as_i32()));
        }
    }

    fn at(tick: i32) -> TickState {
        TickState::new(Tick::new(tick), EntityState::default())
    }

    #[test]
    fn observers_run_in_subscription_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut channel = AuthoritativeChannel::new(at(0));
        for label in [1, 2, 3] {
            channel.subscribe(Arc::new(Recorder {
                label,
                log: log.clone(),
            }));
        }

        channel.publish(at(1));
        channel.publish(at(2));

        assert_eq!(
            *log.lock(),
            vec![
                (1, 0, 1),
                (2, 0, 1),
                (3, 0, 1),
                (1, 1, 2),
                (2, 1, 2),
                (3, 1, 2)
            ]
        );
        assert_eq!(channel.value().tick, Tick::new(2));
    }

    #[test]
    fn value_is_updated_before_observers_run() {
        struct CheckValue;
        impl ChangeObserver for CheckValue {
            fn on_change(&self, previous: &TickState, current: &TickState) {
                assert_eq!(current.tick.as_i32(), previous.tick.as_i32() + 1);
            }
        }
        let mut channel = AuthoritativeChannel::new(at(4));
        channel.subscribe(Arc::new(CheckValue));
        channel.publish(at(5));
        assert_eq!(*channel.value(), at(5));
    }

    #[test]
    fn unsubscribe_stops_notifications() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut channel = AuthoritativeChannel::new(at(0));
        let a = channel.subscribe(Arc::new(Recorder {
            label: 1,
            log: log.clone(),
        }));
        channel.subscribe(Arc::new(Recorder {
            label: 2,
            log: log.clone(),
        }));

        assert!(channel.unsubscribe(a));
        assert!(!channel.unsubscribe(a));
        assert_eq!(channel.subscriber_count(), 1);

        channel.publish(at(1));
        assert_eq!(*log.lock(), vec![(2, 0, 1)]);
    }

    #[test]
    fn publishing_an_older_tick_warns() {
        let observer = Arc::new(CollectingObserver::new());
        let mut channel =
            AuthoritativeChannel::new(at(10)).with_violation_observer(observer.clone());
        channel.publish(at(9));
        crate::assert_violation!(observer, ViolationKind::TickOrder);
        assert_eq!(channel.value().tick, Tick::new(9));
    }

    #[test]
    fn publishing_without_subscribers_only_updates_value() {
        let mut channel = AuthoritativeChannel::new(at(0));
        channel.publish(at(1));
        assert_eq!(channel.subscriber_count(), 0);
        assert_eq!(channel.value().tick, Tick::new(1));
    }
}
