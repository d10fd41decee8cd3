//! An in-process replication link with latency, jitter and loss, measured in ticks.
//!
//! [`DelayedLink`] sits between an [`AuthoritativeChannel`](crate::AuthoritativeChannel) and
//! a client entity. It subscribes to the channel as a [`ChangeObserver`], encodes every
//! `(previous, current)` notification with the wire codec, holds it for
//! `latency ± jitter` ticks, possibly drops it, and hands the due ones to a sink when the
//! host calls [`pump`](DelayedLink::pump).
//!
//! # Example
//!
//! ```rust
//! use rebound::{DelayedLink, LinkConfig};
//! use std::sync::Arc;
//!
//! let config = LinkConfig::builder()
//!     .latency_ticks(3)
//!     .jitter_ticks(1)
//!     .loss_rate(0.05)
//!     .seed(42) // deterministic for testing
//!     .build();
//!
//! let link = Arc::new(DelayedLink::new(config));
//! // server.subscribe(link.clone())?;
//! // link.pump(clock.local_tick(), &*client);
//! # let _ = link;
//! ```
//!
//! Delivery keeps send order unless [`LinkConfig::allow_reordering`] is set, in which case
//! jitter may let a later notification overtake an earlier one.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::network::codec::{decode_notification, encode_notification};
use crate::replication::ChangeObserver;
use crate::{report_violation, report_violation_to};
use crate::rng::Pcg32;
use crate::state::TickState;
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};
use crate::Tick;

/// Configuration for a [`DelayedLink`].
///
/// Use [`LinkConfig::builder()`] for a fluent configuration API. The default is a
/// lossless link with zero latency.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkConfig {
    /// Base delay, in ticks, before a notification is deliverable (default: 0)
    pub latency_ticks: u32,

    /// Maximum random variation added to or subtracted from the latency (default: 0)
    pub jitter_ticks: u32,

    /// Probability of dropping a notification (0.0 - 1.0, default: 0.0)
    pub loss_rate: f64,

    /// Probability of starting a burst loss event (0.0 - 1.0, default: 0.0)
    pub burst_loss_probability: f64,

    /// Notifications dropped by one burst, including the first (default: 0)
    pub burst_loss_length: usize,

    /// Let jitter reorder deliveries instead of holding later notifications back
    /// (default: false)
    pub allow_reordering: bool,

    /// Seed for the loss and jitter decisions (default: 0)
    pub seed: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            latency_ticks: 0,
            jitter_ticks: 0,
            loss_rate: 0.0,
            burst_loss_probability: 0.0,
            burst_loss_length: 0,
            allow_reordering: false,
            seed: 0,
        }
    }
}

/// Clamps a probability into `[0, 1]`, mapping NaN to zero. Out-of-range input is reported
/// as a `Configuration` warning.
fn probability(setting: &'static str, value: f64) -> f64 {
    if (0.0..=1.0).contains(&value) {
        return value;
    }
    let clamped = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
    report_violation!(
        ViolationSeverity::Warning,
        ViolationKind::Configuration,
        "link {} of {} clamped to {}",
        setting,
        value,
        clamped
    );
    clamped
}

impl LinkConfig {
    /// Creates a new builder for fluent configuration.
    #[must_use]
    pub fn builder() -> LinkConfigBuilder {
        LinkConfigBuilder::new()
    }

    /// Immediate, lossless delivery.
    #[must_use]
    pub fn passthrough() -> Self {
        Self::default()
    }

    /// Constant delay, no loss.
    #[must_use]
    pub fn high_latency(latency_ticks: u32) -> Self {
        Self {
            latency_ticks,
            ..Self::default()
        }
    }

    /// Independent loss at `loss_rate`, no delay.
    #[must_use]
    pub fn lossy(loss_rate: f64) -> Self {
        Self {
            loss_rate: probability("loss rate", loss_rate),
            ..Self::default()
        }
    }

    /// About 100ms ± 50ms at 60 ticks per second, with 5% loss.
    #[must_use]
    pub fn poor_network() -> Self {
        Self {
            latency_ticks: 6,
            jitter_ticks: 3,
            loss_rate: 0.05,
            ..Self::default()
        }
    }

    /// About 250ms ± 100ms at 60 ticks per second, 15% loss and occasional bursts.
    #[must_use]
    pub fn terrible_network() -> Self {
        Self {
            latency_ticks: 15,
            jitter_ticks: 6,
            loss_rate: 0.15,
            burst_loss_probability: 0.02,
            burst_loss_length: 5,
            ..Self::default()
        }
    }
}

/// Builder for [`LinkConfig`].
#[derive(Debug, Clone, Default)]
pub struct LinkConfigBuilder {
    config: LinkConfig,
}

impl LinkConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base latency in ticks.
    #[must_use]
    pub fn latency_ticks(mut self, ticks: u32) -> Self {
        self.config.latency_ticks = ticks;
        self
    }

    /// Sets the maximum jitter in ticks.
    #[must_use]
    pub fn jitter_ticks(mut self, ticks: u32) -> Self {
        self.config.jitter_ticks = ticks;
        self
    }

    /// Sets the independent loss rate, clamped to `[0, 1]`.
    #[must_use]
    pub fn loss_rate(mut self, rate: f64) -> Self {
        self.config.loss_rate = probability("loss rate", rate);
        self
    }

    /// Sets burst loss parameters.
    ///
    /// When a burst is triggered (with `probability`), `length` consecutive notifications
    /// are dropped. `chance` is clamped to `[0, 1]`.
    #[must_use]
    pub fn burst_loss(mut self, chance: f64, length: usize) -> Self {
        self.config.burst_loss_probability = probability("burst loss probability", chance);
        self.config.burst_loss_length = length;
        self
    }

    /// Lets jitter reorder deliveries.
    #[must_use]
    pub fn allow_reordering(mut self, allow: bool) -> Self {
        self.config.allow_reordering = allow;
        self
    }

    /// Sets the random seed.
    #[must_use]
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> LinkConfig {
        self.config
    }
}

/// Counters describing what a [`DelayedLink`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LinkStats {
    /// Notifications offered to the link
    pub sent: u64,
    /// Notifications dropped by independent loss
    pub dropped: u64,
    /// Number of burst loss events triggered
    pub burst_loss_events: u64,
    /// Notifications dropped by burst loss
    pub dropped_burst: u64,
    /// Notifications handed to a sink
    pub delivered: u64,
    /// Encoded bytes accepted for delivery
    pub bytes_sent: u64,
    /// Notifications that failed to encode or decode
    pub codec_failures: u64,
}

#[derive(Debug)]
struct InFlight {
    deliver_at: Tick,
    seq: u64,
    bytes: Vec<u8>,
}

#[derive(Debug)]
struct LinkInner {
    config: LinkConfig,
    rng: Pcg32,
    in_flight: Vec<InFlight>,
    next_seq: u64,
    last_deliver_at: Tick,
    burst_loss_remaining: usize,
    stats: LinkStats,
}

impl LinkInner {
    fn should_drop(&mut self) -> bool {
        if self.burst_loss_remaining > 0 {
            self.burst_loss_remaining -= 1;
            self.stats.dropped_burst += 1;
            return true;
        }

        if self.config.burst_loss_length > 0
            && self.rng.gen_bool(self.config.burst_loss_probability)
        {
            self.stats.burst_loss_events += 1;
            self.burst_loss_remaining = self.config.burst_loss_length.saturating_sub(1);
            self.stats.dropped_burst += 1;
            return true;
        }

        if self.config.loss_rate > 0.0 && self.rng.gen_bool(self.config.loss_rate) {
            self.stats.dropped += 1;
            return true;
        }

        false
    }

    fn delivery_tick(&mut self, sent_at: Tick) -> Tick {
        let jitter = self.rng.gen_symmetric(self.config.jitter_ticks);
        let delay = (i64::from(self.config.latency_ticks) + jitter).max(0);
        let delay = i32::try_from(delay).unwrap_or(i32::MAX);
        let mut deliver_at = Tick::new(sent_at.as_i32().saturating_add(delay));
        if !self.config.allow_reordering {
            deliver_at = deliver_at.max(self.last_deliver_at);
            self.last_deliver_at = deliver_at;
        }
        deliver_at
    }
}

/// A lossy, latent replication link between a channel and one client.
///
/// Notifications are stamped with the tick of their `current` value; a notification sent at
/// tick `t` becomes deliverable at `t + latency ± jitter`.
pub struct DelayedLink {
    inner: Mutex<LinkInner>,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl DelayedLink {
    /// Creates an empty link.
    #[must_use]
    pub fn new(config: LinkConfig) -> Self {
        let rng = Pcg32::seed_from_u64(config.seed);
        Self {
            inner: Mutex::new(LinkInner {
                config,
                rng,
                in_flight: Vec::new(),
                next_seq: 0,
                last_deliver_at: Tick::NULL,
                burst_loss_remaining: 0,
                stats: LinkStats::default(),
            }),
            violation_observer: None,
        }
    }

    /// Routes codec failures to `observer` instead of the tracing fallback.
    #[must_use]
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    /// Takes every notification due at `now`, in delivery order.
    #[must_use]
    pub fn take_due(&self, now: Tick) -> Vec<(TickState, TickState)> {
        let due = {
            let mut inner = self.inner.lock();
            let (mut due, waiting): (Vec<InFlight>, Vec<InFlight>) =
                std::mem::take(&mut inner.in_flight)
                    .into_iter()
                    .partition(|p| p.deliver_at <= now);
            inner.in_flight = waiting;
            due.sort_by_key(|p| (p.deliver_at, p.seq));
            due
        };

        let mut decoded = Vec::with_capacity(due.len());
        let mut failures = 0;
        for packet in due {
            match decode_notification(&packet.bytes) {
                Ok(pair) => decoded.push(pair),
                Err(err) => {
                    failures += 1;
                    report_violation_to!(
                        &self.violation_observer,
                        ViolationSeverity::Error,
                        ViolationKind::Replication,
                        "dropping undecodable notification: {}",
                        err
                    );
                },
            }
        }

        let mut inner = self.inner.lock();
        inner.stats.codec_failures += failures;
        inner.stats.delivered += decoded.len() as u64;
        decoded
    }

    /// Delivers every notification due at `now` to `sink`, returning how many.
    ///
    /// The link's lock is released before `sink` runs, so the sink may publish again.
    pub fn pump<O: ChangeObserver + ?Sized>(&self, now: Tick, sink: &O) -> usize {
        let due = self.take_due(now);
        for (previous, current) in &due {
            sink.on_change(previous, current);
        }
        due.len()
    }

    /// Notifications waiting for delivery.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.inner.lock().in_flight.len()
    }

    /// A snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> LinkStats {
        self.inner.lock().stats
    }

    /// Resets the counters.
    pub fn reset_stats(&self) {
        self.inner.lock().stats = LinkStats::default();
    }

    /// The current configuration.
    #[must_use]
    pub fn config(&self) -> LinkConfig {
        self.inner.lock().config.clone()
    }

    /// Replaces the configuration. The random stream is kept.
    pub fn set_config(&self, config: LinkConfig) {
        self.inner.lock().config = config;
    }
}

impl std::fmt::Debug for DelayedLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("DelayedLink")
            .field("config", &inner.config)
            .field("in_flight", &inner.in_flight.len())
            .field("stats", &inner.stats)
            .finish_non_exhaustive()
    }
}

impl ChangeObserver for DelayedLink {
    fn on_change(&self, previous: &TickState, current: &TickState) {
        let bytes = match encode_notification(previous, current) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.inner.lock().stats.codec_failures += 1;
                report_violation_to!(
                    &self.violation_observer,
                    ViolationSeverity::Error,
                    ViolationKind::Replication,
                    "could not encode notification for tick {}: {}",
                    current.tick,
                    err
                );
                return;
            },
        };

        let mut inner = self.inner.lock();
        inner.stats.sent += 1;
        if inner.should_drop() {
            return;
        }

        let deliver_at = inner.delivery_tick(current.tick);
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.stats.bytes_sent += bytes.len() as u64;
        inner.in_flight.push(InFlight {
            deliver_at,
            seq,
            bytes,
        });
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

    fn at(tick: i32) -> TickState {
        TickState::new(
            Tick::new(tick),
            EntityState::new(Vec2::new(tick as f32, 0.5), Vec2::new(1.0, -1.0)),
        )
    }

    fn send_range(link: &DelayedLink, ticks: std::ops::Range<i32>) {
        for t in ticks {
            link.on_change(&at(t - 1), &at(t));
        }
    }

    #[test]
    fn passthrough_delivers_immediately_and_verbatim() {
        let link = DelayedLink::new(LinkConfig::passthrough());
        link.on_change(&at(0), &at(1));
        assert_eq!(link.in_flight(), 1);

        let due = link.take_due(Tick::new(1));
        assert_eq!(due, vec![(at(0), at(1))]);
        assert_eq!(link.in_flight(), 0);
        assert_eq!(link.stats().delivered, 1);
    }

    #[test]
    fn latency_holds_notifications() {
        let link = DelayedLink::new(LinkConfig::high_latency(3));
        send_range(&link, 1..4);

        assert!(link.take_due(Tick::new(3)).is_empty());
        let due = link.take_due(Tick::new(4));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].1.tick, Tick::new(1));
        assert_eq!(link.take_due(Tick::new(10)).len(), 2);
    }

    #[test]
    fn total_loss_drops_everything() {
        let link = DelayedLink::new(LinkConfig::lossy(1.0));
        send_range(&link, 1..21);
        assert_eq!(link.in_flight(), 0);
        let stats = link.stats();
        assert_eq!(stats.sent, 20);
        assert_eq!(stats.dropped, 20);
    }

    #[test]
    fn partial_loss_is_seeded() {
        let config = LinkConfig::builder().loss_rate(0.5).seed(7).build();
        let a = DelayedLink::new(config.clone());
        let b = DelayedLink::new(config);
        send_range(&a, 1..200);
        send_range(&b, 1..200);

        let ticks = |link: &DelayedLink| -> Vec<Tick> {
            link.take_due(Tick::new(1000))
                .into_iter()
                .map(|(_, c)| c.tick)
                .collect()
        };
        let delivered = ticks(&a);
        assert_eq!(delivered, ticks(&b));
        assert!(delivered.len() > 50 && delivered.len() < 150);
    }

    #[test]
    fn jitter_without_reordering_keeps_order() {
        let config = LinkConfig::builder()
            .latency_ticks(5)
            .jitter_ticks(4)
            .seed(11)
            .build();
        let link = DelayedLink::new(config);
        send_range(&link, 1..100);

        let mut last = Tick::NULL;
        for now in 0..200 {
            for (_, current) in link.take_due(Tick::new(now)) {
                assert!(current.tick > last);
                last = current.tick;
            }
        }
        assert_eq!(last, Tick::new(99));
    }

    #[test]
    fn jitter_with_reordering_can_swap() {
        let config = LinkConfig::builder()
            .latency_ticks(5)
            .jitter_ticks(5)
            .allow_reordering(true)
            .seed(3)
            .build();
        let link = DelayedLink::new(config);
        send_range(&link, 1..200);

        let mut order = Vec::new();
        for now in 0..300 {
            order.extend(link.take_due(Tick::new(now)).into_iter().map(|(_, c)| c.tick));
        }
        assert_eq!(order.len(), 199);
        assert!(order.windows(2).any(|w| w[1] < w[0]));
    }

    #[test]
    fn burst_loss_drops_consecutive_notifications() {
        let config = LinkConfig::builder().burst_loss(1.0, 4).build();
        let link = DelayedLink::new(config);
        send_range(&link, 1..5);
        let stats = link.stats();
        assert_eq!(stats.burst_loss_events, 1);
        assert_eq!(stats.dropped_burst, 4);
        assert_eq!(link.in_flight(), 0);
    }

    #[test]
    fn pump_calls_sink_in_order() {
        struct Sink(Mutex<Vec<i32>>);
        impl ChangeObserver for Sink {
            fn on_change(&self, _: &TickState, current: &TickState) {
                self.0.lock().push(current.tick.as_i32());
            }
        }

        let link = DelayedLink::new(LinkConfig::high_latency(1));
        send_range(&link, 1..4);
        let sink = Sink(Mutex::new(Vec::new()));
        assert_eq!(link.pump(Tick::new(3), &sink), 2);
        assert_eq!(*sink.0.lock(), vec![1, 2]);
    }

    #[test]
    fn builder_clamps_rates() {
        let config = LinkConfig::builder()
            .loss_rate(2.0)
            .burst_loss(-1.0, 3)
            .build();
        assert!((config.loss_rate - 1.0).abs() < f64::EPSILON);
        assert!(config.burst_loss_probability.abs() < f64::EPSILON);
    }

    #[test]
    fn nan_rates_mean_no_loss() {
        let config = LinkConfig::builder()
            .loss_rate(f64::NAN)
            .burst_loss(f64::NAN, 4)
            .build();
        assert!(config.loss_rate.abs() < f64::EPSILON);
        assert!(config.burst_loss_probability.abs() < f64::EPSILON);
        assert!(LinkConfig::lossy(f64::NAN).loss_rate.abs() < f64::EPSILON);

        let link = DelayedLink::new(config);
        send_range(&link, 1..20);
        assert_eq!(link.stats().dropped, 0);
        assert_eq!(link.in_flight(), 19);
    }

    #[test]
    fn reset_stats_zeroes_counters() {
        let link = DelayedLink::new(LinkConfig::passthrough());
        send_range(&link, 1..3);
        link.reset_stats();
        assert_eq!(link.stats(), LinkStats::default());
        assert_eq!(link.in_flight(), 2);
    }

    #[test]
    fn presets_are_sane() {
        assert_eq!(LinkConfig::passthrough(), LinkConfig::default());
        assert!(LinkConfig::poor_network().latency_ticks < LinkConfig::terrible_network().latency_ticks);
        assert!(LinkConfig::terrible_network().burst_loss_length > 0);
    }
}
