//! Interfaces to the host's clock and world, plus simple implementations of both.
//!
//! The core never reads ambient state. Everything it needs about time and the world comes
//! through [`TickClock`] and [`Arena`], or as explicit arguments to
//! [`PredictedEntity::tick`](crate::PredictedEntity::tick).

use std::collections::BTreeMap;

use web_time::Duration;

use crate::rtt::{RttWindow, RttWindowConfig};
use crate::state::Bounds;
use crate::{PeerId, Tick};

/// The host's logical clock and round-trip-time estimator.
pub trait TickClock {
    /// The current logical tick on this process.
    fn local_tick(&self) -> Tick;

    /// The fixed simulation rate, in ticks per second.
    fn tick_rate(&self) -> u32;

    /// A recent, smoothed round-trip time to `peer`. Unknown peers report zero.
    fn current_rtt(&self, peer: PeerId) -> Duration;
}

/// The world an entity moves in.
pub trait Arena {
    /// Current world extent.
    fn bounds(&self) -> Bounds;

    /// Whether simulation is globally frozen this tick.
    fn is_suspended(&self) -> bool;
}

/// An [`Arena`] that is just two fields.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct StaticArena {
    /// World extent.
    pub bounds: Bounds,
    /// Global freeze flag.
    pub suspended: bool,
}

impl StaticArena {
    /// An unfrozen arena with the given bounds.
    #[must_use]
    pub const fn new(bounds: Bounds) -> Self {
        Self {
            bounds,
            suspended: false,
        }
    }
}

impl Arena for StaticArena {
    fn bounds(&self) -> Bounds {
        self.bounds
    }

    fn is_suspended(&self) -> bool {
        self.suspended
    }
}

/// A [`TickClock`] driven by hand, for hosts that already own a tick counter and for tests.
///
/// RTT samples per peer are smoothed through an [`RttWindow`].
///
/// ```
/// use rebound::{ManualClock, PeerId, Tick, TickClock};
/// use web_time::Duration;
///
/// let mut clock = ManualClock::new(60);
/// clock.advance();
/// assert_eq!(clock.local_tick(), Tick::new(1));
///
/// let server = PeerId::new(0);
/// clock.record_rtt(server, Duration::from_millis(90));
/// clock.record_rtt(server, Duration::from_millis(110));
/// assert_eq!(clock.current_rtt(server), Duration::from_millis(100));
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    tick: Tick,
    tick_rate: u32,
    rtt_config: RttWindowConfig,
    rtts: BTreeMap<PeerId, RttWindow>,
}

impl ManualClock {
    /// A clock at tick 0 running at `tick_rate` ticks per second.
    #[must_use]
    pub fn new(tick_rate: u32) -> Self {
        Self {
            tick: Tick::new(0),
            tick_rate,
            rtt_config: RttWindowConfig::default(),
            rtts: BTreeMap::new(),
        }
    }

    /// Uses `config` for RTT windows created from now on.
    #[must_use]
    pub fn with_rtt_window(mut self, config: RttWindowConfig) -> Self {
        self.rtt_config = config;
        self
    }

    /// Moves the clock one tick forward and returns the new tick.
    pub fn advance(&mut self) -> Tick {
        self.tick += 1;
        self.tick
    }

    /// Jumps to `tick`.
    pub fn set_tick(&mut self, tick: Tick) {
        self.tick = tick;
    }

    /// Adds an RTT sample for `peer`.
    pub fn record_rtt(&mut self, peer: PeerId, sample: Duration) {
        let config = self.rtt_config;
        self.rtts
            .entry(peer)
            .or_insert_with(|| RttWindow::with_config(config))
            .record(sample);
    }

    /// Replaces all history for `peer` with a single sample.
    pub fn set_rtt(&mut self, peer: PeerId, rtt: Duration) {
        let mut window = RttWindow::with_config(self.rtt_config);
        window.record(rtt);
        self.rtts.insert(peer, window);
    }
}

impl TickClock for ManualClock {
    fn local_tick(&self) -> Tick {
        self.tick
    }

    fn tick_rate(&self) -> u32 {
        self.tick_rate
    }

    fn current_rtt(&self, peer: PeerId) -> Duration {
        self.rtts
            .get(&peer)
            .map_or(Duration::ZERO, RttWindow::average)
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

    #[test]
    fn unknown_peer_has_zero_rtt() {
        let clock = ManualClock::new(30);
        assert_eq!(clock.current_rtt(PeerId::new(3)), Duration::ZERO);
        assert_eq!(clock.tick_rate(), 30);
    }

    #[test]
    fn set_rtt_discards_earlier_samples() {
        let mut clock = ManualClock::new(60);
        let peer = PeerId::new(1);
        clock.record_rtt(peer, Duration::from_millis(500));
        clock.set_rtt(peer, Duration::from_millis(20));
        assert_eq!(clock.current_rtt(peer), Duration::from_millis(20));
    }

    #[test]
    fn rtt_is_tracked_per_peer() {
        let mut clock = ManualClock::new(60).with_rtt_window(RttWindowConfig::lan());
        clock.record_rtt(PeerId::new(1), Duration::from_millis(10));
        clock.record_rtt(PeerId::new(2), Duration::from_millis(90));
        assert_eq!(clock.current_rtt(PeerId::new(1)), Duration::from_millis(10));
        assert_eq!(clock.current_rtt(PeerId::new(2)), Duration::from_millis(90));
    }

    #[test]
    fn set_tick_and_advance() {
        let mut clock = ManualClock::new(60);
        clock.set_tick(Tick::new(41));
        assert_eq!(clock.advance(), Tick::new(42));
        assert_eq!(clock.local_tick(), Tick::new(42));
    }

    #[test]
    fn static_arena_reports_its_fields() {
        let mut arena = StaticArena::new(Bounds::new(5.0, 4.0));
        assert!(!arena.is_suspended());
        arena.suspended = true;
        assert!(arena.is_suspended());
        assert_eq!(arena.bounds(), Bounds::new(5.0, 4.0));
    }
}
