//! # Rebound
//!
//! Rebound keeps a moving simulated entity smooth on a client despite network latency,
//! while an authoritative server remains the single source of truth.
//!
//! Every entity advances through the same deterministic [`physics::step`]. The server steps
//! its authoritative [`TickState`] once per tick and publishes it through an
//! [`AuthoritativeChannel`]. An owning client predicts ahead of the server, records each
//! predicted state in a [`HistoryLog`], and when an authoritative value disagrees with the
//! stored prediction for the same tick, it rolls back to the server's state and resimulates
//! the ticks it had predicted since.
//!
//! The crate never schedules anything itself. The host loop calls
//! [`PredictedEntity::tick`] at a fixed cadence and wires the replication channel to the
//! client entities; everything happens synchronously inside those calls.
//!
//! ```
//! use rebound::prelude::*;
//!
//! let clock = ManualClock::new(60);
//! let bounds = Bounds::new(10.0, 10.0);
//!
//! let mut server = EntityBuilder::new()
//!     .with_half_size(1.0)
//!     .spawn_authoritative(Vec2::new(0.0, 0.0), Vec2::new(2.0, 1.0), Tick::new(0))?;
//!
//! let rendered = server.tick(&clock, 1.0 / 60.0, bounds, false)?;
//! assert_eq!(server.authoritative().tick, Tick::new(1));
//! assert_eq!(rendered.position, server.current_position());
//! # Ok::<(), ReboundError>(())
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use builder::EntityBuilder;
pub use catch_up::{Baseline, CatchUpInput, CatchUpPlan, CatchUpPolicy};
pub use clock::{Arena, ManualClock, StaticArena, TickClock};
pub use config::EntityConfig;
pub use entity::{EntityStats, PredictedEntity};
pub use error::{ReboundError, ReboundResult};
pub use history::HistoryLog;
pub use network::delayed_link::{DelayedLink, LinkConfig, LinkConfigBuilder, LinkStats};
pub use physics::StepParams;
pub use reconcile::{Correction, ReconcileOutcome, ReconcileStats, ReconciliationEngine};
pub use replication::{AuthoritativeChannel, ChangeObserver, SubscriptionId};
pub use rtt::{RttWindow, RttWindowConfig};
pub use state::{Bounds, EntityState, TickState, Vec2};

/// Fluent construction of [`PredictedEntity`] values.
pub mod builder;
pub mod catch_up;
pub mod clock;
pub mod config;
pub mod entity;
#[doc(hidden)]
pub mod error;
pub mod history;
pub mod physics;
pub mod prelude;
pub mod reconcile;
pub mod replication;
/// Internal random number generator module based on PCG32.
///
/// Drives the seeded loss and jitter decisions of [`DelayedLink`].
pub mod rng;
/// Round-trip-time smoothing for the catch-up policy.
pub mod rtt;
pub mod state;
pub mod telemetry;
#[doc(hidden)]
pub mod test_config;
pub mod network {
    //! Wire fidelity helpers for carrying [`TickState`](crate::TickState) between peers.

    /// Binary codec for replicated tick states.
    ///
    /// Provides bincode-backed encoding that preserves `f32` bit patterns exactly.
    pub mod codec;
    pub mod delayed_link;
}

/// Internal module exposing implementation details for testing and benchmarking.
///
/// # ⚠️ WARNING: No Stability Guarantees
///
/// **This module is NOT part of the public API.** Everything here is subject to change
/// without notice and is not covered by semver compatibility guarantees.
#[doc(hidden)]
pub mod __internal {
    pub use crate::catch_up::server_lag;
    pub use crate::physics::{step, step_tick};
    pub use crate::rng::Pcg32;
}

// #############
// # CONSTANTS #
// #############

/// Internally, -1 represents no tick / invalid tick.
pub const NULL_TICK: i32 = -1;

/// A tick is one discrete, fixed-duration simulation step.
///
/// Ticks are the fundamental unit of time for prediction and reconciliation. Tick numbers
/// start at 0 and increment sequentially. The special value [`NULL_TICK`] (-1) represents
/// "no tick" or "uninitialized".
///
/// # Examples
///
/// ```
/// use rebound::{Tick, NULL_TICK};
///
/// let tick = Tick::new(0);
/// assert!(tick.is_valid());
/// assert!(Tick::NULL.is_null());
///
/// let next = tick + 1;
/// assert_eq!(next.as_i32(), 1);
/// assert_eq!(next - tick, 1);
/// assert!(next > tick);
/// ```
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct Tick(i32);

impl Tick {
    /// The null tick constant, equivalent to [`NULL_TICK`] (-1).
    pub const NULL: Self = Self(NULL_TICK);

    /// Creates a new `Tick` from an `i32` value.
    ///
    /// Note: This does not validate the tick number. Use [`Tick::is_valid()`]
    /// to check if the tick represents a valid (non-negative) tick number.
    #[inline]
    #[must_use]
    pub const fn new(tick: i32) -> Self {
        Self(tick)
    }

    /// Returns the underlying `i32` value.
    #[inline]
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self.0
    }

    /// Returns `true` if this tick is the null tick.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == NULL_TICK
    }

    /// Returns `true` if this tick is valid (non-negative).
    #[inline]
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.0 >= 0
    }

    /// Returns the following tick.
    ///
    /// Like `i32` addition this overflows past `i32::MAX`; use
    /// [`checked_add`](Self::checked_add) where the range is not already known.
    #[inline]
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// `self + delta`, or `None` if the result does not fit in an `i32`.
    ///
    /// ```
    /// use rebound::Tick;
    ///
    /// assert_eq!(Tick::new(4).checked_add(2), Some(Tick::new(6)));
    /// assert_eq!(Tick::new(i32::MAX).checked_add(1), None);
    /// ```
    #[inline]
    #[must_use]
    pub const fn checked_add(self, delta: i32) -> Option<Self> {
        match self.0.checked_add(delta) {
            Some(tick) => Some(Self(tick)),
            None => None,
        }
    }
}

impl std::fmt::Display for Tick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_null() {
            write!(f, "NULL_TICK")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// Overflows like `i32` addition; see [`Tick::checked_add`].
impl std::ops::Add<i32> for Tick {
    type Output = Self;

    #[inline]
    fn add(self, rhs: i32) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl std::ops::AddAssign<i32> for Tick {
    #[inline]
    fn add_assign(&mut self, rhs: i32) {
        self.0 += rhs;
    }
}

impl std::ops::Sub<i32> for Tick {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: i32) -> Self::Output {
        Self(self.0 - rhs)
    }
}

impl std::ops::Sub for Tick {
    type Output = i32;

    #[inline]
    fn sub(self, rhs: Self) -> Self::Output {
        self.0 - rhs.0
    }
}

impl From<i32> for Tick {
    #[inline]
    fn from(value: i32) -> Self {
        Self(value)
    }
}

impl From<Tick> for i32 {
    #[inline]
    fn from(tick: Tick) -> Self {
        tick.0
    }
}

impl PartialEq<i32> for Tick {
    #[inline]
    fn eq(&self, other: &i32) -> bool {
        self.0 == *other
    }
}

impl PartialOrd<i32> for Tick {
    #[inline]
    fn partial_cmp(&self, other: &i32) -> Option<std::cmp::Ordering> {
        self.0.partial_cmp(other)
    }
}

/// Identifies a remote peer, used to look up its round-trip time.
///
/// # Examples
///
/// ```
/// use rebound::PeerId;
///
/// let server = PeerId::new(0);
/// assert_eq!(server.as_u64(), 0);
/// assert_eq!(server.to_string(), "0");
/// ```
#[derive(
    Debug,
    Copy,
    Clone,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    serde::Serialize,
    serde::Deserialize,
)]
pub struct PeerId(u64);

impl PeerId {
    /// Creates a new `PeerId`.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the underlying `u64` value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for PeerId {
    #[inline]
    fn from(value: u64) -> Self {
        Self(value)
    }
}

// #############
// #   ENUMS   #
// #############

/// The part an entity instance plays in a session, resolved once at spawn.
///
/// - the server owns authority and steps the authoritative value,
/// - a remote client only renders the replicated authoritative value,
/// - the owning client predicts ahead and reconciles against the server.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityRole {
    /// Owns authority; advances and publishes the authoritative value.
    Server,
    /// Observes the authoritative value without predicting.
    RemoteClient,
    /// Predicts locally and reconciles against authoritative updates.
    OwningClient,
}

impl EntityRole {
    /// Returns `true` for the role that keeps a [`HistoryLog`].
    #[inline]
    #[must_use]
    pub const fn predicts(self) -> bool {
        matches!(self, Self::OwningClient)
    }

    /// Returns a string representation suitable for logging.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::RemoteClient => "remote_client",
            Self::OwningClient => "owning_client",
        }
    }
}

impl std::fmt::Display for EntityRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ###################
// # UNIT TESTS      #
// ###################

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    // ==========================================
    // Tick Tests
    // ==========================================

    #[test]
    fn tick_null_is_not_valid() {
        assert!(Tick::NULL.is_null());
        assert!(!Tick::NULL.is_valid());
        assert!(!Tick::new(-5).is_valid());
        assert!(Tick::new(0).is_valid());
    }

    #[test]
    fn tick_arithmetic() {
        let tick = Tick::new(10);
        assert_eq!(tick + 5, Tick::new(15));
        assert_eq!(tick - 3, Tick::new(7));
        assert_eq!(Tick::new(15) - tick, 5);
        assert_eq!(tick.next(), Tick::new(11));

        let mut t = tick;
        t += 2;
        assert_eq!(t, 12);
    }

    #[test]
    fn checked_add_stops_at_the_i32_range() {
        assert_eq!(Tick::new(10).checked_add(-3), Some(Tick::new(7)));
        assert_eq!(Tick::new(i32::MAX - 2).checked_add(2), Some(Tick::new(i32::MAX)));
        assert_eq!(Tick::new(i32::MAX).checked_add(1), None);
    }

    #[test]
    fn tick_display() {
        assert_eq!(Tick::NULL.to_string(), "NULL_TICK");
        assert_eq!(Tick::new(42).to_string(), "42");
    }

    #[test]
    fn tick_conversions() {
        let tick: Tick = 7.into();
        let raw: i32 = tick.into();
        assert_eq!(raw, 7);
        assert!(tick > 6);
        assert!(tick < 8);
    }

    // ==========================================
    // EntityRole Tests
    // ==========================================

    #[test]
    fn only_owning_client_predicts() {
        assert!(EntityRole::OwningClient.predicts());
        assert!(!EntityRole::RemoteClient.predicts());
        assert!(!EntityRole::Server.predicts());
    }

    #[test]
    fn entity_role_display() {
        assert_eq!(EntityRole::Server.to_string(), "server");
        assert_eq!(EntityRole::RemoteClient.to_string(), "remote_client");
        assert_eq!(EntityRole::OwningClient.to_string(), "owning_client");
    }

    #[test]
    fn peer_id_roundtrip() {
        let peer = PeerId::from(9u64);
        assert_eq!(peer.as_u64(), 9);
        assert_eq!(peer, PeerId::new(9));
    }
}
