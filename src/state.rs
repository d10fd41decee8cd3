//! Value types shared by every part of the simulation.
//!
//! All of these are plain `Copy` data. Equality is exact: two states are equal only if
//! every `f32` component compares equal, which is what reconciliation relies on.

use serde::{Deserialize, Serialize};

use crate::Tick;

/// A 2-D floating-point vector.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    /// Horizontal component.
    pub x: f32,
    /// Vertical component.
    pub y: f32,
}

impl Vec2 {
    /// The zero vector.
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    /// Creates a new vector.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Linear interpolation between `self` and `other`; `alpha` is clamped to `[0, 1]`.
    ///
    /// Both endpoints are reproduced exactly.
    #[must_use]
    pub fn lerp(self, other: Self, alpha: f32) -> Self {
        let alpha = alpha.clamp(0.0, 1.0);
        self * (1.0 - alpha) + other * alpha
    }
}

impl std::ops::Add for Vec2 {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl std::ops::AddAssign for Vec2 {
    #[inline]
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl std::ops::Sub for Vec2 {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl std::ops::Mul<f32> for Vec2 {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

impl std::ops::Neg for Vec2 {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

impl std::fmt::Display for Vec2 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// The rectangular world extent, given as half-widths: the world spans
/// `[-extent.x, extent.x] × [-extent.y, extent.y]`.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Bounds {
    /// Half-width and half-height of the world.
    pub extent: Vec2,
}

impl Bounds {
    /// Creates bounds from half-width and half-height.
    #[inline]
    #[must_use]
    pub const fn new(half_width: f32, half_height: f32) -> Self {
        Self {
            extent: Vec2::new(half_width, half_height),
        }
    }
}

/// Instantaneous physical state with no tick attached.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EntityState {
    /// Center of the entity.
    pub position: Vec2,
    /// Displacement per second.
    pub velocity: Vec2,
}

impl EntityState {
    /// Creates a new state.
    #[inline]
    #[must_use]
    pub const fn new(position: Vec2, velocity: Vec2) -> Self {
        Self { position, velocity }
    }
}

/// An [`EntityState`] stamped with the logical tick at which it was produced.
///
/// This is the value replicated from the server. It must travel verbatim: no lossy
/// compression of position or velocity, since comparisons are exact.
#[derive(Debug, Copy, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TickState {
    /// The tick this state belongs to.
    pub tick: Tick,
    /// Center of the entity.
    pub position: Vec2,
    /// Displacement per second.
    pub velocity: Vec2,
}

impl TickState {
    /// Stamps `state` with `tick`.
    #[inline]
    #[must_use]
    pub const fn new(tick: Tick, state: EntityState) -> Self {
        Self {
            tick,
            position: state.position,
            velocity: state.velocity,
        }
    }

    /// Drops the tick.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> EntityState {
        EntityState::new(self.position, self.velocity)
    }

    /// Exact comparison of position and velocity, ignoring the tick.
    #[inline]
    #[must_use]
    pub fn same_physics(&self, other: &Self) -> bool {
        self.position == other.position && self.velocity == other.velocity
    }
}

impl From<TickState> for EntityState {
    fn from(ts: TickState) -> Self {
        ts.state()
    }
}

// #########
// # TESTS #
// #########

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp
)]
mod state_tests {
    use super::*;

    #[test]
    fn vec2_arithmetic() {
        let a = Vec2::new(1.0, 2.0);
        let b = Vec2::new(0.5, -1.0);
        assert_eq!(a + b, Vec2::new(1.5, 1.0));
        assert_eq!(a - b, Vec2::new(0.5, 3.0));
        assert_eq!(a * 2.0, Vec2::new(2.0, 4.0));
        assert_eq!(-a, Vec2::new(-1.0, -2.0));
    }

    #[test]
    fn vec2_lerp_clamps_alpha() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(10.0, -10.0);
        assert_eq!(a.lerp(b, 0.5), Vec2::new(5.0, -5.0));
        assert_eq!(a.lerp(b, -1.0), a);
        assert_eq!(a.lerp(b, 2.0), b);
    }

    #[test]
    fn equality_has_no_tolerance() {
        let a = Vec2::new(1.0, 1.0);
        let b = Vec2::new(1.0 + f32::EPSILON, 1.0);
        assert_ne!(a, b);
    }

    #[test]
    fn tick_state_roundtrips_through_entity_state() {
        let state = EntityState::new(Vec2::new(3.0, 4.0), Vec2::new(-1.0, 0.5));
        let ts = TickState::new(Tick::new(12), state);
        assert_eq!(ts.tick, Tick::new(12));
        assert_eq!(ts.state(), state);
        assert_eq!(EntityState::from(ts), state);
    }

    #[test]
    fn same_physics_ignores_tick() {
        let state = EntityState::new(Vec2::new(1.0, 2.0), Vec2::new(3.0, 4.0));
        let a = TickState::new(Tick::new(1), state);
        let b = TickState::new(Tick::new(2), state);
        assert!(a.same_physics(&b));
        assert_ne!(a, b);

        let c = TickState::new(
            Tick::new(1),
            EntityState::new(Vec2::new(1.0, 2.0), Vec2::new(3.0, -4.0)),
        );
        assert!(!a.same_physics(&c));
    }

    #[test]
    fn bounds_new_sets_extent() {
        let bounds = Bounds::new(10.0, 5.0);
        assert_eq!(bounds.extent.x, 10.0);
        assert_eq!(bounds.extent.y, 5.0);
    }

    #[test]
    fn default_tick_state_is_zeroed() {
        let ts = TickState::default();
        assert_eq!(ts.tick, Tick::new(0));
        assert_eq!(ts.position, Vec2::ZERO);
        assert_eq!(ts.velocity, Vec2::ZERO);
    }
}
