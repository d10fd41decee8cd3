//! The single source of truth for one tick of motion.
//!
//! [`step`] is invoked identically by the server's authoritative stepping, by client
//! prediction, and by reconciliation resimulation. It is pure: same inputs, bit-identical
//! outputs, no I/O, no errors.
//!
//! # Boundary handling
//!
//! After integrating `position += velocity * dt`, each axis is checked with `if / else if`
//! semantics: at most one side of an axis can trigger per step. When the leading edge of the
//! entity has crossed a bound, the position is clamped to the bound minus the half-size and
//! the velocity component on that axis is negated. Horizontal is checked left then right,
//! vertical top then bottom.

use crate::state::{Bounds, EntityState, TickState};

/// Everything besides the state that a step depends on.
#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct StepParams {
    /// Elapsed time per step, in seconds.
    pub dt: f32,
    /// Radius (or half-extent) of the entity.
    pub half_size: f32,
    /// World extent.
    pub bounds: Bounds,
}

impl StepParams {
    /// Bundles step parameters.
    #[must_use]
    pub const fn new(dt: f32, half_size: f32, bounds: Bounds) -> Self {
        Self {
            dt,
            half_size,
            bounds,
        }
    }

    /// Runs [`step_tick`] with these parameters.
    #[inline]
    #[must_use]
    pub fn apply(&self, state: &TickState) -> TickState {
        step_tick(state, self.dt, self.half_size, self.bounds)
    }
}

/// Advances `state` by `dt` under linear motion with elastic axis-aligned reflection.
///
/// # Example
///
/// ```
/// use rebound::physics::step;
/// use rebound::{Bounds, EntityState, Vec2};
///
/// let state = EntityState::new(Vec2::new(9.5, 0.0), Vec2::new(2.0, 0.0));
/// let next = step(state, 1.0, 1.0, Bounds::new(10.0, 10.0));
/// assert_eq!(next.position, Vec2::new(9.0, 0.0));
/// assert_eq!(next.velocity, Vec2::new(-2.0, 0.0));
/// ```
#[must_use]
pub fn step(state: EntityState, dt: f32, half_size: f32, bounds: Bounds) -> EntityState {
    let mut position = state.position + state.velocity * dt;
    let mut velocity = state.velocity;
    let extent = bounds.extent;

    // horizontal
    if position.x - half_size < -extent.x {
        position.x = -(extent.x - half_size);
        velocity.x = -velocity.x;
    } else if position.x + half_size > extent.x {
        position.x = extent.x - half_size;
        velocity.x = -velocity.x;
    }

    // vertical
    if position.y + half_size > extent.y {
        position.y = extent.y - half_size;
        velocity.y = -velocity.y;
    } else if position.y - half_size < -extent.y {
        position.y = -(extent.y - half_size);
        velocity.y = -velocity.y;
    }

    EntityState::new(position, velocity)
}

/// Steps a [`TickState`], stamping the result with the following tick.
#[inline]
#[must_use]
pub fn step_tick(state: &TickState, dt: f32, half_size: f32, bounds: Bounds) -> TickState {
    TickState::new(
        state.tick.next(),
        step(state.state(), dt, half_size, bounds),
    )
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
    use crate::state::Vec2;
    use crate::test_config::miri_case_count;
    use crate::Tick;
    use proptest::prelude::*;

    const BOUNDS: Bounds = Bounds::new(10.0, 10.0);

    #[test]
    fn free_motion_integrates_velocity() {
        let state = EntityState::new(Vec2::new(1.0, -2.0), Vec2::new(3.0, 0.5));
        let next = step(state, 0.5, 1.0, BOUNDS);
        assert_eq!(next.position, Vec2::new(2.5, -1.75));
        assert_eq!(next.velocity, state.velocity);
    }

    #[test]
    fn right_wall_example() {
        let state = EntityState::new(Vec2::new(9.5, 0.0), Vec2::new(2.0, 0.0));
        let next = step(state, 1.0, 1.0, BOUNDS);
        assert_eq!(next, EntityState::new(Vec2::new(9.0, 0.0), Vec2::new(-2.0, 0.0)));
    }

    macro_rules! reflection_case {
        ($name:ident, $pos:expr, $vel:expr, $expected_pos:expr, $expected_vel:expr) => {
            pastey::paste! {
                #[test]
                fn [<reflects_off_ $name _wall>]() {
                    let state = EntityState::new($pos, $vel);
                    let next = step(state, 1.0, 1.0, BOUNDS);
                    assert_eq!(next.position, $expected_pos);
                    assert_eq!(next.velocity, $expected_vel);
                }
            }
        };
    }

    reflection_case!(
        left,
        Vec2::new(-9.0, 0.0),
        Vec2::new(-3.0, 0.0),
        Vec2::new(-9.0, 0.0),
        Vec2::new(3.0, 0.0)
    );
    reflection_case!(
        right,
        Vec2::new(8.0, 1.0),
        Vec2::new(4.0, 0.0),
        Vec2::new(9.0, 1.0),
        Vec2::new(-4.0, 0.0)
    );
    reflection_case!(
        top,
        Vec2::new(0.0, 8.5),
        Vec2::new(0.0, 2.0),
        Vec2::new(0.0, 9.0),
        Vec2::new(0.0, -2.0)
    );
    reflection_case!(
        bottom,
        Vec2::new(2.0, -8.5),
        Vec2::new(0.0, -2.0),
        Vec2::new(2.0, -9.0),
        Vec2::new(0.0, 2.0)
    );

    #[test]
    fn corner_reflects_each_axis_once() {
        let state = EntityState::new(Vec2::new(9.0, 9.0), Vec2::new(2.0, 2.0));
        let next = step(state, 1.0, 1.0, BOUNDS);
        assert_eq!(next.position, Vec2::new(9.0, 9.0));
        assert_eq!(next.velocity, Vec2::new(-2.0, -2.0));
    }

    #[test]
    fn touching_the_bound_exactly_does_not_reflect() {
        let state = EntityState::new(Vec2::new(8.0, 0.0), Vec2::new(1.0, 0.0));
        let next = step(state, 1.0, 1.0, BOUNDS);
        assert_eq!(next.position, Vec2::new(9.0, 0.0));
        assert_eq!(next.velocity, Vec2::new(1.0, 0.0));
    }

    #[test]
    fn step_tick_stamps_next_tick() {
        let ts = TickState::new(
            Tick::new(41),
            EntityState::new(Vec2::ZERO, Vec2::new(1.0, 0.0)),
        );
        let next = step_tick(&ts, 1.0, 1.0, BOUNDS);
        assert_eq!(next.tick, Tick::new(42));
        assert_eq!(next.position, Vec2::new(1.0, 0.0));
    }

    #[test]
    fn step_params_apply_matches_step_tick() {
        let params = StepParams::new(0.25, 0.5, BOUNDS);
        let ts = TickState::new(
            Tick::new(3),
            EntityState::new(Vec2::new(1.0, 1.0), Vec2::new(-4.0, 8.0)),
        );
        assert_eq!(params.apply(&ts), step_tick(&ts, 0.25, 0.5, BOUNDS));
    }

    fn finite_component() -> impl Strategy<Value = f32> {
        -50.0f32..50.0
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: miri_case_count(),
            ..ProptestConfig::default()
        })]

        #[test]
        fn step_is_bit_identical_for_identical_inputs(
            px in finite_component(), py in finite_component(),
            vx in finite_component(), vy in finite_component(),
            dt in 0.0f32..1.0, half in 0.0f32..2.0,
        ) {
            let state = EntityState::new(Vec2::new(px, py), Vec2::new(vx, vy));
            let a = step(state, dt, half, BOUNDS);
            let b = step(state, dt, half, BOUNDS);
            prop_assert_eq!(a.position.x.to_bits(), b.position.x.to_bits());
            prop_assert_eq!(a.position.y.to_bits(), b.position.y.to_bits());
            prop_assert_eq!(a.velocity.x.to_bits(), b.velocity.x.to_bits());
            prop_assert_eq!(a.velocity.y.to_bits(), b.velocity.y.to_bits());
        }

        #[test]
        fn crossing_left_bound_clamps_and_flips(
            py in -5.0f32..5.0, vx in -20.0f32..-11.0,
        ) {
            let state = EntityState::new(Vec2::new(0.0, py), Vec2::new(vx, 0.0));
            let next = step(state, 1.0, 1.0, BOUNDS);
            prop_assert_eq!(next.position.x, -(BOUNDS.extent.x - 1.0));
            prop_assert_eq!(next.velocity.x, -vx);
        }

        #[test]
        fn crossing_top_bound_clamps_and_flips(
            px in -5.0f32..5.0, vy in 11.0f32..20.0,
        ) {
            let state = EntityState::new(Vec2::new(px, 0.0), Vec2::new(0.0, vy));
            let next = step(state, 1.0, 1.0, BOUNDS);
            prop_assert_eq!(next.position.y, BOUNDS.extent.y - 1.0);
            prop_assert_eq!(next.velocity.y, -vy);
        }
    }
}
