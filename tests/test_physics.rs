//! Table-driven checks of the physics step's boundary handling.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp
)]

use rebound::physics::step;
use rebound::{Bounds, EntityState, Vec2};

const BOUNDS: Bounds = Bounds::new(10.0, 10.0);

macro_rules! step_cases {
    ($($name:ident: ($px:expr, $py:expr), ($vx:expr, $vy:expr), $half:expr => ($ex:expr, $ey:expr), ($evx:expr, $evy:expr);)+) => {
        $(
            pastey::paste! {
                #[test]
                fn [<step_ $name>]() {
                    let state = EntityState::new(Vec2::new($px, $py), Vec2::new($vx, $vy));
                    let next = step(state, 1.0, $half, BOUNDS);
                    assert_eq!(next.position, Vec2::new($ex, $ey), "position");
                    assert_eq!(next.velocity, Vec2::new($evx, $evy), "velocity");
                }
            }
        )+
    };
}

step_cases! {
    free_motion: (0.0, 0.0), (2.0, -2.0), 1.0 => (2.0, -2.0), (2.0, -2.0);
    left_wall: (-9.5, 0.0), (-2.0, 0.0), 1.0 => (-9.0, 0.0), (2.0, 0.0);
    right_wall: (9.5, 0.0), (2.0, 0.0), 1.0 => (9.0, 0.0), (-2.0, 0.0);
    top_wall: (0.0, 9.5), (0.0, 2.0), 1.0 => (0.0, 9.0), (0.0, -2.0);
    bottom_wall: (0.0, -9.5), (0.0, -2.0), 1.0 => (0.0, -9.0), (0.0, 2.0);
    corner_reflects_both_axes: (9.5, 9.5), (2.0, 2.0), 1.0 => (9.0, 9.0), (-2.0, -2.0);
    touching_is_not_crossing: (8.0, 0.0), (1.0, 0.0), 1.0 => (9.0, 0.0), (1.0, 0.0);
    // Wider than the arena: only the first side checked on each axis fires.
    oversized_prefers_left_and_top: (0.0, 0.0), (0.0, 0.0), 11.0 => (1.0, -1.0), (0.0, 0.0);
}
