//! Per-entity configuration.
//!
//! | Preset | Purpose |
//! |--------|---------|
//! | `EntityConfig::default()` | RTT-aware catch-up, 256 entries of history |
//! | `EntityConfig::tick_difference()` | No RTT telemetry available |
//! | `EntityConfig::high_latency()` | Long prediction windows (200ms+ RTT) |
//! | `EntityConfig::lan()` | Short prediction windows |
//!
//! # Example
//!
//! ```
//! use rebound::{EntityBuilder, EntityConfig};
//!
//! let builder = EntityBuilder::new().with_config(EntityConfig::high_latency());
//! # let _ = builder;
//! ```

use crate::catch_up::{CatchUpPolicy, DEFAULT_MAX_CATCH_UP_STEPS};
use crate::error::{ReboundError, ReboundResult};
use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::physics::StepParams;
use crate::state::Bounds;

/// Largest history a single entity may keep.
const MAX_HISTORY_CAPACITY: usize = 65_536;

/// Tunables for one predicted entity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityConfig {
    /// Radius (or half-extent) of the entity, used for boundary reflection.
    ///
    /// Default: 0.5
    pub half_size: f32,

    /// Catch-up algorithm used by an owning client.
    ///
    /// Default: [`CatchUpPolicy::RttAware`]
    pub catch_up: CatchUpPolicy,

    /// Unconfirmed predictions kept before the oldest is discarded.
    ///
    /// Default: 256
    pub history_capacity: usize,

    /// Most physics steps a single call to `tick` may run. A longer hard catch-up runs
    /// this many and finishes over the following ticks. Must not exceed
    /// `history_capacity`.
    ///
    /// Default: 240
    pub max_catch_up_steps: u32,

    /// Step duration used to resimulate before the first `tick` call, in seconds.
    ///
    /// Default: 1/60
    pub initial_dt: f32,

    /// World extent used to resimulate before the first `tick` call.
    ///
    /// Default: 10 × 10 half-extent
    pub initial_bounds: Bounds,
}

impl Default for EntityConfig {
    fn default() -> Self {
        Self {
            half_size: 0.5,
            catch_up: CatchUpPolicy::RttAware,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            max_catch_up_steps: DEFAULT_MAX_CATCH_UP_STEPS,
            initial_dt: 1.0 / 60.0,
            initial_bounds: Bounds::new(10.0, 10.0),
        }
    }
}

impl EntityConfig {
    /// Creates a new `EntityConfig` with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Steps toward the clock's local tick without using RTT.
    ///
    /// Recovers more slowly after latency spikes, but needs no round-trip telemetry.
    #[must_use]
    pub fn tick_difference() -> Self {
        Self {
            catch_up: CatchUpPolicy::TickDifference,
            ..Self::default()
        }
    }

    /// Configuration preset for high-latency networks (200ms+ RTT).
    ///
    /// Keeps more history and allows longer hard catch-ups.
    #[must_use]
    pub fn high_latency() -> Self {
        Self {
            history_capacity: 1024,
            max_catch_up_steps: 480,
            ..Self::default()
        }
    }

    /// Configuration preset for local network play.
    ///
    /// Predictions rarely run more than a few ticks ahead.
    #[must_use]
    pub fn lan() -> Self {
        Self {
            history_capacity: 64,
            max_catch_up_steps: 30,
            ..Self::default()
        }
    }

    /// The step parameters resimulation uses until `tick` supplies real ones.
    #[must_use]
    pub fn initial_step_params(&self) -> StepParams {
        StepParams::new(self.initial_dt, self.half_size, self.initial_bounds)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ReboundError::InvalidConfig`] naming the first field out of range.
    pub fn validate(&self) -> ReboundResult<()> {
        if !self.half_size.is_finite() || self.half_size < 0.0 {
            return Err(ReboundError::InvalidConfig {
                field: "half_size",
                reason: format!("must be finite and non-negative, got {}", self.half_size),
            });
        }

        if self.history_capacity == 0 || self.history_capacity > MAX_HISTORY_CAPACITY {
            return Err(ReboundError::InvalidConfig {
                field: "history_capacity",
                reason: format!(
                    "must be between 1 and {}, got {}",
                    MAX_HISTORY_CAPACITY, self.history_capacity
                ),
            });
        }

        let steps = self.max_catch_up_steps as usize;
        if steps == 0 || steps > self.history_capacity {
            return Err(ReboundError::InvalidConfig {
                field: "max_catch_up_steps",
                reason: format!(
                    "must be between 1 and history_capacity {}, got {}",
                    self.history_capacity, self.max_catch_up_steps
                ),
            });
        }

        if !self.initial_dt.is_finite() || self.initial_dt < 0.0 {
            return Err(ReboundError::InvalidConfig {
                field: "initial_dt",
                reason: format!("must be finite and non-negative, got {}", self.initial_dt),
            });
        }

        let extent = self.initial_bounds.extent;
        if !(extent.x.is_finite() && extent.y.is_finite())
            || extent.x < self.half_size
            || extent.y < self.half_size
        {
            return Err(ReboundError::InvalidConfig {
                field: "initial_bounds",
                reason: format!(
                    "extent {} must be finite and at least half_size {}",
                    extent, self.half_size
                ),
            });
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

    #[test]
    fn presets_validate() {
        for config in [
            EntityConfig::default(),
            EntityConfig::tick_difference(),
            EntityConfig::high_latency(),
            EntityConfig::lan(),
        ] {
            assert!(config.validate().is_ok(), "{config:?}");
        }
    }

    #[test]
    fn tick_difference_preset_only_changes_policy() {
        let preset = EntityConfig::tick_difference();
        assert_eq!(preset.catch_up, CatchUpPolicy::TickDifference);
        assert_eq!(
            EntityConfig {
                catch_up: CatchUpPolicy::RttAware,
                ..preset
            },
            EntityConfig::default()
        );
    }

    macro_rules! rejects {
        ($name:ident, $field:literal, $mutate:expr) => {
            #[test]
            fn $name() {
                let mut config = EntityConfig::default();
                #[allow(clippy::redundant_closure_call)]
                ($mutate)(&mut config);
                match config.validate() {
                    Err(ReboundError::InvalidConfig { field, .. }) => assert_eq!(field, $field),
                    other => panic!("expected InvalidConfig for {}, got {:?}", $field, other),
                }
            }
        };
    }

    rejects!(rejects_negative_half_size, "half_size", |c: &mut EntityConfig| c.half_size = -1.0);
    rejects!(rejects_nan_half_size, "half_size", |c: &mut EntityConfig| c.half_size = f32::NAN);
    rejects!(rejects_zero_history, "history_capacity", |c: &mut EntityConfig| c
        .history_capacity = 0);
    rejects!(rejects_huge_history, "history_capacity", |c: &mut EntityConfig| c
        .history_capacity = 1 << 20);
    rejects!(rejects_zero_catch_up, "max_catch_up_steps", |c: &mut EntityConfig| c
        .max_catch_up_steps = 0);
    rejects!(rejects_cap_beyond_history, "max_catch_up_steps", |c: &mut EntityConfig| {
        c.history_capacity = 64;
        c.max_catch_up_steps = 65;
    });
    rejects!(rejects_infinite_dt, "initial_dt", |c: &mut EntityConfig| c.initial_dt =
        f32::INFINITY);
    rejects!(rejects_bounds_smaller_than_entity, "initial_bounds", |c: &mut EntityConfig| {
        c.half_size = 2.0;
        c.initial_bounds = Bounds::new(1.0, 10.0);
    });

    #[test]
    fn cap_equal_to_history_is_accepted() {
        let config = EntityConfig {
            history_capacity: 64,
            max_catch_up_steps: 64,
            ..EntityConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn initial_step_params_come_from_config() {
        let config = EntityConfig {
            half_size: 1.5,
            initial_dt: 0.1,
            ..EntityConfig::default()
        };
        let params = config.initial_step_params();
        assert_eq!(params, StepParams::new(0.1, 1.5, Bounds::new(10.0, 10.0)));
    }
}
