use std::sync::Arc;

use crate::catch_up::CatchUpPolicy;
use crate::config::EntityConfig;
use crate::entity::PredictedEntity;
use crate::error::ReboundResult;
use crate::state::{Bounds, TickState, Vec2};
use crate::telemetry::ViolationObserver;
use crate::{EntityRole, PeerId, Tick};

/// The [`EntityBuilder`] builds every kind of [`PredictedEntity`].
///
/// After setting all appropriate values, call one of the `spawn_*` methods to consume the
/// builder. Each of them validates the configuration first.
///
/// ```
/// use rebound::{EntityBuilder, EntityRole, PeerId, Tick, TickState, EntityState, CatchUpPolicy};
/// use rebound::telemetry::CollectingObserver;
/// use std::sync::Arc;
///
/// let observer = Arc::new(CollectingObserver::new());
/// let first = TickState::new(Tick::new(0), EntityState::default());
///
/// let client = EntityBuilder::new()
///     .with_half_size(0.25)
///     .with_catch_up_policy(CatchUpPolicy::RttAware)
///     .with_history_capacity(128)
///     .with_max_catch_up_steps(120)
///     .with_server_peer(PeerId::new(7))
///     .with_violation_observer(observer.clone())
///     .spawn_owning_client(first)?;
///
/// assert_eq!(client.role(), EntityRole::OwningClient);
/// assert_eq!(client.history().map(|h| h.capacity()), Some(128));
/// # Ok::<(), rebound::ReboundError>(())
/// ```
#[must_use = "EntityBuilder must be consumed by calling a spawn_* method"]
#[derive(Default)]
pub struct EntityBuilder {
    config: EntityConfig,
    server_peer: PeerId,
    /// Optional observer for violations raised by the spawned entity.
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl std::fmt::Debug for EntityBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Destructure so a new field cannot be forgotten here.
        let Self {
            config,
            server_peer,
            violation_observer,
        } = self;

        f.debug_struct("EntityBuilder")
            .field("config", config)
            .field("server_peer", server_peer)
            .field("has_violation_observer", &violation_observer.is_some())
            .finish()
    }
}

impl EntityBuilder {
    /// Construct a new builder with all values set to their defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole configuration, for example with a preset.
    #[must_use]
    pub fn with_config(mut self, config: EntityConfig) -> Self {
        self.config = config;
        self
    }

    /// Radius (or half-extent) of the entity.
    #[must_use]
    pub fn with_half_size(mut self, half_size: f32) -> Self {
        self.config.half_size = half_size;
        self
    }

    /// Catch-up algorithm for owning clients.
    #[must_use]
    pub fn with_catch_up_policy(mut self, policy: CatchUpPolicy) -> Self {
        self.config.catch_up = policy;
        self
    }

    /// Number of unconfirmed predictions kept.
    #[must_use]
    pub fn with_history_capacity(mut self, capacity: usize) -> Self {
        self.config.history_capacity = capacity;
        self
    }

    /// Most physics steps a single tick may run.
    #[must_use]
    pub fn with_max_catch_up_steps(mut self, steps: u32) -> Self {
        self.config.max_catch_up_steps = steps;
        self
    }

    /// Step duration and world extent used by resimulation before the first tick.
    #[must_use]
    pub fn with_initial_step(mut self, dt: f32, bounds: Bounds) -> Self {
        self.config.initial_dt = dt;
        self.config.initial_bounds = bounds;
        self
    }

    /// The peer whose RTT the catch-up policy reads. Defaults to `PeerId::new(0)`.
    #[must_use]
    pub fn with_server_peer(mut self, peer: PeerId) -> Self {
        self.server_peer = peer;
        self
    }

    /// Sets a violation observer for the spawned entity.
    ///
    /// Without one, violations are logged through `tracing`.
    #[must_use]
    pub fn with_violation_observer(mut self, observer: Arc<dyn ViolationObserver>) -> Self {
        self.violation_observer = Some(observer);
        self
    }

    /// Consumes the builder to create the server's entity.
    ///
    /// # Errors
    ///
    /// Returns [`ReboundError::InvalidConfig`](crate::ReboundError::InvalidConfig) if the
    /// configuration does not validate.
    pub fn spawn_authoritative(
        self,
        position: Vec2,
        velocity: Vec2,
        tick: Tick,
    ) -> ReboundResult<PredictedEntity> {
        let entity = PredictedEntity::spawn_authoritative(position, velocity, tick, self.config)?;
        Ok(self.finish(entity))
    }

    /// Consumes the builder to create a predicting client entity from the first
    /// authoritative value it received.
    ///
    /// # Errors
    ///
    /// Returns [`ReboundError::InvalidConfig`](crate::ReboundError::InvalidConfig) if the
    /// configuration does not validate.
    pub fn spawn_owning_client(self, first: TickState) -> ReboundResult<PredictedEntity> {
        let entity = PredictedEntity::spawn_client(EntityRole::OwningClient, first, self.config)?;
        Ok(self.finish(entity))
    }

    /// Consumes the builder to create an observing client entity.
    ///
    /// # Errors
    ///
    /// Returns [`ReboundError::InvalidConfig`](crate::ReboundError::InvalidConfig) if the
    /// configuration does not validate.
    pub fn spawn_remote_client(self, first: TickState) -> ReboundResult<PredictedEntity> {
        let entity = PredictedEntity::spawn_client(EntityRole::RemoteClient, first, self.config)?;
        Ok(self.finish(entity))
    }

    fn finish(self, mut entity: PredictedEntity) -> PredictedEntity {
        entity.set_server_peer(self.server_peer);
        entity.set_violation_observer(self.violation_observer);
        entity
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
    use crate::state::EntityState;
    use crate::telemetry::CollectingObserver;
    use crate::ReboundError;

    fn first() -> TickState {
        TickState::new(Tick::new(3), EntityState::default())
    }

    #[test]
    fn setters_reach_the_entity() {
        let client = EntityBuilder::new()
            .with_half_size(2.0)
            .with_catch_up_policy(CatchUpPolicy::TickDifference)
            .with_history_capacity(16)
            .with_max_catch_up_steps(12)
            .with_initial_step(0.25, Bounds::new(20.0, 20.0))
            .with_server_peer(PeerId::new(4))
            .spawn_owning_client(first())
            .unwrap();

        let config = client.config();
        assert_eq!(config.half_size, 2.0);
        assert_eq!(config.catch_up, CatchUpPolicy::TickDifference);
        assert_eq!(config.max_catch_up_steps, 12);
        assert_eq!(config.initial_dt, 0.25);
        assert_eq!(client.history().unwrap().capacity(), 16);
        assert_eq!(client.server_peer(), PeerId::new(4));
    }

    #[test]
    fn spawn_methods_pick_roles() {
        let server = EntityBuilder::new()
            .spawn_authoritative(Vec2::ZERO, Vec2::ZERO, Tick::new(0))
            .unwrap();
        let remote = EntityBuilder::new().spawn_remote_client(first()).unwrap();
        let owning = EntityBuilder::new().spawn_owning_client(first()).unwrap();

        assert_eq!(server.role(), EntityRole::Server);
        assert_eq!(remote.role(), EntityRole::RemoteClient);
        assert_eq!(owning.role(), EntityRole::OwningClient);
        assert_eq!(owning.authoritative(), &first());
    }

    #[test]
    fn invalid_config_is_rejected_at_spawn() {
        let err = EntityBuilder::new()
            .with_half_size(f32::NAN)
            .spawn_remote_client(first())
            .unwrap_err();
        assert!(matches!(
            err,
            ReboundError::InvalidConfig {
                field: "half_size",
                ..
            }
        ));
    }

    #[test]
    fn observer_is_attached() {
        let observer = Arc::new(CollectingObserver::new());
        let entity = EntityBuilder::new()
            .with_violation_observer(observer)
            .spawn_owning_client(first())
            .unwrap();
        assert!(entity.violation_observer().is_some());
    }

    #[test]
    fn debug_does_not_print_observer() {
        let builder = EntityBuilder::new().with_violation_observer(Arc::new(CollectingObserver::new()));
        let text = format!("{builder:?}");
        assert!(text.contains("has_violation_observer: true"));
    }
}
