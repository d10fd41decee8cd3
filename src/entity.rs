//! The per-entity orchestrator the host calls once per fixed tick.
//!
//! A [`PredictedEntity`] plays exactly one [`EntityRole`], fixed at spawn:
//!
//! - **Server**: steps the authoritative value once per tick and publishes it through its
//!   [`AuthoritativeChannel`]. It never rolls back.
//! - **Remote client**: renders the replicated authoritative value. It keeps the previous
//!   value so the host can interpolate between the two.
//! - **Owning client**: predicts ahead of the server using its [`CatchUpPolicy`], records
//!   every predicted state in a [`HistoryLog`], and reconciles against each authoritative
//!   update it receives.
//!
//! Passing `suspended = true` to [`PredictedEntity::tick`] is an exact no-op for every role.
//!
//! [`CatchUpPolicy`]: crate::CatchUpPolicy

use std::sync::Arc;

use tracing::{debug, trace};

use crate::catch_up::CatchUpInput;
use crate::clock::{Arena, TickClock};
use crate::config::EntityConfig;
use crate::error::{ReboundError, ReboundResult};
use crate::history::HistoryLog;
use crate::physics::StepParams;
use crate::reconcile::{ReconcileOutcome, ReconcileStats, ReconciliationEngine};
use crate::replication::{AuthoritativeChannel, ChangeObserver, SubscriptionId};
use crate::report_violation_to;
use crate::state::{Bounds, EntityState, TickState, Vec2};
use crate::telemetry::{
    InvariantChecker, InvariantViolation, ViolationKind, ViolationObserver, ViolationSeverity,
};
use crate::{EntityRole, PeerId, Tick};

/// Counters describing what an entity has done so far.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct EntityStats {
    /// Calls to `tick` that simulated (suspended calls excluded).
    pub ticks: u64,
    /// Calls to `tick` skipped because the simulation was suspended.
    pub suspended_ticks: u64,
    /// Physics steps run by `tick`, not counting resimulation.
    pub steps: u64,
    /// Times an owning client re-seeded from the authoritative value.
    pub hard_catch_ups: u64,
    /// Times the catch-up step cap was hit.
    pub clamped_catch_ups: u64,
    /// Authoritative notifications older than the cached value.
    pub stale_notifications: u64,
    /// Reconciliation counters (owning clients only).
    pub reconcile: ReconcileStats,
}

#[derive(Debug)]
enum RoleState {
    Server {
        channel: AuthoritativeChannel,
    },
    RemoteClient {
        previous: TickState,
    },
    OwningClient {
        local: TickState,
        history: HistoryLog,
        engine: ReconciliationEngine,
        last_clock_tick: Tick,
        deferred_steps: u32,
    },
}

/// One simulated entity, as seen by one process.
///
/// Build one with [`EntityBuilder`](crate::EntityBuilder) or the `spawn_*` constructors.
pub struct PredictedEntity {
    role: RoleState,
    authoritative: TickState,
    config: EntityConfig,
    server_peer: PeerId,
    last_params: StepParams,
    stats: EntityStats,
    violation_observer: Option<Arc<dyn ViolationObserver>>,
}

impl PredictedEntity {
    /// Creates the server-side entity whose authoritative value starts at `tick`.
    ///
    /// # Errors
    ///
    /// Returns [`ReboundError::InvalidConfig`] if `config` does not validate.
    pub fn spawn_authoritative(
        position: Vec2,
        velocity: Vec2,
        tick: Tick,
        config: EntityConfig,
    ) -> ReboundResult<Self> {
        config.validate()?;
        let initial = TickState::new(tick, EntityState::new(position, velocity));
        Ok(Self {
            role: RoleState::Server {
                channel: AuthoritativeChannel::new(initial),
            },
            authoritative: initial,
            last_params: config.initial_step_params(),
            config,
            server_peer: PeerId::default(),
            stats: EntityStats::default(),
            violation_observer: None,
        })
    }

    /// Creates a client-side entity seeded from the first authoritative value it received.
    ///
    /// # Errors
    ///
    /// Returns [`ReboundError::InvalidRequest`] for [`EntityRole::Server`], which must use
    /// [`spawn_authoritative`](Self::spawn_authoritative), and
    /// [`ReboundError::InvalidConfig`] if `config` does not validate.
    pub fn spawn_client(
        role: EntityRole,
        first: TickState,
        config: EntityConfig,
    ) -> ReboundResult<Self> {
        config.validate()?;
        let role = match role {
            EntityRole::Server => {
                return Err(ReboundError::InvalidRequest {
                    info: "server entities are created with spawn_authoritative".to_owned(),
                });
            },
            EntityRole::RemoteClient => RoleState::RemoteClient { previous: first },
            EntityRole::OwningClient => RoleState::OwningClient {
                local: first,
                history: HistoryLog::new(config.history_capacity),
                engine: ReconciliationEngine::new(),
                last_clock_tick: first.tick,
                deferred_steps: 0,
            },
        };
        Ok(Self {
            role,
            authoritative: first,
            last_params: config.initial_step_params(),
            config,
            server_peer: PeerId::default(),
            stats: EntityStats::default(),
            violation_observer: None,
        })
    }

    pub(crate) fn set_server_peer(&mut self, peer: PeerId) {
        self.server_peer = peer;
    }

    pub(crate) fn set_violation_observer(&mut self, observer: Option<Arc<dyn ViolationObserver>>) {
        if let RoleState::OwningClient { history, .. } = &mut self.role {
            history.set_violation_observer(observer.clone());
        }
        if let RoleState::Server { channel } = &mut self.role {
            channel.set_violation_observer(observer.clone());
        }
        self.violation_observer = observer;
    }

    /// Runs one fixed tick and returns the state to render.
    ///
    /// `dt`, `bounds` and `suspended` come from the host; `clock` supplies the local tick,
    /// the tick rate and the RTT to the server peer.
    ///
    /// # Errors
    ///
    /// Returns [`ReboundError::OutOfOrderHistory`] if a predicted state could not be
    /// recorded. That indicates a broken invariant; the entity should be despawned.
    ///
    /// Returns [`ReboundError::InternalError`] without changing any state if stepping
    /// would carry a tick past `i32::MAX`.
    pub fn tick<C: TickClock + ?Sized>(
        &mut self,
        clock: &C,
        dt: f32,
        bounds: Bounds,
        suspended: bool,
    ) -> ReboundResult<EntityState> {
        if suspended {
            // The clock keeps running while frozen; those ticks are not owed afterwards.
            if let RoleState::OwningClient {
                last_clock_tick, ..
            } = &mut self.role
            {
                *last_clock_tick = clock.local_tick();
            }
            self.stats.suspended_ticks += 1;
            trace!(role = %self.role(), "simulation suspended, skipping tick");
            return Ok(self.current_state());
        }

        let params = StepParams::new(dt, self.config.half_size, bounds);

        match &mut self.role {
            RoleState::Server { channel } => {
                overflow_check(self.authoritative.tick, 1)?;
                self.last_params = params;
                self.stats.ticks += 1;
                let next = params.apply(&self.authoritative);
                self.authoritative = next;
                self.stats.steps += 1;
                trace!(tick = %next.tick, position = %next.position, "server step");
                channel.publish(next);
                Ok(next.state())
            },
            RoleState::RemoteClient { .. } => {
                self.last_params = params;
                self.stats.ticks += 1;
                Ok(self.authoritative.state())
            },
            RoleState::OwningClient {
                local,
                history,
                last_clock_tick,
                deferred_steps,
                ..
            } => {
                let clock_tick = clock.local_tick();
                let input = CatchUpInput {
                    local_tick: local.tick,
                    authoritative_tick: self.authoritative.tick,
                    clock_tick,
                    last_clock_tick: *last_clock_tick,
                    deferred_steps: *deferred_steps,
                    rtt: clock.current_rtt(self.server_peer),
                    tick_rate: clock.tick_rate(),
                };
                let plan = self
                    .config
                    .catch_up
                    .plan(&input, self.config.max_catch_up_steps);
                let start = if plan.reseeds() {
                    self.authoritative.tick
                } else {
                    local.tick
                };
                overflow_check(start, plan.steps)?;
                self.last_params = params;
                self.stats.ticks += 1;
                *last_clock_tick = clock_tick;
                *deferred_steps = plan.deferred;

                if plan.is_clamped() {
                    self.stats.clamped_catch_ups += 1;
                    report_violation_to!(
                        &self.violation_observer,
                        ViolationSeverity::Warning,
                        ViolationKind::CatchUp,
                        tick = local.tick,
                        "catch-up of {} steps clamped to {}, {} deferred",
                        plan.requested,
                        plan.steps,
                        plan.deferred
                    );
                }

                if plan.reseeds() {
                    self.stats.hard_catch_ups += 1;
                    debug!(
                        local_tick = %local.tick,
                        authoritative_tick = %self.authoritative.tick,
                        steps = plan.steps,
                        "hard catch-up from authoritative state"
                    );
                    history.clear();
                    *local = self.authoritative;
                }

                for _ in 0..plan.steps {
                    *local = params.apply(local);
                    history.append(*local)?;
                }
                self.stats.steps += u64::from(plan.steps);
                let rendered = local.state();

                crate::debug_check_invariants!(self, &self.violation_observer, "after owning client tick");
                Ok(rendered)
            },
        }
    }

    /// [`tick`](Self::tick) with bounds and the suspend flag read from `arena`.
    ///
    /// # Errors
    ///
    /// Same as [`tick`](Self::tick).
    pub fn advance<C, A>(&mut self, clock: &C, arena: &A, dt: f32) -> ReboundResult<EntityState>
    where
        C: TickClock + ?Sized,
        A: Arena + ?Sized,
    {
        self.tick(clock, dt, arena.bounds(), arena.is_suspended())
    }

    /// Handles one `(previous, current)` notification from the replication channel.
    ///
    /// Notifications older than the cached authoritative value are ignored and reported as a
    /// `Replication` warning; the cached value never moves backwards.
    ///
    /// # Errors
    ///
    /// Returns [`ReboundError::InvalidRequest`] on the server, which is the source of these
    /// notifications, and propagates history errors from reconciliation.
    pub fn on_authoritative_changed(
        &mut self,
        previous: &TickState,
        current: &TickState,
    ) -> ReboundResult<ReconcileOutcome> {
        if matches!(self.role, RoleState::Server { .. }) {
            return Err(ReboundError::InvalidRequest {
                info: "the server does not receive authoritative notifications".to_owned(),
            });
        }

        if current.tick < self.authoritative.tick {
            self.stats.stale_notifications += 1;
            report_violation_to!(
                &self.violation_observer,
                ViolationSeverity::Warning,
                ViolationKind::Replication,
                tick = current.tick,
                "notification for tick {} arrived after tick {}",
                current.tick,
                self.authoritative.tick
            );
            return Ok(ReconcileOutcome::NoMatch);
        }

        if previous.tick != self.authoritative.tick {
            trace!(
                cached = %self.authoritative.tick,
                previous = %previous.tick,
                current = %current.tick,
                "gap in authoritative notifications"
            );
        }

        let cached = std::mem::replace(&mut self.authoritative, *current);
        match &mut self.role {
            RoleState::Server { .. } => Err(ReboundError::InternalError {
                context: "server role reached notification handling".to_owned(),
            }),
            RoleState::RemoteClient { previous: prior } => {
                *prior = cached;
                Ok(ReconcileOutcome::NoMatch)
            },
            RoleState::OwningClient {
                local,
                history,
                engine,
                ..
            } => {
                let outcome = engine.on_authoritative(current, history, local, &self.last_params)?;
                crate::debug_check_invariants!(self, &self.violation_observer, "after reconciliation");
                Ok(outcome)
            },
        }
    }

    /// Subscribes `observer` to the server's authoritative value.
    ///
    /// # Errors
    ///
    /// Returns [`ReboundError::InvalidRequest`] for client roles.
    pub fn subscribe(&mut self, observer: Arc<dyn ChangeObserver>) -> ReboundResult<SubscriptionId> {
        let role = self.role();
        match &mut self.role {
            RoleState::Server { channel } => Ok(channel.subscribe(observer)),
            _ => Err(ReboundError::InvalidRequest {
                info: format!("only the server can be subscribed to, this is a {}", role),
            }),
        }
    }

    /// The server's replication channel, if this is the server.
    #[must_use]
    pub fn channel_mut(&mut self) -> Option<&mut AuthoritativeChannel> {
        match &mut self.role {
            RoleState::Server { channel } => Some(channel),
            _ => None,
        }
    }

    /// The role fixed at spawn.
    #[must_use]
    pub fn role(&self) -> EntityRole {
        match self.role {
            RoleState::Server { .. } => EntityRole::Server,
            RoleState::RemoteClient { .. } => EntityRole::RemoteClient,
            RoleState::OwningClient { .. } => EntityRole::OwningClient,
        }
    }

    /// The local prediction for an owning client, the authoritative value otherwise.
    #[must_use]
    pub fn current_state(&self) -> EntityState {
        match &self.role {
            RoleState::OwningClient { local, .. } => local.state(),
            _ => self.authoritative.state(),
        }
    }

    /// Position half of [`current_state`](Self::current_state).
    #[must_use]
    pub fn current_position(&self) -> Vec2 {
        self.current_state().position
    }

    /// Velocity half of [`current_state`](Self::current_state).
    #[must_use]
    pub fn current_velocity(&self) -> Vec2 {
        self.current_state().velocity
    }

    /// The latest authoritative value this entity knows of.
    #[must_use]
    pub fn authoritative(&self) -> &TickState {
        &self.authoritative
    }

    /// The live prediction, for owning clients.
    #[must_use]
    pub fn local_prediction(&self) -> Option<&TickState> {
        match &self.role {
            RoleState::OwningClient { local, .. } => Some(local),
            _ => None,
        }
    }

    /// Unconfirmed predictions, for owning clients.
    #[must_use]
    pub fn history(&self) -> Option<&HistoryLog> {
        match &self.role {
            RoleState::OwningClient { history, .. } => Some(history),
            _ => None,
        }
    }

    /// Position between the previous and the current authoritative value, for remote
    /// clients rendering between updates. `alpha` is clamped to `[0, 1]`. Other roles return
    /// [`current_position`](Self::current_position).
    #[must_use]
    pub fn interpolated_position(&self, alpha: f32) -> Vec2 {
        match &self.role {
            RoleState::RemoteClient { previous } => {
                previous.position.lerp(self.authoritative.position, alpha)
            },
            _ => self.current_position(),
        }
    }

    /// Running counters.
    #[must_use]
    pub fn stats(&self) -> EntityStats {
        let mut stats = self.stats;
        if let RoleState::OwningClient { engine, .. } = &self.role {
            stats.reconcile = *engine.stats();
        }
        stats
    }

    /// The configuration this entity was spawned with.
    #[must_use]
    pub fn config(&self) -> &EntityConfig {
        &self.config
    }

    /// The peer whose RTT drives the catch-up policy.
    #[must_use]
    pub fn server_peer(&self) -> PeerId {
        self.server_peer
    }

    /// The observer violations are reported to, if one was set.
    #[must_use]
    pub fn violation_observer(&self) -> Option<&Arc<dyn ViolationObserver>> {
        self.violation_observer.as_ref()
    }
}

/// Fails if `steps` steps from `start` would leave the `i32` tick range.
fn overflow_check(start: Tick, steps: u32) -> ReboundResult<()> {
    let last = i32::try_from(steps)
        .ok()
        .and_then(|steps| start.checked_add(steps));
    if last.is_some() {
        return Ok(());
    }
    Err(ReboundError::InternalError {
        context: format!("stepping {steps} ticks from tick {start} overflows the tick counter"),
    })
}

impl std::fmt::Debug for PredictedEntity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self {
            role,
            authoritative,
            config,
            server_peer,
            last_params,
            stats,
            violation_observer,
        } = self;
        f.debug_struct("PredictedEntity")
            .field("role", role)
            .field("authoritative", authoritative)
            .field("config", config)
            .field("server_peer", server_peer)
            .field("last_params", last_params)
            .field("stats", stats)
            .field("has_violation_observer", &violation_observer.is_some())
            .finish()
    }
}

impl InvariantChecker for PredictedEntity {
    fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if let RoleState::OwningClient { local, history, .. } = &self.role {
            history.check_invariants()?;
            if let Some(newest) = history.newest() {
                if newest != local {
                    return Err(InvariantViolation::new(
                        "PredictedEntity",
                        "newest history entry must equal the live prediction",
                    )
                    .with_details(format!("history tick {}, local tick {}", newest.tick, local.tick)));
                }
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
    clippy::indexing_slicing,
    clippy::float_cmp
)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, StaticArena};
    use crate::telemetry::CollectingObserver;
    use crate::CatchUpPolicy;
    use web_time::Duration;

    const BOUNDS: Bounds = Bounds::new(10.0, 10.0);
    const DT: f32 = 0.5;

    fn config() -> EntityConfig {
        EntityConfig {
            half_size: 1.0,
            ..EntityConfig::default()
        }
    }

    fn first() -> TickState {
        TickState::new(
            Tick::new(0),
            EntityState::new(Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.5)),
        )
    }

    fn owning() -> PredictedEntity {
        PredictedEntity::spawn_client(EntityRole::OwningClient, first(), config()).unwrap()
    }

    #[test]
    fn server_steps_once_per_tick_and_publishes() {
        let clock = ManualClock::new(60);
        let mut server = PredictedEntity::spawn_authoritative(
            Vec2::ZERO,
            Vec2::new(2.0, 0.0),
            Tick::new(0),
            config(),
        )
        .unwrap();

        for expected in 1..=3 {
            server.tick(&clock, DT, BOUNDS, false).unwrap();
            assert_eq!(server.authoritative().tick, Tick::new(expected));
        }
        assert_eq!(server.current_position(), Vec2::new(3.0, 0.0));
        let published = *server.channel_mut().unwrap().value();
        assert_eq!(&published, server.authoritative());
        assert!(server.history().is_none());
    }

    #[test]
    fn server_rejects_notifications() {
        let mut server =
            PredictedEntity::spawn_authoritative(Vec2::ZERO, Vec2::ZERO, Tick::new(0), config())
                .unwrap();
        let err = server.on_authoritative_changed(&first(), &first()).unwrap_err();
        assert!(matches!(err, ReboundError::InvalidRequest { .. }));
    }

    #[test]
    fn spawn_client_rejects_server_role() {
        let err = PredictedEntity::spawn_client(EntityRole::Server, first(), config()).unwrap_err();
        assert!(matches!(err, ReboundError::InvalidRequest { .. }));
    }

    #[test]
    fn spawn_validates_config() {
        let bad = EntityConfig {
            history_capacity: 0,
            ..config()
        };
        assert!(PredictedEntity::spawn_client(EntityRole::OwningClient, first(), bad).is_err());
    }

    #[test]
    fn owning_client_with_zero_rtt_predicts_one_step_per_tick() {
        let mut clock = ManualClock::new(60);
        let mut client = owning();

        for expected in 1..=4 {
            clock.advance();
            client.tick(&clock, DT, BOUNDS, false).unwrap();
            assert_eq!(client.local_prediction().unwrap().tick, Tick::new(expected));
        }
        let history = client.history().unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history.newest(), client.local_prediction());
        assert_eq!(client.stats().steps, 4);
        assert_eq!(client.stats().hard_catch_ups, 0);
    }

    #[test]
    fn owning_client_hard_catches_up_with_large_rtt() {
        let mut clock = ManualClock::new(60);
        // 100ms at 60Hz: six ticks of lag
        clock.set_rtt(PeerId::default(), Duration::from_millis(100));
        let mut client = owning();

        client.tick(&clock, DT, BOUNDS, false).unwrap();

        let local = *client.local_prediction().unwrap();
        assert_eq!(local.tick, Tick::new(6));
        let mut expected = first();
        for _ in 0..6 {
            expected = StepParams::new(DT, 1.0, BOUNDS).apply(&expected);
        }
        assert_eq!(local, expected);
        assert_eq!(client.history().unwrap().len(), 6);
        assert_eq!(client.stats().hard_catch_ups, 1);

        // now six ahead of the authoritative value: steady state
        client.tick(&clock, DT, BOUNDS, false).unwrap();
        assert_eq!(client.local_prediction().unwrap().tick, Tick::new(7));
        assert_eq!(client.stats().hard_catch_ups, 1);
    }

    #[test]
    fn clamped_catch_up_is_reported() {
        let observer = Arc::new(CollectingObserver::new());
        let mut clock = ManualClock::new(60);
        clock.set_rtt(PeerId::default(), Duration::from_secs(2));
        let mut client = PredictedEntity::spawn_client(
            EntityRole::OwningClient,
            first(),
            EntityConfig {
                max_catch_up_steps: 10,
                ..config()
            },
        )
        .unwrap();
        client.set_violation_observer(Some(observer.clone()));

        client.tick(&clock, DT, BOUNDS, false).unwrap();
        assert_eq!(client.local_prediction().unwrap().tick, Tick::new(10));
        assert_eq!(client.stats().clamped_catch_ups, 1);
        crate::assert_violation!(observer, ViolationKind::CatchUp);
    }

    #[test]
    fn clamped_catch_up_finishes_without_reseeding() {
        let mut clock = ManualClock::new(60);
        // two seconds at 60Hz: 120 ticks of lag against a cap of 10
        clock.set_rtt(PeerId::default(), Duration::from_secs(2));
        let mut client = PredictedEntity::spawn_client(
            EntityRole::OwningClient,
            first(),
            EntityConfig {
                max_catch_up_steps: 10,
                ..config()
            },
        )
        .unwrap();

        // 10 now, then 9 more per tick on top of the regular step, 3 on the last
        for _ in 0..14 {
            client.tick(&clock, DT, BOUNDS, false).unwrap();
            assert!(client.history().unwrap().check_invariants().is_ok());
        }
        assert_eq!(client.local_prediction().unwrap().tick, Tick::new(133));
        assert_eq!(client.stats().hard_catch_ups, 1);
        assert_eq!(client.stats().clamped_catch_ups, 13);

        let mut expected = first();
        for _ in 0..133 {
            expected = StepParams::new(DT, 1.0, BOUNDS).apply(&expected);
        }
        assert_eq!(*client.local_prediction().unwrap(), expected);

        // caught up: single steps from here on
        client.tick(&clock, DT, BOUNDS, false).unwrap();
        assert_eq!(client.local_prediction().unwrap().tick, Tick::new(134));
        assert_eq!(client.stats().hard_catch_ups, 1);
        assert_eq!(client.stats().clamped_catch_ups, 13);
    }

    #[test]
    fn tick_difference_policy_tracks_clock() {
        let mut clock = ManualClock::new(60);
        clock.set_tick(Tick::new(5));
        let mut client = PredictedEntity::spawn_client(
            EntityRole::OwningClient,
            first(),
            EntityConfig {
                catch_up: CatchUpPolicy::TickDifference,
                ..config()
            },
        )
        .unwrap();

        client.tick(&clock, DT, BOUNDS, false).unwrap();
        assert_eq!(client.local_prediction().unwrap().tick, Tick::new(5));

        // clock has not moved: nothing to do
        client.tick(&clock, DT, BOUNDS, false).unwrap();
        assert_eq!(client.local_prediction().unwrap().tick, Tick::new(5));
        assert_eq!(client.history().unwrap().len(), 5);
    }

    #[test]
    fn tick_difference_does_not_owe_suspended_ticks() {
        let mut clock = ManualClock::new(60);
        let mut client = PredictedEntity::spawn_client(
            EntityRole::OwningClient,
            first(),
            EntityConfig {
                catch_up: CatchUpPolicy::TickDifference,
                ..config()
            },
        )
        .unwrap();

        for _ in 0..3 {
            clock.advance();
            client.tick(&clock, DT, BOUNDS, false).unwrap();
        }
        let frozen = *client.local_prediction().unwrap();
        assert_eq!(frozen.tick, Tick::new(3));

        for _ in 0..5 {
            clock.advance();
            client.tick(&clock, DT, BOUNDS, true).unwrap();
        }
        assert_eq!(*client.local_prediction().unwrap(), frozen);

        clock.advance();
        client.tick(&clock, DT, BOUNDS, false).unwrap();
        assert_eq!(client.local_prediction().unwrap().tick, Tick::new(4));
        assert_eq!(client.stats().steps, 4);
    }

    #[test]
    fn server_at_last_tick_refuses_to_step() {
        let clock = ManualClock::new(60);
        let mut server = PredictedEntity::spawn_authoritative(
            Vec2::ZERO,
            Vec2::new(1.0, 0.0),
            Tick::new(i32::MAX),
            config(),
        )
        .unwrap();

        let err = server.tick(&clock, DT, BOUNDS, false).unwrap_err();
        assert!(matches!(err, ReboundError::InternalError { .. }));
        assert_eq!(server.authoritative().tick, Tick::new(i32::MAX));
        assert_eq!(server.stats().ticks, 0);
    }

    #[test]
    fn owning_client_at_last_tick_refuses_to_step() {
        let mut clock = ManualClock::new(60);
        let start = TickState::new(Tick::new(i32::MAX - 1), first().state());
        let mut client =
            PredictedEntity::spawn_client(EntityRole::OwningClient, start, config()).unwrap();

        clock.advance();
        client.tick(&clock, DT, BOUNDS, false).unwrap();
        let last = *client.local_prediction().unwrap();
        assert_eq!(last.tick, Tick::new(i32::MAX));

        clock.advance();
        let err = client.tick(&clock, DT, BOUNDS, false).unwrap_err();
        assert!(matches!(err, ReboundError::InternalError { .. }));
        assert_eq!(*client.local_prediction().unwrap(), last);
        assert_eq!(client.history().unwrap().len(), 1);
        assert_eq!(client.stats().ticks, 1);
    }

    #[test]
    fn suspended_tick_changes_nothing() {
        let mut clock = ManualClock::new(60);
        let mut client = owning();
        clock.advance();
        client.tick(&clock, DT, BOUNDS, false).unwrap();

        let local = *client.local_prediction().unwrap();
        let history: Vec<TickState> = client.history().unwrap().iter().copied().collect();
        let auth = *client.authoritative();

        clock.advance();
        let rendered = client.tick(&clock, DT, BOUNDS, true).unwrap();

        assert_eq!(rendered, local.state());
        assert_eq!(*client.local_prediction().unwrap(), local);
        assert_eq!(
            client.history().unwrap().iter().copied().collect::<Vec<_>>(),
            history
        );
        assert_eq!(*client.authoritative(), auth);
        assert_eq!(client.stats().suspended_ticks, 1);
    }

    #[test]
    fn suspended_server_does_not_advance() {
        let clock = ManualClock::new(60);
        let mut server =
            PredictedEntity::spawn_authoritative(Vec2::ZERO, Vec2::new(1.0, 1.0), Tick::new(3), config())
                .unwrap();
        server.tick(&clock, DT, BOUNDS, true).unwrap();
        assert_eq!(server.authoritative().tick, Tick::new(3));
        assert_eq!(server.current_position(), Vec2::ZERO);
    }

    #[test]
    fn advance_reads_arena() {
        let clock = ManualClock::new(60);
        let mut arena = StaticArena::new(BOUNDS);
        let mut server =
            PredictedEntity::spawn_authoritative(Vec2::ZERO, Vec2::new(1.0, 0.0), Tick::new(0), config())
                .unwrap();

        arena.suspended = true;
        server.advance(&clock, &arena, DT).unwrap();
        assert_eq!(server.authoritative().tick, Tick::new(0));

        arena.suspended = false;
        server.advance(&clock, &arena, DT).unwrap();
        assert_eq!(server.authoritative().tick, Tick::new(1));
    }

    #[test]
    fn owning_client_corrects_on_divergent_update() {
        let mut clock = ManualClock::new(60);
        let mut client = owning();
        for _ in 0..3 {
            clock.advance();
            client.tick(&clock, DT, BOUNDS, false).unwrap();
        }

        let predicted = *client.history().unwrap().peek_oldest().unwrap();
        let mut server_state = predicted;
        server_state.velocity = Vec2::new(-1.0, 0.5);

        let outcome = client
            .on_authoritative_changed(&first(), &server_state)
            .unwrap();
        assert!(outcome.is_correction());

        let params = StepParams::new(DT, 1.0, BOUNDS);
        let expected = params.apply(&params.apply(&server_state));
        assert_eq!(*client.local_prediction().unwrap(), expected);
        assert_eq!(client.authoritative(), &server_state);
        assert_eq!(client.stats().reconcile.corrections, 1);
    }

    #[test]
    fn owning_client_confirms_matching_update() {
        let mut clock = ManualClock::new(60);
        let mut client = owning();
        for _ in 0..3 {
            clock.advance();
            client.tick(&clock, DT, BOUNDS, false).unwrap();
        }
        let local = *client.local_prediction().unwrap();
        let confirmed = *client.history().unwrap().peek_oldest().unwrap();

        let outcome = client.on_authoritative_changed(&first(), &confirmed).unwrap();
        assert_eq!(outcome, ReconcileOutcome::Confirmed { tick: confirmed.tick });
        assert_eq!(*client.local_prediction().unwrap(), local);
    }

    #[test]
    fn stale_notification_never_regresses_authoritative() {
        let observer = Arc::new(CollectingObserver::new());
        let mut client = owning();
        client.set_violation_observer(Some(observer.clone()));

        let newer = TickState::new(Tick::new(8), first().state());
        client.on_authoritative_changed(&first(), &newer).unwrap();
        let older = TickState::new(Tick::new(4), first().state());
        let outcome = client.on_authoritative_changed(&first(), &older).unwrap();

        assert_eq!(outcome, ReconcileOutcome::NoMatch);
        assert_eq!(client.authoritative().tick, Tick::new(8));
        assert_eq!(client.stats().stale_notifications, 1);
        crate::assert_violation!(observer, ViolationKind::Replication);
    }

    #[test]
    fn remote_client_renders_authoritative_and_interpolates() {
        let clock = ManualClock::new(60);
        let mut remote =
            PredictedEntity::spawn_client(EntityRole::RemoteClient, first(), config()).unwrap();
        assert!(remote.local_prediction().is_none());

        let next = TickState::new(
            Tick::new(1),
            EntityState::new(Vec2::new(2.0, 4.0), Vec2::new(1.0, 0.5)),
        );
        remote.on_authoritative_changed(&first(), &next).unwrap();

        let rendered = remote.tick(&clock, DT, BOUNDS, false).unwrap();
        assert_eq!(rendered, next.state());
        assert_eq!(remote.interpolated_position(0.5), Vec2::new(1.0, 2.0));
        assert_eq!(remote.interpolated_position(1.0), next.position);
        assert_eq!(remote.authoritative().tick, Tick::new(1));
    }

    #[test]
    fn subscribe_only_on_server() {
        struct Nop;
        impl ChangeObserver for Nop {
            fn on_change(&self, _: &TickState, _: &TickState) {}
        }

        let mut client = owning();
        assert!(client.subscribe(Arc::new(Nop)).is_err());

        let mut server =
            PredictedEntity::spawn_authoritative(Vec2::ZERO, Vec2::ZERO, Tick::new(0), config())
                .unwrap();
        server.subscribe(Arc::new(Nop)).unwrap();
        assert_eq!(server.channel_mut().unwrap().subscriber_count(), 1);
    }

    #[test]
    fn invariants_hold_after_ticks_and_corrections() {
        let mut clock = ManualClock::new(60);
        let mut client = owning();
        for _ in 0..5 {
            clock.advance();
            client.tick(&clock, DT, BOUNDS, false).unwrap();
        }
        let mut auth = *client.history().unwrap().peek_oldest().unwrap();
        auth.position.x += 1.0;
        client.on_authoritative_changed(&first(), &auth).unwrap();
        assert!(client.check_invariants().is_ok());
    }
}
