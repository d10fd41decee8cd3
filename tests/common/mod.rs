//! Common test infrastructure shared across integration tests.
//!
//! [`Harness`] wires one server, one owning client and a [`DelayedLink`] between them, all
//! driven by a single [`ManualClock`]. Each [`Harness::step`]:
//!
//! 1. advances the clock,
//! 2. steps the server (which publishes into the link),
//! 3. pumps every notification due at the new tick into the client,
//! 4. ticks the client.
//!
//! # Usage
//!
//! ```ignore
//! mod common;
//! use common::{Harness, rtt_for_latency};
//! ```

#![allow(dead_code)]

use std::sync::{Arc, Once};

use parking_lot::Mutex;
use rebound::prelude::*;
use rebound::telemetry::CollectingObserver;
use rebound::{EntityStats, LinkStats, StepParams};
use web_time::Duration;

/// Simulation rate used by every harness.
pub const TICK_RATE: u32 = 60;

/// Seconds per tick.
pub const DT: f32 = 1.0 / 60.0;

/// Fast enough to hit a wall every few ticks in a 10x10 arena.
pub const FAST_VELOCITY: Vec2 = Vec2::new(120.0, 90.0);

/// Default arena half-extent.
pub const ARENA: Bounds = Bounds::new(10.0, 10.0);

/// Installs a test-writer tracing subscriber once per test binary.
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

/// An RTT whose server lag is exactly `2 * latency_ticks` at [`TICK_RATE`].
pub fn rtt_for_latency(latency_ticks: u32) -> Duration {
    let micros = u64::from(2 * latency_ticks) * 1_000_000;
    Duration::from_micros(micros.div_ceil(u64::from(TICK_RATE)))
}

/// One server, one owning client and the link between them.
pub struct Harness {
    pub clock: ManualClock,
    pub server_arena: StaticArena,
    pub client_arena: StaticArena,
    pub server: PredictedEntity,
    pub client: Arc<Mutex<PredictedEntity>>,
    pub link: Arc<DelayedLink>,
    pub observer: Arc<CollectingObserver>,
}

impl Harness {
    /// A harness whose entity starts at the origin with [`FAST_VELOCITY`].
    pub fn new(link: LinkConfig, config: EntityConfig) -> ReboundResult<Self> {
        Self::with_start(link, config, Vec2::ZERO, FAST_VELOCITY)
    }

    /// A harness with an explicit starting position and velocity.
    pub fn with_start(
        link: LinkConfig,
        config: EntityConfig,
        position: Vec2,
        velocity: Vec2,
    ) -> ReboundResult<Self> {
        init_tracing();
        let observer = Arc::new(CollectingObserver::new());

        let mut server = EntityBuilder::new()
            .with_config(config)
            .with_violation_observer(observer.clone())
            .spawn_authoritative(position, velocity, Tick::new(0))?;

        let client = EntityBuilder::new()
            .with_config(config)
            .with_server_peer(PeerId::new(0))
            .with_violation_observer(observer.clone())
            .spawn_owning_client(*server.authoritative())?;
        let client = Arc::new(Mutex::new(client));

        let link = Arc::new(DelayedLink::new(link));
        server.subscribe(link.clone())?;

        Ok(Self {
            clock: ManualClock::new(TICK_RATE),
            server_arena: StaticArena::new(ARENA),
            client_arena: StaticArena::new(ARENA),
            server,
            client,
            link,
            observer,
        })
    }

    /// Sets the RTT the client's catch-up policy sees.
    pub fn set_rtt(&mut self, rtt: Duration) {
        self.clock.set_rtt(PeerId::new(0), rtt);
    }

    /// Sets the RTT to match a link latency of `latency_ticks` each way.
    pub fn set_rtt_for_latency(&mut self, latency_ticks: u32) {
        self.set_rtt(rtt_for_latency(latency_ticks));
    }

    /// Changes the world extent for both sides.
    pub fn set_bounds(&mut self, bounds: Bounds) {
        self.server_arena.bounds = bounds;
        self.client_arena.bounds = bounds;
    }

    /// Freezes or unfreezes both sides.
    pub fn set_suspended(&mut self, suspended: bool) {
        self.server_arena.suspended = suspended;
        self.client_arena.suspended = suspended;
    }

    /// Runs one tick on both sides and returns what the client renders.
    pub fn step(&mut self) -> ReboundResult<EntityState> {
        let now = self.clock.advance();
        self.server.advance(&self.clock, &self.server_arena, DT)?;
        self.link.pump(now, &*self.client);
        self.client
            .lock()
            .advance(&self.clock, &self.client_arena, DT)
    }

    /// Runs `ticks` steps.
    pub fn run(&mut self, ticks: usize) -> ReboundResult<()> {
        for _ in 0..ticks {
            self.step()?;
        }
        Ok(())
    }

    /// The client's live prediction.
    pub fn client_prediction(&self) -> TickState {
        self.client
            .lock()
            .local_prediction()
            .copied()
            .unwrap_or_default()
    }

    /// How many ticks the client has predicted past the server.
    pub fn lead(&self) -> i32 {
        self.client_prediction().tick - self.server.authoritative().tick
    }

    /// Steps the server's current value forward to the client's predicted tick using the
    /// client's arena. Equal to the client's prediction once it has converged.
    pub fn shadow_prediction(&self) -> TickState {
        let target = self.client_prediction().tick;
        let params = StepParams::new(
            DT,
            self.server.config().half_size,
            self.client_arena.bounds,
        );
        let mut state = *self.server.authoritative();
        while state.tick < target {
            state = params.apply(&state);
        }
        state
    }

    /// Client counters, including reconciliation.
    pub fn client_stats(&self) -> EntityStats {
        self.client.lock().stats()
    }

    /// Link counters.
    pub fn link_stats(&self) -> LinkStats {
        self.link.stats()
    }
}
