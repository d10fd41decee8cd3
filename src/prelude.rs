//! Convenient re-exports for common usage.
//!
//! ```rust
//! use rebound::prelude::*;
//! ```
//!
//! # What's Included
//!
//! - **Entities**: [`PredictedEntity`], [`EntityBuilder`], [`EntityConfig`], [`EntityRole`]
//! - **State**: [`Tick`], [`TickState`], [`EntityState`], [`Vec2`], [`Bounds`]
//! - **Host seams**: [`TickClock`], [`Arena`], [`ManualClock`], [`StaticArena`], [`PeerId`]
//! - **Replication**: [`AuthoritativeChannel`], [`ChangeObserver`], [`DelayedLink`], [`LinkConfig`]
//! - **Policies and results**: [`CatchUpPolicy`], [`ReconcileOutcome`], [`HistoryLog`]
//! - **Error handling**: [`ReboundError`], [`ReboundResult`]
//!
//! # Example
//!
//! ```rust
//! use rebound::prelude::*;
//! use parking_lot::Mutex;
//! use std::sync::Arc;
//!
//! let mut clock = ManualClock::new(60);
//! let arena = StaticArena::new(Bounds::new(10.0, 10.0));
//!
//! let mut server = EntityBuilder::new()
//!     .spawn_authoritative(Vec2::new(0.0, 0.0), Vec2::new(3.0, 2.0), Tick::new(0))?;
//! let client = Arc::new(Mutex::new(
//!     EntityBuilder::new().spawn_owning_client(*server.authoritative())?,
//! ));
//! server.subscribe(client.clone())?;
//!
//! for _ in 0..10 {
//!     clock.advance();
//!     server.advance(&clock, &arena, 1.0 / 60.0)?;
//!     client.lock().advance(&clock, &arena, 1.0 / 60.0)?;
//! }
//! assert_eq!(client.lock().current_state(), server.current_state());
//! # Ok::<(), ReboundError>(())
//! ```

pub use crate::{
    Arena, AuthoritativeChannel, Bounds, CatchUpPolicy, ChangeObserver, DelayedLink,
    EntityBuilder, EntityConfig, EntityRole, EntityState, HistoryLog, LinkConfig, ManualClock,
    PeerId, PredictedEntity, ReboundError, ReboundResult, ReconcileOutcome, StaticArena, Tick,
    TickClock, TickState, Vec2,
};
