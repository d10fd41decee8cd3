//! Verification integration tests.
//!
//! - Determinism tests: identical inputs and seeds give bit-identical runs
//! - Property tests: convergence and history invariants under random links and arenas

mod common;

mod verification {
    pub mod determinism;
    pub mod property;
}
