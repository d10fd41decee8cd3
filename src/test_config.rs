//! Shared case counts for the property tests in this crate.
//!
//! Physics, history and reconciliation properties all run through `proptest`. Under Miri
//! each case is orders of magnitude slower, so the count drops to a handful there.
//!
//! ```ignore
//! use crate::test_config::miri_case_count;
//!
//! proptest! {
//!     #![proptest_config(ProptestConfig {
//!         cases: miri_case_count(),
//!         ..ProptestConfig::default()
//!     })]
//!     #[test]
//!     fn step_is_deterministic(dt in 0.0f32..1.0) {
//!         // ...
//!     }
//! }
//! ```

/// Number of cases each property test runs: 5 under Miri, 256 otherwise.
#[must_use]
pub const fn miri_case_count() -> u32 {
    if cfg!(miri) {
        5
    } else {
        256
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_count_depends_on_miri() {
        let expected = if cfg!(miri) { 5 } else { 256 };
        assert_eq!(miri_case_count(), expected);
    }
}
