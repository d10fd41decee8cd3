//! A small seeded PCG32 generator.
//!
//! [`DelayedLink`](crate::DelayedLink) draws its loss and jitter decisions from here so that
//! a given seed always reproduces the same delivery schedule.
//!
//! ```rust
//! use rebound::rng::Pcg32;
//!
//! let mut a = Pcg32::seed_from_u64(12345);
//! let mut b = Pcg32::seed_from_u64(12345);
//! assert_eq!(a.gen_symmetric(3), b.gen_symmetric(3));
//! assert_eq!(a.gen_bool(0.5), b.gen_bool(0.5));
//! ```

/// PCG-XSH-RR with 64 bits of state. Fast and reproducible; not cryptographically secure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pcg32 {
    state: u64,
    inc: u64,
}

/// Default stream for single-stream use, from the PCG paper.
const PCG_DEFAULT_STREAM: u64 = 1442695040888963407;

/// LCG multiplier for 64-bit state.
const PCG_MULTIPLIER: u64 = 6364136223846793005;

impl Pcg32 {
    /// Creates a generator from an initial state and a stream selector.
    #[must_use]
    pub const fn new(state: u64, stream: u64) -> Self {
        let inc = (stream << 1) | 1;
        let mut pcg = Self { state: 0, inc };
        pcg.state = pcg.state.wrapping_mul(PCG_MULTIPLIER).wrapping_add(pcg.inc);
        pcg.state = pcg.state.wrapping_add(state);
        pcg.state = pcg.state.wrapping_mul(PCG_MULTIPLIER).wrapping_add(pcg.inc);
        pcg
    }

    /// Creates a generator on the default stream.
    #[must_use]
    pub const fn seed_from_u64(seed: u64) -> Self {
        Self::new(seed, PCG_DEFAULT_STREAM)
    }

    /// Next 32 random bits.
    #[inline]
    pub fn next_u32(&mut self) -> u32 {
        let old_state = self.state;
        self.state = old_state
            .wrapping_mul(PCG_MULTIPLIER)
            .wrapping_add(self.inc);
        let xorshifted = (((old_state >> 18) ^ old_state) >> 27) as u32;
        let rot = (old_state >> 59) as u32;
        xorshifted.rotate_right(rot)
    }

    /// Uniform value in `[-magnitude, magnitude]`, by rejection sampling.
    pub fn gen_symmetric(&mut self, magnitude: u32) -> i64 {
        if magnitude == 0 {
            return 0;
        }
        let span = u64::from(magnitude) * 2 + 1;
        let threshold = span.wrapping_neg() % span;
        loop {
            let value = (u64::from(self.next_u32()) << 32) | u64::from(self.next_u32());
            if value >= threshold {
                return (value % span) as i64 - i64::from(magnitude);
            }
        }
    }

    /// `true` with the given probability, clamped to `[0, 1]`.
    pub fn gen_bool(&mut self, probability: f64) -> bool {
        let p = probability.clamp(0.0, 1.0);
        if p >= 1.0 {
            return true;
        }
        let threshold = (p * f64::from(u32::MAX)) as u32;
        self.next_u32() < threshold
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
    use crate::test_config::miri_case_count;
    use proptest::prelude::*;

    #[test]
    fn same_seed_same_sequence() {
        let mut a = Pcg32::seed_from_u64(7);
        let mut b = Pcg32::seed_from_u64(7);
        for _ in 0..100 {
            assert_eq!(a.next_u32(), b.next_u32());
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = Pcg32::seed_from_u64(1);
        let mut b = Pcg32::seed_from_u64(2);
        let same = (0..32).filter(|_| a.next_u32() == b.next_u32()).count();
        assert!(same < 4);
    }

    #[test]
    fn gen_bool_extremes() {
        let mut rng = Pcg32::seed_from_u64(3);
        assert!((0..1000).all(|_| !rng.gen_bool(0.0)));
        assert!((0..1000).all(|_| rng.gen_bool(1.0)));
        assert!((0..1000).all(|_| !rng.gen_bool(-2.0)));
    }

    #[test]
    fn gen_bool_is_roughly_calibrated() {
        let mut rng = Pcg32::seed_from_u64(99);
        let hits = (0..10_000).filter(|_| rng.gen_bool(0.25)).count();
        assert!((2_000..3_000).contains(&hits), "hits = {hits}");
    }

    #[test]
    fn symmetric_zero_is_zero() {
        let mut rng = Pcg32::seed_from_u64(0);
        assert_eq!(rng.gen_symmetric(0), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: miri_case_count(),
            ..ProptestConfig::default()
        })]

        #[test]
        fn gen_symmetric_stays_in_range(seed in any::<u64>(), magnitude in 0u32..500) {
            let mut rng = Pcg32::seed_from_u64(seed);
            let value = rng.gen_symmetric(magnitude);
            prop_assert!(value.abs() <= i64::from(magnitude));
        }
    }
}
