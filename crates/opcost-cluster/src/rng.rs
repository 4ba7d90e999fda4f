//! Deterministic random streams for k-means++ seeding.
//!
//! A stream is a function of the caller's seed and a stream index only, so a
//! seeded fit draws the same centroids on every run and platform. Each
//! k-means restart uses its own index, which keeps restarts independent
//! without threading one generator through all of them.

const GOLDEN_GAMMA: u64 = 0x9e37_79b9_7f4a_7c15;

/// An xorshift64* generator started from a splitmix64-scrambled seed.
pub(crate) struct SeedStream {
    state: u64,
}

impl SeedStream {
    /// Opens stream `index` of `seed`.
    ///
    /// Nearby seeds and indices are scrambled apart, and the state is never
    /// zero.
    pub(crate) fn new(seed: u64, index: usize) -> Self {
        let index = u64::try_from(index).unwrap_or(u64::MAX);
        let offset = index.wrapping_add(1).wrapping_mul(GOLDEN_GAMMA);
        let mut z = seed.wrapping_add(offset);
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^= z >> 31;
        Self {
            state: if z == 0 { GOLDEN_GAMMA } else { z },
        }
    }

    fn next_u64(&mut self) -> u64 {
        self.state ^= self.state >> 12;
        self.state ^= self.state << 25;
        self.state ^= self.state >> 27;
        self.state.wrapping_mul(0x2545_f491_4f6c_dd1d)
    }

    /// Uniform index in `0..upper`; always 0 when `upper <= 1`.
    pub(crate) fn index_below(&mut self, upper: usize) -> usize {
        if upper <= 1 {
            return 0;
        }
        let upper = u64::try_from(upper).unwrap_or(u64::MAX);
        // Multiply-high maps the full 64-bit draw onto the range.
        let scaled = (u128::from(self.next_u64()) * u128::from(upper)) >> 64;
        usize::try_from(scaled).unwrap_or(0)
    }

    /// Uniform sample in `[0, 1)`.
    #[expect(
        clippy::cast_precision_loss,
        reason = "53 random bits fit exactly in an f64 mantissa"
    )]
    pub(crate) fn unit(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_and_index_repeat() {
        let mut a = SeedStream::new(7, 3);
        let mut b = SeedStream::new(7, 3);
        for _ in 0..16 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn zero_seed_is_not_stuck() {
        let mut stream = SeedStream::new(0, 0);
        assert_ne!(stream.next_u64(), 0);
        assert_ne!(stream.next_u64(), 0);
    }

    #[test]
    fn indices_and_nearby_seeds_diverge() {
        let first = |seed, index| SeedStream::new(seed, index).next_u64();
        assert_ne!(first(42, 0), first(42, 1));
        assert_ne!(first(42, 0), first(43, 0));
        assert_ne!(first(42, 1), first(43, 0));
    }

    #[test]
    fn samples_stay_in_range() {
        let mut stream = SeedStream::new(99, 0);
        let mut seen = [false; 5];
        for _ in 0..1_000 {
            let x = stream.unit();
            assert!((0.0..1.0).contains(&x));
            seen[stream.index_below(5)] = true;
        }
        assert!(seen.iter().all(|&s| s), "every index is reachable");
        assert_eq!(stream.index_below(1), 0);
        assert_eq!(stream.index_below(0), 0);
    }
}
