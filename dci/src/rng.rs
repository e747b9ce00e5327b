//! Explicit random number generation.
//!
//! The reference implementation keeps a cached Box-Muller pair in module-level
//! state shared by every call to its Gaussian sampler, which makes parallel,
//! reproducible seeding an accident of call order rather than a guarantee.
//! Here the RNG is an explicit object threaded through construction: one
//! [`IndexRng`] per index, forked deterministically into one sub-RNG per level
//! so that levels built in parallel are still reproducible from a single seed.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// A seeded, explicit random source for index construction.
///
/// Wraps [`SmallRng`] — fast and reproducible, not cryptographically secure,
/// which is the right tradeoff for sampling projection directions and
/// hierarchy subsets.
pub struct IndexRng {
    inner: SmallRng,
    seed: u64,
}

impl IndexRng {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            inner: SmallRng::seed_from_u64(seed),
            seed,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Fork a deterministic sub-RNG for level `level_index`, distinct from
    /// this RNG's own stream and from every other level's stream, for a fixed
    /// top-level seed.
    pub fn fork_for_level(&self, level_index: usize) -> Self {
        // Mix the level index into the seed with a fixed-point multiplier
        // (splitmix-style) rather than drawing from `self.inner`, so forking
        // is deterministic regardless of how much entropy has already been
        // consumed from the parent.
        let mixed = self
            .seed
            .wrapping_add(0x9E37_79B9_7F4A_7C15)
            .wrapping_mul(level_index as u64 ^ 0xBF58_476D_1CE4_E5B9)
            .wrapping_add(level_index as u64);
        Self::from_seed(mixed)
    }

    pub fn gen_range_u32(&mut self, upper_exclusive: u32) -> u32 {
        self.inner.gen_range(0..upper_exclusive)
    }

    pub fn gen_f32(&mut self) -> f32 {
        self.inner.gen()
    }

    /// Sample a standard-normal scalar, the building block of a uniform
    /// sample on the unit sphere (see [`crate::projection::ProjectionBank`]).
    pub fn standard_normal(&mut self) -> f32 {
        self.inner.sample(StandardNormal)
    }

    pub fn inner_mut(&mut self) -> &mut SmallRng {
        &mut self.inner
    }
}
