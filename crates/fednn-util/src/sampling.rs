//! Random sampling helpers.

use rand::{distributions::Uniform, prelude::Distribution, CryptoRng, Rng, RngCore};

/// Sample a blinding factor uniformly in `[1, max]`.
///
/// Panics if `max == 0`; callers validate the bound at configuration time.
pub fn sample_blinding_factor<R: RngCore + CryptoRng>(max: u64, rng: &mut R) -> u64 {
    assert!(max >= 1, "the blinding factor bound must be positive");
    rng.gen_range(1..=max)
}

/// Sample a vector of `dimension` coordinates uniformly in `[1, max]`.
pub fn sample_vector<R: Rng + ?Sized>(dimension: usize, max: i64, rng: &mut R) -> Vec<i64> {
    let dist = Uniform::new_inclusive(1, max.max(1));
    (0..dimension).map(|_| dist.sample(rng)).collect()
}
