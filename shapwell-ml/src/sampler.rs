//! Background sample generation.

use ndarray::Array3;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use shapwell_core::InputShape;

/// A seeded RNG, or one seeded from OS entropy when `seed` is `None`.
pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// `(count, T, F)` standard-normal values drawn from `rng`.
pub fn standard_normal<R: Rng + ?Sized>(
    shape: InputShape,
    count: usize,
    rng: &mut R,
) -> Array3<f32> {
    Array3::random_using((count, shape.time_steps, shape.features), StandardNormal, rng)
}

/// Generate a background sample of `sample_count` sequences.
pub fn generate_background(
    shape: InputShape,
    sample_count: usize,
    seed: Option<u64>,
) -> Array3<f32> {
    let mut rng = seeded_rng(seed);
    let sample = standard_normal(shape, sample_count, &mut rng);
    tracing::debug!(
        sample_count,
        input_shape = %shape,
        seeded = seed.is_some(),
        "Generated background sample"
    );
    sample
}
