//! # Neural network layers
//!
//! Plain `ndarray` implementations of the layers the signal classifier is
//! built from, each with an analytic backward pass:
//!
//! - [`Lstm`]: fused-gate LSTM returning the full hidden sequence
//! - [`SelfAttention`]: parameter-free dot-product self-attention
//! - [`Dense`]: affine projection
//! - [`SignalNetwork`]: the full `LSTM -> attention -> concat -> LSTM -> dense -> softmax` model
//!
//! Gradient accumulators reuse the layer types themselves (see `zeros_like`),
//! so optimizers can walk parameters and gradients in lockstep through
//! [`Parameterized`].

pub mod activation;
mod attention;
mod dense;
mod lstm;
mod network;

pub use attention::{AttentionCache, SelfAttention};
pub use dense::Dense;
pub use lstm::{Lstm, LstmCache};
pub use network::{NetworkCache, SignalNetwork};
pub(crate) use network::argmax;

use ndarray::{Array2, ArrayViewD, ArrayViewMutD};
use rand::Rng;
use rand_distr::{Distribution, Uniform};

/// Anything holding trainable tensors.
///
/// `params` and `params_mut` must yield tensors in the same order, and two
/// values with the same architecture must yield matching shapes.
pub trait Parameterized {
    fn params(&self) -> Vec<ArrayViewD<'_, f32>>;
    fn params_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>>;

    fn parameter_count(&self) -> usize {
        self.params().iter().map(|p| p.len()).sum()
    }

    /// Element-wise `self += other`.
    fn accumulate(&mut self, other: &Self)
    where
        Self: Sized,
    {
        for (mut mine, theirs) in self.params_mut().into_iter().zip(other.params()) {
            mine += &theirs;
        }
    }

    /// Multiply every tensor by `factor`.
    fn scale(&mut self, factor: f32) {
        for mut p in self.params_mut() {
            p.mapv_inplace(|v| v * factor);
        }
    }
}

/// Glorot/Xavier uniform initialisation for a `(fan_in, fan_out)` matrix.
pub fn glorot_uniform<R: Rng + ?Sized>(fan_in: usize, fan_out: usize, rng: &mut R) -> Array2<f32> {
    let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
    let dist = Uniform::new_inclusive(-limit, limit);
    Array2::from_shape_simple_fn((fan_in, fan_out), || dist.sample(&mut *rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_glorot_bounds() {
        let mut rng = StdRng::seed_from_u64(1);
        let w = glorot_uniform(10, 20, &mut rng);
        let limit = (6.0f32 / 30.0).sqrt();
        assert_eq!(w.dim(), (10, 20));
        assert!(w.iter().all(|v| v.abs() <= limit));
    }

    #[test]
    fn test_accumulate_and_scale() {
        let mut rng = StdRng::seed_from_u64(2);
        let layer = Dense::new(3, 2, &mut rng);
        let mut acc = layer.zeros_like();
        acc.accumulate(&layer);
        acc.accumulate(&layer);
        acc.scale(0.5);
        assert_eq!(acc, layer);
        assert_eq!(layer.parameter_count(), 3 * 2 + 2);
    }
}
