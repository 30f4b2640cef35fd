//! Parameter-free dot-product self-attention.
//!
//! Query, key and value are all the input sequence `H` of shape `(T, D)`:
//! `S = H·Hᵀ`, `A = softmax_rows(S)`, `out = A·H`. Scores are not scaled.

use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::activation::softmax_rows;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SelfAttention;

#[derive(Debug, Clone)]
pub struct AttentionCache {
    input: Array2<f32>,
    weights: Array2<f32>,
}

impl SelfAttention {
    pub fn forward(&self, h: ArrayView2<f32>) -> Array2<f32> {
        self.forward_cached(h).0
    }

    pub fn forward_cached(&self, h: ArrayView2<f32>) -> (Array2<f32>, AttentionCache) {
        let scores = h.dot(&h.t());
        let weights = softmax_rows(&scores);
        let out = weights.dot(&h);
        (
            out,
            AttentionCache {
                input: h.to_owned(),
                weights,
            },
        )
    }

    /// Gradient w.r.t. the input sequence, through all three of its roles.
    pub fn backward(&self, cache: &AttentionCache, d_out: ArrayView2<f32>) -> Array2<f32> {
        let h = &cache.input;
        let a = &cache.weights;

        // value path
        let mut dh = a.t().dot(&d_out);

        let da = d_out.dot(&h.t());
        let row_dot = (&da * a).sum_axis(Axis(1)).insert_axis(Axis(1));
        let ds = a * &(&da - &row_dot);

        // query and key paths
        dh += &ds.dot(h);
        dh += &ds.t().dot(h);
        dh
    }
}
