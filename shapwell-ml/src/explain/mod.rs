//! Shapley-value attributions for sequence classifiers.
//!
//! The explainer follows the expected-gradients formulation of SHAP: for an
//! instance `x` and each background reference `r`, the gradient of every
//! class output is integrated along the straight path from `r` to `x` and
//! scaled by `x − r`; the per-reference results are averaged. Summed over all
//! features, the attribution of class `c` approximates `f_c(x) − E[f_c(r)]`,
//! where the expectation is the explainer's base value.

mod explainer;

pub use explainer::Explainer;

use ndarray::{Array1, Array3, ArrayView2, ArrayView3};
use shapwell_core::InputShape;

use crate::error::MlError;
use crate::nn::SignalNetwork;

/// A differentiable multi-output model the explainer can attribute.
pub trait Classifier: Send + Sync {
    fn input_shape(&self) -> InputShape;

    fn class_count(&self) -> usize;

    /// Model outputs for one `(T, F)` sequence.
    fn predict(&self, x: ArrayView2<f32>) -> Array1<f32>;

    /// Outputs and the gradient of each output w.r.t. `x`, shaped `(C, T, F)`.
    fn output_gradients(&self, x: ArrayView2<f32>) -> (Array1<f32>, Array3<f32>);
}

impl Classifier for SignalNetwork {
    fn input_shape(&self) -> InputShape {
        SignalNetwork::input_shape(self)
    }

    fn class_count(&self) -> usize {
        SignalNetwork::class_count(self)
    }

    fn predict(&self, x: ArrayView2<f32>) -> Array1<f32> {
        SignalNetwork::predict(self, x)
    }

    fn output_gradients(&self, x: ArrayView2<f32>) -> (Array1<f32>, Array3<f32>) {
        self.probability_gradients(x)
    }
}

/// Object-safe view of an explainer, used by the HTTP layer so handlers can
/// be exercised with substitute implementations.
pub trait Attributor: Send + Sync {
    /// Shape every instance must have.
    fn input_shape(&self) -> InputShape;

    fn class_count(&self) -> usize;

    /// Number of background references the base values were computed from.
    fn reference_count(&self) -> usize;

    /// Expected model output per class over the background references.
    fn base_values(&self) -> Array1<f32>;

    /// One `(T, F, C)` attribution array per instance of the `(N, T, F)` batch.
    fn attribute(&self, instances: ArrayView3<f32>) -> Result<Vec<Array3<f32>>, MlError>;
}
