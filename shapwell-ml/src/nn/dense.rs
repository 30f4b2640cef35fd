//! Fully connected layer `y = x·W + b`.

use ndarray::{Array1, Array2, ArrayView1, ArrayViewD, ArrayViewMutD, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{glorot_uniform, Parameterized};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    /// `(input, output)`
    pub weights: Array2<f32>,
    pub bias: Array1<f32>,
}

impl Dense {
    pub fn new<R: Rng + ?Sized>(input_size: usize, output_size: usize, rng: &mut R) -> Self {
        Self {
            weights: glorot_uniform(input_size, output_size, rng),
            bias: Array1::zeros(output_size),
        }
    }

    pub fn zeros_like(&self) -> Self {
        Self {
            weights: Array2::zeros(self.weights.raw_dim()),
            bias: Array1::zeros(self.bias.raw_dim()),
        }
    }

    pub fn output_size(&self) -> usize {
        self.weights.ncols()
    }

    pub fn forward(&self, x: ArrayView1<f32>) -> Array1<f32> {
        x.dot(&self.weights) + &self.bias
    }

    /// Gradient w.r.t. the input for an output gradient `d_out`.
    pub fn backward(&self, d_out: ArrayView1<f32>) -> Array1<f32> {
        self.weights.dot(&d_out)
    }

    pub fn accumulate_grads(&self, x: ArrayView1<f32>, d_out: ArrayView1<f32>, grads: &mut Dense) {
        let outer = x.insert_axis(Axis(1)).dot(&d_out.insert_axis(Axis(0)));
        grads.weights += &outer;
        grads.bias += &d_out;
    }
}

impl Parameterized for Dense {
    fn params(&self) -> Vec<ArrayViewD<'_, f32>> {
        vec![self.weights.view().into_dyn(), self.bias.view().into_dyn()]
    }

    fn params_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>> {
        vec![
            self.weights.view_mut().into_dyn(),
            self.bias.view_mut().into_dyn(),
        ]
    }
}
