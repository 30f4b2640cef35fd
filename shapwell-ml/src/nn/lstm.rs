//! Long short-term memory layer with full backpropagation through time.
//!
//! Weights are stored fused across the four gates in the order
//! input, forget, cell candidate, output: `kernel` is `(input, 4H)`,
//! `recurrent` is `(H, 4H)` and `bias` is `(4H)`.

use ndarray::{s, Array1, Array2, ArrayView2, ArrayViewD, ArrayViewMutD, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::activation::sigmoid;
use super::{glorot_uniform, Parameterized};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lstm {
    pub kernel: Array2<f32>,
    pub recurrent: Array2<f32>,
    pub bias: Array1<f32>,
}

/// Activations kept from a forward pass for the backward pass.
#[derive(Debug, Clone)]
pub struct LstmCache {
    input: Array2<f32>,
    /// Activated gates per step, `(T, 4H)`.
    gates: Array2<f32>,
    /// Cell states with the zero initial state in row 0, `(T + 1, H)`.
    cells: Array2<f32>,
    /// Hidden states with the zero initial state in row 0, `(T + 1, H)`.
    hidden: Array2<f32>,
}

impl LstmCache {
    /// Hidden state sequence `h_1..h_T`.
    pub fn outputs(&self) -> ArrayView2<'_, f32> {
        self.hidden.slice(s![1.., ..])
    }
}

impl Lstm {
    pub fn new<R: Rng + ?Sized>(input_size: usize, units: usize, rng: &mut R) -> Self {
        let mut bias = Array1::zeros(4 * units);
        // Forget gate starts open.
        bias.slice_mut(s![units..2 * units]).fill(1.0);
        Self {
            kernel: glorot_uniform(input_size, 4 * units, rng),
            recurrent: glorot_uniform(units, 4 * units, rng),
            bias,
        }
    }

    pub fn zeros_like(&self) -> Self {
        Self {
            kernel: Array2::zeros(self.kernel.raw_dim()),
            recurrent: Array2::zeros(self.recurrent.raw_dim()),
            bias: Array1::zeros(self.bias.raw_dim()),
        }
    }

    pub fn units(&self) -> usize {
        self.recurrent.nrows()
    }

    pub fn input_size(&self) -> usize {
        self.kernel.nrows()
    }

    /// Run the sequence `x` of shape `(T, input)` and return `h_1..h_T` as `(T, H)`.
    pub fn forward(&self, x: ArrayView2<f32>) -> Array2<f32> {
        let cache = self.forward_cached(x);
        cache.outputs().to_owned()
    }

    pub fn forward_cached(&self, x: ArrayView2<f32>) -> LstmCache {
        let steps = x.nrows();
        let h = self.units();

        let projected = x.dot(&self.kernel) + &self.bias;
        let mut gates = Array2::<f32>::zeros((steps, 4 * h));
        let mut cells = Array2::<f32>::zeros((steps + 1, h));
        let mut hidden = Array2::<f32>::zeros((steps + 1, h));

        for t in 0..steps {
            let z = &projected.row(t) + &hidden.row(t).dot(&self.recurrent);
            let mut gate_row = gates.row_mut(t);
            for k in 0..h {
                let i = sigmoid(z[k]);
                let f = sigmoid(z[h + k]);
                let g = z[2 * h + k].tanh();
                let o = sigmoid(z[3 * h + k]);
                let c = f * cells[[t, k]] + i * g;
                cells[[t + 1, k]] = c;
                hidden[[t + 1, k]] = o * c.tanh();
                gate_row[k] = i;
                gate_row[h + k] = f;
                gate_row[2 * h + k] = g;
                gate_row[3 * h + k] = o;
            }
        }

        LstmCache {
            input: x.to_owned(),
            gates,
            cells,
            hidden,
        }
    }

    /// Backpropagate `d_hidden`, the loss gradient w.r.t. each `h_t`, through time.
    ///
    /// Returns the pre-activation gate gradients `(T, 4H)`, needed by
    /// [`Lstm::accumulate_grads`], and the input gradient `(T, input)`.
    pub fn backward(
        &self,
        cache: &LstmCache,
        d_hidden: ArrayView2<f32>,
    ) -> (Array2<f32>, Array2<f32>) {
        let steps = cache.gates.nrows();
        let h = self.units();

        let mut dz = Array2::<f32>::zeros((steps, 4 * h));
        let mut dh_next = Array1::<f32>::zeros(h);
        let mut dc_next = Array1::<f32>::zeros(h);

        for t in (0..steps).rev() {
            let dh = &d_hidden.row(t) + &dh_next;
            let gates = cache.gates.row(t);
            {
                let mut dz_row = dz.row_mut(t);
                for k in 0..h {
                    let i = gates[k];
                    let f = gates[h + k];
                    let g = gates[2 * h + k];
                    let o = gates[3 * h + k];
                    let c = cache.cells[[t + 1, k]];
                    let c_prev = cache.cells[[t, k]];
                    let tc = c.tanh();

                    let d_o = dh[k] * tc;
                    let dc = dc_next[k] + dh[k] * o * (1.0 - tc * tc);
                    dc_next[k] = dc * f;

                    dz_row[k] = dc * g * i * (1.0 - i);
                    dz_row[h + k] = dc * c_prev * f * (1.0 - f);
                    dz_row[2 * h + k] = dc * i * (1.0 - g * g);
                    dz_row[3 * h + k] = d_o * o * (1.0 - o);
                }
            }
            dh_next = self.recurrent.dot(&dz.row(t));
        }

        let dx = dz.dot(&self.kernel.t());
        (dz, dx)
    }

    /// Add this sequence's parameter gradients into `grads`.
    pub fn accumulate_grads(&self, cache: &LstmCache, dz: &Array2<f32>, grads: &mut Lstm) {
        let steps = dz.nrows();
        grads.kernel += &cache.input.t().dot(dz);
        grads.recurrent += &cache.hidden.slice(s![..steps, ..]).t().dot(dz);
        grads.bias += &dz.sum_axis(Axis(0));
    }
}

impl Parameterized for Lstm {
    fn params(&self) -> Vec<ArrayViewD<'_, f32>> {
        vec![
            self.kernel.view().into_dyn(),
            self.recurrent.view().into_dyn(),
            self.bias.view().into_dyn(),
        ]
    }

    fn params_mut(&mut self) -> Vec<ArrayViewMutD<'_, f32>> {
        vec![
            self.kernel.view_mut().into_dyn(),
            self.recurrent.view_mut().into_dyn(),
            self.bias.view_mut().into_dyn(),
        ]
    }
}
