//! Adam optimizer.

use ndarray::{ArrayD, Zip};
use serde::{Deserialize, Serialize};

use crate::nn::Parameterized;

/// Adam hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdamConfig {
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
        }
    }
}

/// Adam with bias correction folded into the step size.
///
/// Moment buffers are created lazily on the first step and follow the
/// parameter order of [`Parameterized::params`].
#[derive(Debug, Clone)]
pub struct Adam {
    config: AdamConfig,
    step: u64,
    first_moment: Vec<ArrayD<f32>>,
    second_moment: Vec<ArrayD<f32>>,
}

impl Adam {
    pub fn new(config: AdamConfig) -> Self {
        Self {
            config,
            step: 0,
            first_moment: Vec::new(),
            second_moment: Vec::new(),
        }
    }

    pub fn with_learning_rate(learning_rate: f32) -> Self {
        Self::new(AdamConfig {
            learning_rate,
            ..AdamConfig::default()
        })
    }

    pub fn steps_taken(&self) -> u64 {
        self.step
    }

    /// Apply one update of `params` from `grads`.
    pub fn step<P: Parameterized>(&mut self, params: &mut P, grads: &P) {
        if self.first_moment.is_empty() {
            self.first_moment = params
                .params()
                .iter()
                .map(|p| ArrayD::zeros(p.raw_dim()))
                .collect();
            self.second_moment = self.first_moment.clone();
        }

        self.step += 1;
        let AdamConfig {
            learning_rate,
            beta1,
            beta2,
            epsilon,
        } = self.config;
        let t = self.step as i32;
        let lr_t = learning_rate * (1.0 - beta2.powi(t)).sqrt() / (1.0 - beta1.powi(t));

        let moments = self.first_moment.iter_mut().zip(self.second_moment.iter_mut());
        let tensors = params.params_mut().into_iter().zip(grads.params());
        for ((mut p, g), (m, v)) in tensors.zip(moments) {
            Zip::from(&mut p)
                .and(&g)
                .and(m)
                .and(v)
                .for_each(|p, &g, m, v| {
                    *m = beta1 * *m + (1.0 - beta1) * g;
                    *v = beta2 * *v + (1.0 - beta2) * g * g;
                    *p -= lr_t * *m / (v.sqrt() + epsilon);
                });
        }
    }
}
