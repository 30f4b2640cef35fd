//! # shapwell-ml: classifier, trainer, sampler and explainer
//!
//! The numerical side of Shapwell, implemented on `ndarray`:
//!
//! - [`nn`]: LSTM, self-attention and dense layers with analytic gradients,
//!   assembled into [`SignalNetwork`]
//! - [`training`]: synthetic data, Adam, callbacks and the fit loop
//! - [`sampler`]: standard-normal background samples
//! - [`artifacts`]: versioned model/background files and the startup check
//! - [`explain`]: expected-gradients attributions behind the [`Attributor`] trait
//! - [`pipeline`]: the `background`, `train` and `serve` entry points

pub mod artifacts;
pub mod error;
pub mod explain;
pub mod nn;
pub mod pipeline;
pub mod sampler;
pub mod training;

pub use error::MlError;
pub use explain::{Attributor, Classifier, Explainer};
pub use nn::SignalNetwork;
pub use pipeline::{load_explainer, run_sampler, run_training, TrainingOutcome};
