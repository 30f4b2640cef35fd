//! # shapwell-gateway
//!
//! The attribution service: `POST /shap` computes attributions for a batch
//! of instances against the loaded explainer, `GET /health` reports what is
//! loaded. Handlers depend only on the [`shapwell_ml::Attributor`] trait.

pub mod error;
pub mod server;
pub mod types;

pub use error::{ApiError, ErrorBody, ErrorDetail};
pub use server::{router, run, serve, GatewayState};
pub use types::{ShapRequest, ShapResponse};
