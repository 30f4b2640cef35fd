//! Request and response bodies of `POST /shap`.

use ndarray::Array3;
use serde::{Deserialize, Serialize};
use shapwell_core::InputShape;

use crate::error::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShapRequest {
    /// `N` instances of `T` rows with `F` values each.
    pub instances: Vec<Vec<Vec<f32>>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapResponse {
    /// `[N][T][F][C]` attribution scores.
    pub shap_values: Vec<Vec<Vec<Vec<f32>>>>,
    /// Expected model output per class.
    pub base_values: Vec<f32>,
}

impl ShapRequest {
    /// Validate against the model's shape and pack into an `(N, T, F)` array.
    pub fn into_batch(
        self,
        shape: InputShape,
        max_instances: usize,
    ) -> Result<Array3<f32>, ApiError> {
        let count = self.instances.len();
        if count == 0 {
            return Err(ApiError::BadRequest("instances must not be empty".into()));
        }
        if count > max_instances {
            return Err(ApiError::TooManyInstances {
                count,
                max: max_instances,
            });
        }

        let mut data = Vec::with_capacity(count * shape.len());
        for (index, instance) in self.instances.into_iter().enumerate() {
            shape
                .check_rows(&instance)
                .map_err(|source| ApiError::ShapeMismatch { index, source })?;
            for row in instance {
                if row.iter().any(|v| !v.is_finite()) {
                    return Err(ApiError::BadRequest(format!(
                        "instance {index} contains a value outside the f32 range"
                    )));
                }
                data.extend(row);
            }
        }

        Array3::from_shape_vec((count, shape.time_steps, shape.features), data)
            .map_err(|e| ApiError::Internal(format!("failed to pack instances: {e}")))
    }
}

impl ShapResponse {
    /// Nest `(T, F, C)` arrays into the `[N][T][F][C]` wire layout.
    pub fn from_arrays(values: &[Array3<f32>], base_values: Vec<f32>) -> Self {
        let shap_values = values
            .iter()
            .map(|instance| {
                instance
                    .outer_iter()
                    .map(|step| step.outer_iter().map(|feature| feature.to_vec()).collect())
                    .collect()
            })
            .collect();
        Self {
            shap_values,
            base_values,
        }
    }
}
