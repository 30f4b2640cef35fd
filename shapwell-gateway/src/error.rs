//! Request errors and their HTTP translation.
//!
//! Every error leaves the service as
//! `{"error": {"code": "<snake_case>", "message": "<text>"}}`, with an
//! `instance` index added for per-instance shape failures.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use shapwell_core::ShapeError;
use shapwell_ml::MlError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Body is not JSON, lacks `instances`, or is not a 3-level numeric list.
    #[error("{0}")]
    BadRequest(String),

    #[error("{count} instances submitted, at most {max} are accepted per request")]
    TooManyInstances { count: usize, max: usize },

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error("instance {index}: {source}")]
    ShapeMismatch {
        index: usize,
        #[source]
        source: ShapeError,
    },

    #[error("{0}")]
    Unprocessable(String),

    #[error("{0}")]
    Internal(String),
}

/// Wire form of an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<usize>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::TooManyInstances { .. } | Self::PayloadTooLarge(_) => {
                StatusCode::PAYLOAD_TOO_LARGE
            }
            Self::ShapeMismatch { .. } | Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::TooManyInstances { .. } => "too_many_instances",
            Self::PayloadTooLarge(_) => "payload_too_large",
            Self::ShapeMismatch { .. } => "shape_mismatch",
            Self::Unprocessable(_) => "unprocessable_input",
            Self::Internal(_) => "explanation_failed",
        }
    }

    pub fn body(&self) -> ErrorBody {
        let instance = match self {
            Self::ShapeMismatch { index, .. } => Some(*index),
            _ => None,
        };
        ErrorBody {
            error: ErrorDetail {
                code: self.code().to_string(),
                message: self.to_string(),
                instance,
            },
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::PayloadTooLarge(rejection.body_text())
        } else {
            Self::BadRequest(rejection.body_text())
        }
    }
}

impl From<MlError> for ApiError {
    fn from(err: MlError) -> Self {
        match err {
            MlError::InvalidInput(message) => Self::BadRequest(message),
            MlError::Shape(e) => Self::Unprocessable(e.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        } else {
            tracing::debug!(code = self.code(), error = %self, "Request rejected");
        }
        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shapwell_core::InputShape;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::BadRequest("x".into()).status(), 400);
        assert_eq!(
            ApiError::TooManyInstances { count: 9, max: 8 }.status(),
            413
        );
        let mismatch = ApiError::ShapeMismatch {
            index: 2,
            source: ShapeError::Mismatch {
                expected: InputShape::new(60, 15),
                actual: InputShape::new(60, 10),
            },
        };
        assert_eq!(mismatch.status(), 422);
        assert_eq!(ApiError::Internal("boom".into()).status(), 500);
    }

    #[test]
    fn test_body_carries_instance_index() {
        let err = ApiError::ShapeMismatch {
            index: 3,
            source: ShapeError::Row {
                row: 1,
                expected: 15,
                actual: 14,
            },
        };
        let body = err.body();
        assert_eq!(body.error.code, "shape_mismatch");
        assert_eq!(body.error.instance, Some(3));
        assert_eq!(
            body.error.message,
            "instance 3: row 1 has 14 features, expected 15"
        );

        let json = serde_json::to_value(ApiError::BadRequest("nope".into()).body()).unwrap();
        assert!(json["error"].get("instance").is_none());
    }

    #[test]
    fn test_ml_errors_map_to_client_or_server() {
        let client: ApiError = MlError::invalid_input("empty").into();
        assert_eq!(client.status(), 400);
        let server: ApiError = MlError::explainer("nan").into();
        assert_eq!(server.status(), 500);
    }
}
