//! Mapping of pipeline errors onto HTTP responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hazard_lib::HazardError;
use serde::{Deserialize, Serialize};

/// JSON error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

/// A `HazardError` on its way out of a handler
#[derive(Debug)]
pub struct ApiError(pub HazardError);

impl From<HazardError> for ApiError {
    fn from(err: HazardError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            HazardError::EmptyInput(_) | HazardError::Schema(_) | HazardError::Training(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            HazardError::NotFound(_) | HazardError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            HazardError::Persist(_) | HazardError::Store(_) => StatusCode::BAD_GATEWAY,
            HazardError::Inference(_)
            | HazardError::CorruptArtifact { .. }
            | HazardError::Csv(_)
            | HazardError::Serialization(_)
            | HazardError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorBody {
            error: self.0.kind().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
