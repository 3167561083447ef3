use std::collections::HashMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use common_types::ValidationError;

/// Body of a 202 response: the accepted event id and the server-side
/// acceptance time.
#[derive(Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub event_id: String,
    pub status: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub timestamp: String,
    pub checks: HashMap<String, String>,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid JSON body")]
    RequestParsing(#[from] serde_json::Error),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    // Backpressure is pushed to the client: nothing is buffered locally.
    #[error("failed to queue event")]
    PublishFailed,

    #[error("failed to fetch metrics")]
    QueryFailed,

    #[error("match not found")]
    NotFound,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::RequestParsing(_) | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::PublishFailed => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::QueryFailed => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, field) = match &self {
            ApiError::Validation(err) => (err.message.to_string(), Some(err.field.to_string())),
            other => (other.to_string(), None),
        };

        let body = ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("error")
                .to_string(),
            message,
            field,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_400_with_field() {
        let err: ApiError = ValidationError::new("teamId", "must be 1 or 2").into();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn publish_failures_map_to_503() {
        assert_eq!(
            ApiError::PublishFailed.status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn error_response_omits_absent_field() {
        let body = ErrorResponse {
            error: "Bad Request".to_string(),
            message: "invalid JSON body".to_string(),
            field: None,
        };
        let value = serde_json::to_value(&body).unwrap();
        assert!(!value.as_object().unwrap().contains_key("field"));
    }
}
