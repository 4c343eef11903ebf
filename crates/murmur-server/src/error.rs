//! HTTP error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use murmur_core::StoreError;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

/// API error type with structured responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The external store failed.
    #[error("Gateway error: {0}")]
    BadGateway(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::BadGateway(_) => "BAD_GATEWAY",
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::BadGateway(err.to_string())
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(error = %self, "API request failed");
        let body = ErrorBody {
            error: self.to_string(),
            code: self.error_code(),
        };
        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_maps_to_bad_gateway() {
        let response = ApiError::from(StoreError::Status(500)).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
