//! Error handling for the axum server.
//! Maps `SabakanError` to HTTP status codes and JSON error bodies.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sabakan_core::SabakanError;
use serde_json::json;

/// Wrapper to convert `SabakanError` into an axum response.
pub struct AppError(SabakanError);

impl From<SabakanError> for AppError {
    fn from(e: SabakanError) -> Self {
        Self(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        let body = json!({
            "error": self.0.to_string(),
            "code": status.as_u16(),
        });

        (status, Json(body)).into_response()
    }
}
