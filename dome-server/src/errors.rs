//! HTTP-boundary error translation: wraps a `DomeError` (or any other
//! fallible outcome) with the status code it maps to, exactly the
//! teacher's `errors.rs` struct-with-status-and-message pattern.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use dome_core::DomeError;
use serde_json::json;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn unknown_command(cmd: &str) -> Self {
        Self::new(
            StatusCode::from_u16(418).unwrap(),
            format!("unknown command: {cmd}"),
        )
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.as_u16() >= 500 {
            tracing::error!(status = self.status.as_u16(), message = %self.message, "request failed");
        }
        let body = Json(json!({ "status": self.status.as_u16(), "message": self.message }));
        (self.status, body).into_response()
    }
}

impl From<DomeError> for AppError {
    fn from(err: DomeError) -> Self {
        let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self::new(status, err.to_string())
    }
}
