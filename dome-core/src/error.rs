//! Uniform error type shared by every `dome-core` component.
//!
//! Every fallible operation in the relational adapter, metadata cache,
//! status/admission layer, placement engine, queues, and task executor
//! returns `Result<T>` with this error. `dome-server` translates a
//! `DomeError` into an HTTP response at the boundary; nothing below
//! that boundary knows about HTTP.

use thiserror::Error;

/// Each variant implies an HTTP status at the boundary (`http_status()`
/// below).
#[derive(Error, Debug)]
pub enum DomeError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unprocessable: {0}")]
    Unprocessable(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("insufficient storage: {0}")]
    NoSpace(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("not implemented for this node role: {0}")]
    NotImplementedForRole(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, DomeError>;

impl DomeError {
    /// Numeric HTTP status this error maps to at the request boundary.
    /// Kept here (rather than in `dome-server`) so unit tests on
    /// `dome-core` can assert the mapping without pulling in axum.
    pub fn http_status(&self) -> u16 {
        match self {
            DomeError::NotFound(_) => 404,
            DomeError::PermissionDenied(_) => 403,
            DomeError::BadRequest(_) => 400,
            DomeError::Unprocessable(_) => 422,
            DomeError::Conflict(_) => 422,
            DomeError::NoSpace(_) => 507,
            DomeError::UnknownCommand(_) => 418,
            DomeError::NotImplementedForRole(_) => 500,
            DomeError::Internal(_) => 500,
        }
    }
}

impl From<sqlx::Error> for DomeError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!(error = %err, "relational adapter query failed");
        match err {
            sqlx::Error::RowNotFound => DomeError::NotFound("row not found".into()),
            other => DomeError::Internal(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for DomeError {
    fn from(err: reqwest::Error) -> Self {
        tracing::error!(error = %err, "outbound request failed");
        DomeError::Internal(err.to_string())
    }
}
