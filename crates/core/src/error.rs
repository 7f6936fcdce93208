use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

pub type Result<T> = std::result::Result<T, Error>;

/// The stable error kinds shared by the leader and the worker agent.
///
/// Every variant maps to exactly one HTTP status at the axum boundary (see
/// [`Error::status_code`]); callers elsewhere in the core should match on these
/// kinds rather than on formatted messages.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already registered: {0}")]
    AlreadyRegistered(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("join token is invalid")]
    TokenInvalid,
    #[error("join token has expired")]
    TokenExpired,
    #[error("join token has been used its maximum number of times")]
    TokenExhausted,
    #[error("image not found: {0}")]
    ImageNotFound(String),
    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),
    #[error("worker unreachable: {0}")]
    Unreachable(String),
    #[error("operation timed out: {0}")]
    Timeout(String),
    #[error("invalid token")]
    InvalidToken,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl Error {
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::AlreadyRegistered(_) => "already_registered",
            Error::Conflict(_) => "conflict",
            Error::PreconditionFailed(_) => "precondition_failed",
            Error::Unauthorized => "unauthorized",
            Error::TokenInvalid => "token_invalid",
            Error::TokenExpired => "token_expired",
            Error::TokenExhausted => "token_exhausted",
            Error::ImageNotFound(_) => "image_not_found",
            Error::RuntimeUnavailable(_) => "runtime_unavailable",
            Error::Unreachable(_) => "unreachable",
            Error::Timeout(_) => "timeout",
            Error::InvalidToken => "invalid_token",
            Error::Internal(_) => "internal",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::AlreadyRegistered(_) | Error::Conflict(_) | Error::PreconditionFailed(_) => {
                StatusCode::CONFLICT
            }
            Error::Unauthorized => StatusCode::UNAUTHORIZED,
            Error::TokenInvalid | Error::TokenExpired | Error::TokenExhausted => {
                StatusCode::BAD_REQUEST
            }
            Error::ImageNotFound(_) => StatusCode::BAD_GATEWAY,
            Error::RuntimeUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Unreachable(_) => StatusCode::BAD_GATEWAY,
            Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Error::InvalidToken => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    kind: &'static str,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(kind = self.kind(), "{self}");
        }
        let body = ErrorBody {
            error: self.to_string(),
            kind: self.kind(),
        };
        (status, Json(body)).into_response()
    }
}
