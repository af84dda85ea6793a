use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use crate::models::ModelError;

/// Failure of a page handler or middleware.
///
/// Clients only ever see the canonical reason phrase; internal errors are
/// logged inside the request span, which carries the method and URI.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found")]
    NotFound,
    #[error("bad request")]
    BadRequest,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<ModelError> for AppError {
    fn from(err: ModelError) -> Self {
        match err {
            ModelError::NoRecord => Self::NotFound,
            other => Self::Internal(other.into()),
        }
    }
}

pub(crate) fn status_response(status: StatusCode) -> Response {
    (status, status.canonical_reason().unwrap_or_default()).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound => status_response(StatusCode::NOT_FOUND),
            Self::BadRequest => status_response(StatusCode::BAD_REQUEST),
            Self::Internal(err) => {
                error!("{err:#}");
                status_response(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }
}
