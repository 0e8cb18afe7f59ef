use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

/// Failures that escape a read handler. Mutating handlers convert store
/// errors into safe flash redirects instead; this type only covers the
/// JSON-rendering paths.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("database error: {0}")]
    Db(#[from] anyhow::Error),
    #[error("blocking task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!(error = %self, "request failed");
        StatusCode::INTERNAL_SERVER_ERROR.into_response()
    }
}
