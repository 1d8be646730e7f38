//! HTTP error surface (spec.md section 7): one enum, every variant mapped to
//! a stable status code and a body that never leaks internals.

use axum::Json;
use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::http::header::RETRY_AFTER;
use axum::response::{IntoResponse, Response};
use serde_json::json;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request origin is not allowed")]
    CorsDenied,
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("authentication is not configured")]
    AuthNotConfigured,
    #[error("invalid or missing bearer token")]
    Unauthorized,
    #[error("invalid item id")]
    InvalidItemId,
    #[error("invalid since parameter")]
    InvalidSince,
    #[error("unknown pipeline {0:?}")]
    UnknownPipeline(String),
    #[error("item has no stored embedding")]
    NotFound,
    #[error("similarity search is not available")]
    VectorStoreUnavailable,
    #[error(transparent)]
    Path(#[from] PathRejection),
    #[error(transparent)]
    Query(#[from] QueryRejection),
    #[error(transparent)]
    Store(#[from] diesel::result::Error),
    #[error(transparent)]
    Pool(#[from] diesel::r2d2::PoolError),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::CorsDenied => StatusCode::FORBIDDEN,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::AuthNotConfigured | Self::VectorStoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::InvalidItemId | Self::InvalidSince | Self::Query(_) => StatusCode::BAD_REQUEST,
            Self::UnknownPipeline(_) | Self::NotFound | Self::Path(_) => StatusCode::NOT_FOUND,
            Self::Store(_) | Self::Pool(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "unhandled storage error");
        }
        // Bodies for the admission-layer variants (spec.md section 4.7) use
        // the exact strings spec.md quotes; everything else falls back to
        // the error's own message.
        let body = match &self {
            Self::CorsDenied => Json(json!({ "error": "CORS not allowed" })),
            Self::RateLimited => Json(json!({ "error": "Rate limit exceeded" })),
            Self::AuthNotConfigured => {
                Json(json!({ "error": "Server configuration error", "message": "Authentication not configured" }))
            }
            Self::VectorStoreUnavailable => {
                Json(json!({ "error": "Server configuration error", "message": "similarity search not available" }))
            }
            _ => Json(json!({ "error": self.to_string() })),
        };
        if status == StatusCode::TOO_MANY_REQUESTS {
            return (status, [(RETRY_AFTER, "60")], body).into_response();
        }
        (status, body).into_response()
    }
}
