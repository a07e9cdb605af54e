use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::core::acs::AcsError;
use crate::core::cache::CacheError;
use crate::core::events::DispatchError;
use crate::core::session_store::SessionStoreError;

/// Application error type
#[derive(Debug)]
pub enum AppError {
    InternalServerError(String),
    BadRequest(String),
    NotFound(String),
    Unauthorized(String),
    /// A managed upstream service (ACS, Cosmos DB, Redis) rejected the request
    BadGateway(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal server error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::BadRequest(msg) => {
                tracing::warn!("Bad request: {}", msg);
                (StatusCode::BAD_REQUEST, msg)
            }
            AppError::NotFound(msg) => {
                tracing::warn!("Not found: {}", msg);
                (StatusCode::NOT_FOUND, msg)
            }
            AppError::Unauthorized(msg) => {
                tracing::warn!("Unauthorized: {}", msg);
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
            AppError::BadGateway(msg) => {
                tracing::error!("Upstream service error: {}", msg);
                (StatusCode::BAD_GATEWAY, "Upstream service error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InternalServerError(msg) => write!(f, "Internal server error: {msg}"),
            AppError::BadRequest(msg) => write!(f, "Bad request: {msg}"),
            AppError::NotFound(msg) => write!(f, "Not found: {msg}"),
            AppError::Unauthorized(msg) => write!(f, "Unauthorized: {msg}"),
            AppError::BadGateway(msg) => write!(f, "Bad gateway: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<AcsError> for AppError {
    fn from(err: AcsError) -> Self {
        match err {
            AcsError::NotConfigured(msg) => AppError::InternalServerError(msg),
            other => AppError::BadGateway(other.to_string()),
        }
    }
}

impl From<CacheError> for AppError {
    fn from(err: CacheError) -> Self {
        AppError::InternalServerError(err.to_string())
    }
}

impl From<SessionStoreError> for AppError {
    fn from(err: SessionStoreError) -> Self {
        match err {
            SessionStoreError::SessionNotFound(id) => {
                AppError::NotFound(format!("Session not found: {id}"))
            }
            other => AppError::BadGateway(other.to_string()),
        }
    }
}

impl From<DispatchError> for AppError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Acs(acs) => acs.into(),
            DispatchError::Cache(cache) => cache.into(),
            other => AppError::InternalServerError(other.to_string()),
        }
    }
}

// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    async fn render(err: AppError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_bad_request_keeps_message() {
        let (status, body) =
            render(AppError::BadRequest("No valid events found in request".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No valid events found in request");
        assert_eq!(body["status"], 400);
    }

    #[tokio::test]
    async fn test_internal_error_hides_details() {
        let (status, body) =
            render(AppError::InternalServerError("redis exploded".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Internal server error");
    }

    #[tokio::test]
    async fn test_session_not_found_maps_to_404() {
        let err: AppError = SessionStoreError::SessionNotFound("call-1".into()).into();
        let (status, body) = render(err).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Session not found: call-1");
    }

    #[tokio::test]
    async fn test_acs_rejection_maps_to_502() {
        let err: AppError = DispatchError::Acs(AcsError::Api {
            status: 403,
            code: "Forbidden".into(),
            message: "denied".into(),
        })
        .into();
        let (status, _) = render(err).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }
}
