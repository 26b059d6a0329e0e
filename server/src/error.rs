use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::SqlErr;
use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;
pub type AppJsonResult<T> = AppResult<Json<T>>;

#[derive(Debug)]
pub enum AppError {
    Validation(String),
    NotFound(String),
    Conflict(String),
    Unauthorized(String),
    Forbidden(String),
    RateLimited,
    RequestTimeout,
    UpstreamUnavailable(String),
    DbError(sea_orm::error::DbErr),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(error)
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        tracing::error!("Reqwest error: {:?}", error);
        if error.is_timeout() {
            return AppError::RequestTimeout;
        }
        match error.status() {
            Some(StatusCode::TOO_MANY_REQUESTS) => AppError::RateLimited,
            Some(status) if status.is_server_error() => {
                AppError::UpstreamUnavailable(error.to_string())
            }
            Some(StatusCode::BAD_REQUEST) => AppError::Validation(error.to_string()),
            _ => AppError::Internal(error.into()),
        }
    }
}

impl From<sea_orm::error::DbErr> for AppError {
    fn from(error: sea_orm::error::DbErr) -> Self {
        // uniqueness surfaces as conflict; everything else is transient
        if let Some(SqlErr::UniqueConstraintViolation(detail)) = error.sql_err() {
            return AppError::Conflict(detail);
        }
        AppError::DbError(error)
    }
}

// This centralizes all different errors from our app in one place
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let err = match self {
            AppError::Validation(detail) => (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "validation", "detail": detail})),
            ),
            AppError::NotFound(detail) => (
                StatusCode::NOT_FOUND,
                Json(json!({"error": "not_found", "detail": detail})),
            ),
            AppError::Conflict(detail) => (
                StatusCode::CONFLICT,
                Json(json!({"error": "conflict", "detail": detail})),
            ),
            AppError::Unauthorized(detail) => (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "unauthorized", "detail": detail})),
            ),
            AppError::Forbidden(detail) => (
                StatusCode::FORBIDDEN,
                Json(json!({"error": "forbidden", "detail": detail})),
            ),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({"error": "rate_limited"})),
            ),
            AppError::RequestTimeout => (
                StatusCode::REQUEST_TIMEOUT,
                Json(json!({"error": "upstream_unavailable", "detail": "request took too long"})),
            ),
            AppError::UpstreamUnavailable(detail) => (
                StatusCode::BAD_GATEWAY,
                Json(json!({"error": "upstream_unavailable", "detail": detail})),
            ),
            AppError::DbError(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "transient_db"})),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"error": "internal"})),
                )
            }
        };

        err.into_response()
    }
}
