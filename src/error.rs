//! Application error type shared by services and route handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::routes::ErrorResponse;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "Bad request",
            AppError::Unauthorized(_) => "Unauthorized",
            AppError::Forbidden(_) => "Forbidden",
            AppError::NotFound(_) => "Not found",
            AppError::Conflict(_) => "Conflict",
            AppError::Unavailable(_) => "Service unavailable",
            AppError::Database(_) => "Database error",
            AppError::Internal(_) => "Internal error",
        }
    }

    /// Maps a unique-constraint violation to `Conflict`, naming the column
    /// when the constraint follows the `<table>_<column>_key` convention.
    pub fn from_unique_violation(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                let field = db
                    .constraint()
                    .and_then(|c| c.strip_suffix("_key"))
                    .and_then(|c| c.split_once('_'))
                    .map(|(_, column)| column.to_string());
                match field {
                    Some(column) => AppError::Conflict(format!("A record with this {} already exists", column)),
                    None => AppError::Conflict("Resource already exists".to_string()),
                }
            }
            _ => AppError::Database(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self, "request failed");
        }

        let body = Json(ErrorResponse {
            error: self.label().to_string(),
            message: Some(self.to_string()),
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(AppError::Forbidden("x".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::Unavailable("x".into()).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::Database(sqlx::Error::RowNotFound).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_non_unique_errors_stay_database_errors() {
        let err = AppError::from_unique_violation(sqlx::Error::RowNotFound);
        assert!(matches!(err, AppError::Database(_)));
    }

    #[tokio::test]
    async fn test_error_body_carries_message() {
        let res = AppError::NotFound("Post not found".into()).into_response();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "Not found");
        assert_eq!(json["message"], "Post not found");
    }
}
