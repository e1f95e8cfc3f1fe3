/**
 * Routes Module
 * API route handlers
 */
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::sync::Arc;

use crate::db;
use crate::error::{AppError, Result};

pub mod categories;
pub mod health;
pub mod languages;
pub mod posts;

/// Error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Success envelope for single values and plain lists
#[derive(Debug, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// The global pool, or 503 when the database was never connected.
pub fn require_pool() -> Result<Arc<PgPool>> {
    db::get_pool().ok_or_else(|| AppError::Unavailable("Database not available".to_string()))
}

/// Query-string booleans: `true`/`1`/`yes` (any case) are true.
pub(crate) fn flag(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("true") | Some("1") | Some("yes")
    )
}

/// Parses an optional query parameter, rejecting malformed values with 400.
pub(crate) fn parse_param<T: std::str::FromStr>(value: Option<&str>, name: &str) -> Result<Option<T>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| AppError::BadRequest(format!("Invalid {}: '{}'", name, raw))),
        None => Ok(None),
    }
}

/// Parses a path segment, rejecting malformed values with 400.
pub(crate) fn parse_path<T: std::str::FromStr>(raw: &str, name: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| AppError::BadRequest(format!("Invalid {}: '{}'", name, raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag() {
        assert!(flag(Some("true")));
        assert!(flag(Some("TRUE")));
        assert!(flag(Some("1")));
        assert!(!flag(Some("false")));
        assert!(!flag(None));
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param::<i64>(Some(" 42 "), "page").unwrap(), Some(42));
        assert_eq!(parse_param::<i64>(Some(""), "page").unwrap(), None);
        assert_eq!(parse_param::<i64>(None, "page").unwrap(), None);
        assert!(matches!(
            parse_param::<i64>(Some("abc"), "page"),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_parse_path() {
        assert_eq!(parse_path::<i64>("17", "id").unwrap(), 17);
        assert!(matches!(
            parse_path::<i64>("abc", "id"),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            parse_path::<uuid::Uuid>("not-a-uuid", "userId"),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_error_response_omits_empty_message() {
        let body = ErrorResponse {
            error: "Not found".to_string(),
            message: None,
        };
        assert_eq!(serde_json::to_string(&body).unwrap(), r#"{"error":"Not found"}"#);
    }
}
