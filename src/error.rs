// =============================================================================
// ERROR MODULE
// =============================================================================
// Custom error type and its HTTP response.
//
// NOTES:
// - Validation problems are NOT errors here; they travel as FieldErrors
// - Storage errors never reach the visitor verbatim
// =============================================================================

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// =============================================================================
// CUSTOM ERROR TYPE
// =============================================================================
#[derive(Debug, Error)]
pub enum AppError {
    /// Database query failed or the pool could not hand out a connection
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A dependency is not reachable right now
    #[error("Service unavailable: {0}")]
    Unavailable(String),
}

// =============================================================================
// HTTP RESPONSE CONVERSION
// =============================================================================
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            // Don't expose driver messages to clients
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "A database error occurred".to_string(),
            ),

            AppError::Unavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "UNAVAILABLE",
                msg.clone(),
            ),
        };

        tracing::error!(
            error_code = error_code,
            error = %self,
            "Request failed"
        );

        let body = ErrorResponse::new(error_code, message);

        (status, Json(body)).into_response()
    }
}

/// Results that use our error type.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_errors_hide_details() {
        let response = AppError::Database(sqlx::Error::PoolClosed).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn unavailable_maps_to_503() {
        let response = AppError::Unavailable("database".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
