//! Handler error type and its JSON rendering

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use tracing::error;

use crate::store::supabase::SupabaseError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// Body, path or query that could not be parsed
    #[error("Unprocessable request: {0}")]
    Unprocessable(String),

    #[error("Too many requests")]
    TooManyRequests,

    #[error("Database error: {0}")]
    Database(#[from] SupabaseError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Validation(_) | AppError::Unprocessable(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AppError::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message exposed to clients
    pub fn detail(&self) -> String {
        match self {
            AppError::BadRequest(msg)
            | AppError::NotFound(msg)
            | AppError::Unauthorized(msg)
            | AppError::Forbidden(msg)
            | AppError::Unprocessable(msg)
            | AppError::Internal(msg) => msg.clone(),
            AppError::Validation(errors) => errors.to_string(),
            AppError::TooManyRequests => "Too many attempts, try again later".to_string(),
            AppError::Database(_) => "Database request failed".to_string(),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Unprocessable(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Unprocessable(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Unprocessable(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        if let AppError::Database(e) = &self {
            error!(error = %e, "Database request failed");
        }

        let body = serde_json::json!({
            "detail": self.detail()
        });

        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AppError::BadRequest("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::TooManyRequests.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            AppError::Unprocessable("x".into()).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            AppError::Database(SupabaseError::NoRowReturned).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_database_detail_is_generic() {
        let err = AppError::Database(SupabaseError::Api {
            status: 500,
            body: "relation \"profiles\" does not exist".into(),
        });
        assert_eq!(err.detail(), "Database request failed");
        assert_eq!(AppError::NotFound("Question not found".into()).detail(), "Question not found");
    }
}
