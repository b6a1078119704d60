use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Failure taxonomy for ledger operations and the routes wrapping them.
///
/// Every rejected operation names the rule that failed; the HTTP mapping
/// lives here so handlers can just `?` their way out.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("slot already reserved")]
    Conflict,

    #[error("{0}")]
    PermissionDenied(String),

    #[error("cannot {action} appointment in state '{current}'")]
    InvalidTransition { action: &'static str, current: String },

    #[error("authentication required")]
    AuthenticationRequired,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        ApiError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        ApiError::NotFound {
            entity,
            id: id.into(),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } | ApiError::InvalidTransition { .. } => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict => StatusCode::CONFLICT,
            ApiError::PermissionDenied(_) => StatusCode::FORBIDDEN,
            ApiError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code() == StatusCode::INTERNAL_SERVER_ERROR {
            log::error!("internal error: {self}");
            return HttpResponse::InternalServerError()
                .json(json!({ "detail": "internal server error" }));
        }

        let mut body = json!({ "detail": self.to_string() });
        if let ApiError::Validation { field, .. } = self {
            body["field"] = json!(field);
        }
        HttpResponse::build(self.status_code()).json(body)
    }
}

/// True when the error is a unique-constraint violation, which the ledger
/// surfaces as `Conflict` for the slot index.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => {
            matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation)
        }
        _ => false,
    }
}
