//! Error types for Bibliodesk server

use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Field name -> list of messages for that field
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Stable error codes returned to API clients
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    NotAuthorized = 2,
    DbFailure = 3,
    NotFound = 4,
    BadValue = 5,
    Duplicate = 6,
    BookOnLoan = 7,
    ReaderHasIssues = 8,
    DuplicateCard = 9,
    AlreadyReturned = 10,
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Authorization failed: {0}")]
    Authorization(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Field-level validation failure. `input` is the submitted payload, echoed
    /// back untouched so the client can re-fill its form.
    #[error("Validation error")]
    Validation {
        fields: FieldErrors,
        input: serde_json::Value,
    },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Book {0} is on loan")]
    BookOnLoan(i32),

    #[error("Reader {0} still holds books")]
    ReaderHasActiveIssues(i32),

    #[error("Card number {0} is already in use")]
    DuplicateCard(String),

    #[error("Issue {0} has already been returned")]
    AlreadyReturned(i32),
}

impl AppError {
    /// Build a validation error from collected field messages and the raw input
    pub fn validation<T: Serialize>(fields: FieldErrors, input: &T) -> Self {
        AppError::Validation {
            fields,
            input: serde_json::to_value(input).unwrap_or(serde_json::Value::Null),
        }
    }
}

/// Error response body
#[derive(Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<FieldErrors>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub input: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let message = self.to_string();
        let mut fields = None;
        let mut input = None;

        let (status, code) = match self {
            AppError::Authentication(_) => (StatusCode::UNAUTHORIZED, ErrorCode::NotAuthorized),
            AppError::Authorization(_) => (StatusCode::FORBIDDEN, ErrorCode::NotAuthorized),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, ErrorCode::NotFound),
            AppError::Validation {
                fields: f,
                input: i,
            } => {
                fields = Some(f);
                input = Some(i);
                (StatusCode::BAD_REQUEST, ErrorCode::BadValue)
            }
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::DbFailure)
            }
            AppError::Conflict(_) => (StatusCode::CONFLICT, ErrorCode::Duplicate),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, ErrorCode::BadValue),
            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorCode::Failure)
            }
            AppError::BookOnLoan(_) => (StatusCode::CONFLICT, ErrorCode::BookOnLoan),
            AppError::ReaderHasActiveIssues(_) => (StatusCode::CONFLICT, ErrorCode::ReaderHasIssues),
            AppError::DuplicateCard(_) => (StatusCode::CONFLICT, ErrorCode::DuplicateCard),
            AppError::AlreadyReturned(_) => (StatusCode::CONFLICT, ErrorCode::AlreadyReturned),
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: format!("{:?}", code),
            message,
            fields,
            input,
        });

        (status, body).into_response()
    }
}

/// Merge `validator` derive output into a field error map
pub fn collect_field_errors(errors: &validator::ValidationErrors, into: &mut FieldErrors) {
    for (field, errs) in errors.field_errors() {
        let messages = into.entry(field.to_string()).or_default();
        for err in errs.iter() {
            let message = err
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| err.code.to_string());
            messages.push(message);
        }
    }
}

/// Push a single message for `field`
pub fn push_field_error(into: &mut FieldErrors, field: &str, message: impl Into<String>) {
    into.entry(field.to_string()).or_default().push(message.into());
}

/// Whether a sqlx error is a unique violation on the named constraint
pub fn is_unique_violation(e: &sqlx::Error, constraint: &str) -> bool {
    let Some(db_err) = e.as_database_error() else {
        return false;
    };
    db_err.is_unique_violation() && db_err.constraint() == Some(constraint)
}

/// Whether a sqlx error is a foreign key violation
pub fn is_foreign_key_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db_err| db_err.is_foreign_key_violation())
        .unwrap_or(false)
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (AppError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (AppError::BookOnLoan(1), StatusCode::CONFLICT),
            (AppError::DuplicateCard("ЧБ-00001".into()), StatusCode::CONFLICT),
            (AppError::AlreadyReturned(3), StatusCode::CONFLICT),
            (AppError::Authorization("no".into()), StatusCode::FORBIDDEN),
            (AppError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }

    #[test]
    fn test_validation_keeps_input() {
        let mut fields = FieldErrors::new();
        push_field_error(&mut fields, "price", "Price must not be negative");
        let err = AppError::validation(fields, &serde_json::json!({ "price": "-1" }));
        match err {
            AppError::Validation { fields, input } => {
                assert_eq!(fields["price"], vec!["Price must not be negative".to_string()]);
                assert_eq!(input["price"], "-1");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
