//! Error handling module
//!
//! HTTP-facing error type and its response conversion.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::DomainError;
use crate::ledger::LedgerError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Rule violations (4xx) and store failures (5xx)
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        AppError::Ledger(err.into())
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::InvalidRequest(rejection.body_text())
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

const INTERNAL_MESSAGE: &str = "Internal server error";

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }

            // Ledger rule violations - map to appropriate HTTP status
            AppError::Ledger(LedgerError::Domain(domain_err)) => {
                let status = match domain_err {
                    DomainError::AccountNotFound(_)
                    | DomainError::ClientAccountNotFound(_)
                    | DomainError::HistoryNotFound(_) => StatusCode::NOT_FOUND,
                    DomainError::DuplicateAccount { .. }
                    | DomainError::InvalidAmount(_)
                    | DomainError::InvalidTransfer
                    | DomainError::InsufficientBalance { .. } => StatusCode::BAD_REQUEST,
                };
                let details = match domain_err {
                    DomainError::InvalidAmount(msg) => Some(msg.clone()),
                    _ => None,
                };
                (status, domain_err.reason_code(), details)
            }

            // 500 Internal Server Error
            AppError::Ledger(LedgerError::Store(e)) => {
                tracing::error!("Store error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "store_error", None)
            }
        };

        let error = if status.is_server_error() {
            INTERNAL_MESSAGE.to_string()
        } else {
            self.to_string()
        };

        let body = ErrorResponse {
            error,
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
