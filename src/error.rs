//! Error types and HTTP error response handling.
//!
//! This module defines all domain errors and how they are converted
//! into HTTP responses with appropriate status codes and JSON bodies.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::store::StoreError;

/// Application-wide error type.
///
/// Each variant maps to a specific HTTP status code and error message.
///
/// # Error Categories
///
/// - **Resource Errors**: Requested account, product or transaction not found
/// - **Business Logic Errors**: Insufficient balance, out of stock, conflicting ids
/// - **Validation Errors**: Invalid request data
/// - **Authentication Errors**: Invalid or missing API keys
/// - **Store Errors**: Store unreachable or timed out (retryable), or an internal fault
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Requested account does not exist or doesn't belong to the caller.
    #[error("Account not found")]
    AccountNotFound,

    #[error("Product not found")]
    ProductNotFound,

    #[error("Transaction not found")]
    TransactionNotFound,

    /// A record with the same id already exists and is not the same entry.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Account has insufficient balance for the requested operation.
    #[error("Insufficient balance")]
    InsufficientBalance,

    /// Product has fewer units in stock than requested.
    #[error("Out of stock")]
    OutOfStock,

    /// Request body or parameters are invalid.
    ///
    /// The String contains details about what was invalid.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// API key is missing, invalid, or inactive.
    #[error("Invalid API key")]
    InvalidApiKey,

    /// Authenticated, but the key may not perform this operation.
    #[error("Forbidden")]
    Forbidden,

    /// Store unreachable or timed out. The caller may retry with the same idempotency key.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(_) | StoreError::Timeout => {
                AppError::ServiceUnavailable(e.to_string())
            }
            other => AppError::Internal(other.to_string()),
        }
    }
}

/// API key lookups go straight to the pool rather than through the ledger store.
impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::from(e).into()
    }
}

/// Convert AppError into an HTTP response.
///
/// # Response Format
///
/// All errors return JSON in this format:
/// ```json
/// {
///   "error": {
///     "code": "error_type",
///     "message": "Human-readable error message"
///   }
/// }
/// ```
///
/// # Status Code Mapping
///
/// - `InvalidRequest` → 400 Bad Request
/// - `InvalidApiKey` → 401 Unauthorized
/// - `Forbidden` → 403 Forbidden
/// - `*NotFound` → 404 Not Found
/// - `Conflict` → 409 Conflict
/// - `InsufficientBalance`, `OutOfStock` → 422 Unprocessable Entity
/// - `Internal` → 500 Internal Server Error (hides details from client)
/// - `ServiceUnavailable` → 503 Service Unavailable
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::AccountNotFound => {
                (StatusCode::NOT_FOUND, "account_not_found", self.to_string())
            }
            AppError::ProductNotFound => {
                (StatusCode::NOT_FOUND, "product_not_found", self.to_string())
            }
            AppError::TransactionNotFound => (
                StatusCode::NOT_FOUND,
                "transaction_not_found",
                self.to_string(),
            ),
            AppError::Conflict(ref msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            AppError::InsufficientBalance => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "insufficient_balance",
                self.to_string(),
            ),
            AppError::OutOfStock => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "out_of_stock",
                self.to_string(),
            ),
            AppError::InvalidRequest(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", msg.clone())
            }
            AppError::InvalidApiKey => (
                StatusCode::UNAUTHORIZED,
                "invalid_api_key",
                self.to_string(),
            ),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "forbidden", self.to_string()),
            AppError::ServiceUnavailable(ref msg) => {
                tracing::warn!(error = %msg, "store unavailable");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "service_unavailable",
                    "The service is temporarily unavailable".to_string(),
                )
            }
            AppError::Internal(ref msg) => {
                tracing::error!(error = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_client_statuses() {
        let cases = [
            (AppError::AccountNotFound, StatusCode::NOT_FOUND),
            (AppError::ProductNotFound, StatusCode::NOT_FOUND),
            (AppError::Conflict("dup".into()), StatusCode::CONFLICT),
            (AppError::InsufficientBalance, StatusCode::UNPROCESSABLE_ENTITY),
            (AppError::OutOfStock, StatusCode::UNPROCESSABLE_ENTITY),
            (AppError::InvalidRequest("bad".into()), StatusCode::BAD_REQUEST),
            (AppError::InvalidApiKey, StatusCode::UNAUTHORIZED),
            (AppError::Forbidden, StatusCode::FORBIDDEN),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn store_availability_errors_are_retryable() {
        assert!(matches!(
            AppError::from(StoreError::Timeout),
            AppError::ServiceUnavailable(_)
        ));
        assert!(matches!(
            AppError::from(StoreError::Unavailable("connection refused".into())),
            AppError::ServiceUnavailable(_)
        ));
        assert_eq!(
            AppError::from(StoreError::BatchTooLarge(26))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
