/// Unified error types for the Casement backend
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for the service
#[derive(Error, Debug)]
pub enum ApiError {
    /// Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Missing or garbled bearer token
    #[error("Not authorized: {0}")]
    Unauthorized(String),

    /// Operator-only endpoint accessed by a non-operator
    #[error("Access denied: {0}")]
    Forbidden(String),

    /// Request validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conflict errors (e.g., duplicate email)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// OTP does not match or none is pending
    #[error("Invalid OTP")]
    InvalidOtp,

    /// OTP past its expiry
    #[error("OTP has expired. Please request a new one.")]
    OtpExpired,

    /// Login-OTP issuance or login attempted before verification
    #[error("Please verify your email first")]
    EmailNotVerified,

    /// Verification attempted on an already verified account
    #[error("Email already verified")]
    AlreadyVerified,

    /// Another device holds the session within the staleness window
    #[error("Another device is already logged in. Please logout from other device first.")]
    DeviceConflict,

    /// Account has been deactivated by an operator
    #[error("Account is deactivated")]
    AccountDeactivated,

    /// Email delivery failure (non-fatal, folded into a boolean by callers)
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// Rate limiting errors
    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal server errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Response envelope for failures: `{success: false, message, code?}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, None, self.to_string()),
            ApiError::AccountDeactivated => (StatusCode::UNAUTHORIZED, None, self.to_string()),
            ApiError::Forbidden(_) => (StatusCode::FORBIDDEN, None, self.to_string()),
            ApiError::DeviceConflict => (
                StatusCode::FORBIDDEN,
                Some("DEVICE_CONFLICT".to_string()),
                self.to_string(),
            ),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, None, self.to_string()),
            ApiError::Validation(_)
            | ApiError::Conflict(_)
            | ApiError::InvalidOtp
            | ApiError::OtpExpired
            | ApiError::EmailNotVerified
            | ApiError::AlreadyVerified => (StatusCode::BAD_REQUEST, None, self.to_string()),
            ApiError::RateLimitExceeded => (StatusCode::TOO_MANY_REQUESTS, None, self.to_string()),
            // Don't leak internals to clients
            ApiError::Database(_)
            | ApiError::Io(_)
            | ApiError::Internal(_)
            | ApiError::Delivery(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
                "Internal server error".to_string(),
            ),
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("request failed: {}", self);
        }

        let body = Json(ErrorBody {
            success: false,
            message,
            code,
        });

        (status, body).into_response()
    }
}

/// Result type alias for service operations
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_conflict_maps_to_forbidden() {
        let response = ApiError::DeviceConflict.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn internal_errors_do_not_leak_detail() {
        let err = ApiError::Internal("secret connection string".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn envelope_omits_code_when_absent() {
        let body = ErrorBody {
            success: false,
            message: "User not found".to_string(),
            code: None,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("code"));

        let body = ErrorBody {
            success: false,
            message: "Another device is already logged in".to_string(),
            code: Some("DEVICE_CONFLICT".to_string()),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"code\":\"DEVICE_CONFLICT\""));
    }
}
