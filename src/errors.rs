use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::{error::DbErr, SqlErr};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::services::promotions::CouponRejection;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// JSON body returned for every failed request.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Stable machine-readable code (e.g., "NOT_VERIFIED")
    pub code: String,
    /// Human-readable error description
    pub message: String,
    /// Contextual next step for the caller, when one exists
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

/// Coarse classification every rejection falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Unauthorized,
    Forbidden,
    Conflict,
    Unavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(Uuid),

    #[error("{0}")]
    Coupon(#[from] CouponRejection),

    #[error("Seller is not verified")]
    NotVerified { status: String, hint: String },

    #[error("You must create a shop first")]
    NoShop,

    #[error("Verification already pending")]
    AlreadyPending,

    #[error("Seller is already verified")]
    AlreadyVerified,

    #[error("Verification already approved")]
    AlreadyApproved,

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Maps a write failure, turning unique-key violations into `Conflict`.
    pub fn on_unique(err: DbErr, message: impl Into<String>) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => ServiceError::Conflict(message.into()),
            _ => ServiceError::DatabaseError(err),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ValidationError(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Forbidden(_) | Self::NotVerified { .. } | Self::NoShop => ErrorKind::Forbidden,
            Self::Conflict(_)
            | Self::InvalidTransition { .. }
            | Self::ConcurrentModification(_)
            | Self::AlreadyPending
            | Self::AlreadyVerified
            | Self::AlreadyApproved => ErrorKind::Conflict,
            Self::Coupon(CouponRejection::NotFound) => ErrorKind::NotFound,
            Self::Coupon(_) => ErrorKind::Validation,
            Self::DatabaseError(_) | Self::ServiceUnavailable(_) | Self::InternalError(_) => {
                ErrorKind::Unavailable
            }
        }
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(DbErr::Conn(_) | DbErr::ConnectionAcquire(_))
            | Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::DatabaseError(_) | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidTransition { .. } => StatusCode::BAD_REQUEST,
            _ => match self.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
                ErrorKind::Forbidden => StatusCode::FORBIDDEN,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }

    /// Stable token clients can branch on.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DatabaseError(DbErr::Conn(_) | DbErr::ConnectionAcquire(_))
            | Self::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            Self::DatabaseError(_) | Self::InternalError(_) => "INTERNAL_ERROR",
            Self::NotFound(_) => "NOT_FOUND",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Conflict(_) => "CONFLICT",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::ConcurrentModification(_) => "CONCURRENT_MODIFICATION",
            Self::Coupon(rejection) => rejection.code(),
            Self::NotVerified { .. } => "NOT_VERIFIED",
            Self::NoShop => "NO_SHOP",
            Self::AlreadyPending => "ALREADY_PENDING",
            Self::AlreadyVerified => "ALREADY_VERIFIED",
            Self::AlreadyApproved => "ALREADY_APPROVED",
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(DbErr::Conn(_) | DbErr::ConnectionAcquire(_)) => {
                "Service temporarily unavailable".to_string()
            }
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) => "Internal server error".to_string(),
            Self::ConcurrentModification(id) => {
                format!("Concurrent modification for ID {}", id)
            }
            _ => self.to_string(),
        }
    }

    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::NotVerified { hint, .. } => Some(hint.as_str()),
            Self::NoShop => Some("Create a shop before requesting verification"),
            _ => None,
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::NotVerified { status, .. } => {
                Some(serde_json::json!({ "verificationStatus": status }))
            }
            Self::InvalidTransition { from, to } => {
                Some(serde_json::json!({ "from": from, "to": to }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, code = self.code(), "request failed");
        }

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: self.code().to_string(),
            message: self.response_message(),
            hint: self.hint().map(str::to_string),
            details: self.details(),
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use test_case::test_case;

    #[tokio::test]
    async fn service_error_response_includes_request_id() {
        let response =
            crate::tracing::scope_request_id(crate::tracing::RequestId::new("req-123"), async {
                ServiceError::NotFound("missing".into()).into_response()
            })
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.request_id.as_deref(), Some("req-123"));
        assert_eq!(payload.code, "NOT_FOUND");
    }

    #[tokio::test]
    async fn not_verified_response_carries_hint_and_status() {
        let response = ServiceError::NotVerified {
            status: "pending".into(),
            hint: "Your verification is under review. Please wait for approval.".into(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.code, "NOT_VERIFIED");
        assert_eq!(
            payload.hint.as_deref(),
            Some("Your verification is under review. Please wait for approval.")
        );
        assert_eq!(payload.details.unwrap()["verificationStatus"], "pending");
    }

    #[test_case(ServiceError::ValidationError("x".into()), StatusCode::BAD_REQUEST, "VALIDATION_ERROR")]
    #[test_case(ServiceError::NotFound("x".into()), StatusCode::NOT_FOUND, "NOT_FOUND")]
    #[test_case(ServiceError::Forbidden("x".into()), StatusCode::FORBIDDEN, "FORBIDDEN")]
    #[test_case(ServiceError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED, "UNAUTHORIZED")]
    #[test_case(ServiceError::Conflict("x".into()), StatusCode::CONFLICT, "CONFLICT")]
    #[test_case(ServiceError::InvalidTransition { from: "delivered".into(), to: "pending".into() }, StatusCode::BAD_REQUEST, "INVALID_TRANSITION")]
    #[test_case(ServiceError::NoShop, StatusCode::FORBIDDEN, "NO_SHOP")]
    #[test_case(ServiceError::AlreadyApproved, StatusCode::CONFLICT, "ALREADY_APPROVED")]
    #[test_case(ServiceError::Coupon(CouponRejection::NotFound), StatusCode::NOT_FOUND, "COUPON_NOT_FOUND")]
    #[test_case(ServiceError::Coupon(CouponRejection::Expired), StatusCode::BAD_REQUEST, "COUPON_EXPIRED")]
    #[test_case(ServiceError::ServiceUnavailable("db".into()), StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE")]
    fn status_and_code_mapping(err: ServiceError, status: StatusCode, code: &str) {
        assert_eq!(err.status_code(), status);
        assert_eq!(err.code(), code);
    }

    #[test]
    fn transition_errors_are_conflicts() {
        let err = ServiceError::InvalidTransition {
            from: "delivered".into(),
            to: "cancelled".into(),
        };
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn response_message_hides_internal_details() {
        assert_eq!(
            ServiceError::DatabaseError(DbErr::Custom("password=secret".into()))
                .response_message(),
            "Database error"
        );
        assert_eq!(
            ServiceError::InternalError("stack".into()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::NotFound("Order not found".into()).response_message(),
            "Not found: Order not found"
        );
    }
}
