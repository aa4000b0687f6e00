use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::{mailer::MailError, model::OrderStatus};

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("{0}")]
    BusinessRule(String),

    #[error("No OTP found for this order")]
    NoOtp,

    #[error("OTP has expired")]
    OtpExpired,

    #[error("Invalid OTP")]
    InvalidOtp,

    #[error("Order {order_id} is not assigned to {buddy_id}")]
    NotAssigned { order_id: String, buddy_id: String },

    #[error("Insufficient wallet balance: required {required}, available {available}")]
    InsufficientBalance { required: f64, available: f64 },

    #[error("{0}")]
    Conflict(String),

    #[error("Too many OTP requests. Try again in {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error(transparent)]
    Mail(#[from] MailError),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl DeliveryError {
    pub fn order_not_found(order_id: &str) -> Self {
        DeliveryError::NotFound(format!("Order {order_id} not found"))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            DeliveryError::NotFound(_) => StatusCode::NOT_FOUND,
            DeliveryError::Conflict(_) => StatusCode::CONFLICT,
            DeliveryError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            DeliveryError::Mail(_) | DeliveryError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            DeliveryError::Validation(_)
            | DeliveryError::InvalidTransition { .. }
            | DeliveryError::BusinessRule(_)
            | DeliveryError::NoOtp
            | DeliveryError::OtpExpired
            | DeliveryError::InvalidOtp
            | DeliveryError::NotAssigned { .. }
            | DeliveryError::InsufficientBalance { .. } => StatusCode::BAD_REQUEST,
        }
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DeliveryError::Validation(_) => "validation",
            DeliveryError::NotFound(_) => "not_found",
            DeliveryError::InvalidTransition { .. } => "invalid_transition",
            DeliveryError::BusinessRule(_) => "business_rule",
            DeliveryError::NoOtp => "no_otp",
            DeliveryError::OtpExpired => "expired",
            DeliveryError::InvalidOtp => "mismatch",
            DeliveryError::NotAssigned { .. } => "not_assigned",
            DeliveryError::InsufficientBalance { .. } => "insufficient_balance",
            DeliveryError::Conflict(_) => "conflict",
            DeliveryError::RateLimited { .. } => "rate_limited",
            DeliveryError::Mail(_) => "mail",
            DeliveryError::Storage(_) => "storage",
        }
    }
}

impl From<sea_orm::DbErr> for DeliveryError {
    fn from(err: sea_orm::DbErr) -> Self {
        DeliveryError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for DeliveryError {
    fn from(err: serde_json::Error) -> Self {
        DeliveryError::Storage(err.to_string())
    }
}

impl From<JsonRejection> for DeliveryError {
    fn from(rejection: JsonRejection) -> Self {
        DeliveryError::Validation(rejection.body_text())
    }
}

impl IntoResponse for DeliveryError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, kind = self.kind(), "Request failed");
        } else {
            tracing::debug!(error = %self, kind = self.kind(), "Request rejected");
        }

        let mut response = (status, Json(json!({ "error": self.to_string() }))).into_response();
        if let DeliveryError::RateLimited { retry_after_secs } = self {
            response.headers_mut().insert(
                http::header::RETRY_AFTER,
                http::HeaderValue::from(retry_after_secs),
            );
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::MailError;

    #[test]
    fn test_status_codes_follow_error_categories() {
        assert_eq!(DeliveryError::Validation("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(DeliveryError::order_not_found("o1").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(DeliveryError::InvalidOtp.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(DeliveryError::OtpExpired.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            DeliveryError::RateLimited { retry_after_secs: 30 }.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            DeliveryError::Conflict("already settled".into()).status_code(),
            StatusCode::CONFLICT
        );
        let exhausted = MailError::Exhausted {
            attempts: 3,
            last_error: "timeout".into(),
        };
        assert_eq!(
            DeliveryError::from(exhausted).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_messages_match_client_expectations() {
        assert_eq!(DeliveryError::InvalidOtp.to_string(), "Invalid OTP");
        assert_eq!(DeliveryError::NoOtp.to_string(), "No OTP found for this order");
        assert_eq!(
            DeliveryError::from(MailError::Exhausted {
                attempts: 3,
                last_error: "502".into()
            })
            .to_string(),
            "Failed to send OTP email after 3 attempts"
        );
    }

    #[test]
    fn test_rate_limited_response_carries_retry_after() {
        let response = DeliveryError::RateLimited { retry_after_secs: 42 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[http::header::RETRY_AFTER], "42");
    }
}
