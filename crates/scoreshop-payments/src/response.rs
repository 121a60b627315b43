//! Axum Response Mapping
//!
//! Translates [`PaymentError`] into an HTTP status and a JSON body. Only the
//! user message and code leave the process; the detail goes to the log.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use scoreshop_core::DeliveryError;
use serde::Serialize;

use crate::error::PaymentError;

/// JSON error body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl PaymentError {
    /// HTTP status for this error
    ///
    /// 4xx tells the processor to stop retrying; 5xx asks it to re-deliver.
    pub fn status_code(&self) -> StatusCode {
        match self {
            PaymentError::Authentication(_)
            | PaymentError::MalformedEvent(_)
            | PaymentError::MissingRecipient { .. }
            | PaymentError::InvalidRecipient(_)
            | PaymentError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            PaymentError::DeliveryInProgress(_) => StatusCode::SERVICE_UNAVAILABLE,
            PaymentError::DeliveryFailed(inner) => match inner {
                DeliveryError::AssetUnavailable(_) | DeliveryError::TransientDelivery(_) => {
                    StatusCode::SERVICE_UNAVAILABLE
                }
                DeliveryError::PermanentDelivery(_) | DeliveryError::InvalidRecipient(_) => {
                    StatusCode::BAD_REQUEST
                }
                DeliveryError::Storage(_) | DeliveryError::Config(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            PaymentError::Stripe(_) => StatusCode::BAD_GATEWAY,
            PaymentError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        } else {
            tracing::warn!(code = self.code(), error = %self, "Request rejected");
        }

        let body = ErrorResponse {
            error: self.user_message().to_string(),
            code: self.code().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            PaymentError::Authentication("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PaymentError::MissingRecipient { payment_id: "pi_1".into() }.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PaymentError::from(DeliveryError::AssetUnavailable("404".into())).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            PaymentError::from(DeliveryError::PermanentDelivery("550".into())).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            PaymentError::from(DeliveryError::Storage("poisoned".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_retryable_errors_are_server_errors() {
        let errors = [
            PaymentError::DeliveryInProgress("pi_1".into()),
            PaymentError::from(DeliveryError::AssetUnavailable("404".into())),
            PaymentError::from(DeliveryError::TransientDelivery("429".into())),
            PaymentError::Authentication("x".into()),
            PaymentError::from(DeliveryError::PermanentDelivery("550".into())),
        ];
        for err in errors {
            assert_eq!(err.is_retryable(), err.status_code().is_server_error(), "{err}");
        }
    }
}
