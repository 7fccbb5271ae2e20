use crate::domain::error::PipelineError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

/// Newtype so the domain error can implement axum's `IntoResponse`.
pub struct ApiError(pub PipelineError);

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self.0 {
            PipelineError::InvalidCheckoutRequest(msg) | PipelineError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "invalid_checkout_request",
                msg.clone(),
            ),
            PipelineError::InvalidCoupon(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_coupon", msg.clone())
            }
            PipelineError::WebhookSignature(msg) => {
                tracing::warn!("rejected webhook: {msg}");
                (
                    StatusCode::BAD_REQUEST,
                    "webhook_signature_invalid",
                    "invalid webhook signature".to_string(),
                )
            }
            PipelineError::MalformedPayload(msg) => {
                tracing::warn!("malformed payload: {msg}");
                (
                    StatusCode::BAD_REQUEST,
                    "malformed_payload",
                    "malformed payload".to_string(),
                )
            }
            PipelineError::CheckoutSessionCreationFailed(msg) => {
                tracing::error!("checkout session creation failed: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "checkout_session_creation_failed",
                    "unable to create checkout session".to_string(),
                )
            }
            PipelineError::UnsupportedPriceConfiguration(msg) => {
                tracing::error!("unsupported price configuration: {msg}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "unsupported_price_configuration",
                    "offer is not purchasable right now".to_string(),
                )
            }
            other => {
                tracing::error!("internal error: {other}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "internal error".to_string(),
                )
            }
        };

        let body = serde_json::json!({
            "error": message,
            "error_code": error_code,
        });

        (status, Json(body)).into_response()
    }
}
