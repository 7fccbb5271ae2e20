use {
    crate::{
        AppState,
        adapters::api_errors::ApiError,
        domain::{
            checkout::{CheckoutRequest, CheckoutSessionCreated, RequestContext},
            coupon::{CouponSource, CouponValidation, Discount},
            error::PipelineError,
        },
    },
    axum::{
        Json,
        extract::{State, rejection::JsonRejection},
        http::{HeaderMap, header::USER_AGENT},
    },
    serde::{Deserialize, Serialize},
};

/// First `x-forwarded-for` hop, else `x-real-ip`.
pub fn client_ip(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    header("x-forwarded-for")
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| header("x-real-ip"))
        .map(str::to_string)
}

pub fn request_context(headers: &HeaderMap) -> RequestContext {
    RequestContext {
        client_ip: client_ip(headers),
        user_agent: headers
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    }
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, PipelineError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| PipelineError::InvalidCheckoutRequest(e.body_text()))
}

pub async fn create_checkout_session(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<CheckoutSessionCreated>, ApiError> {
    let request = body(payload)?;
    let session = state
        .checkout
        .create(request, request_context(&headers))
        .await?;
    Ok(Json(session))
}

#[derive(Debug, Deserialize)]
pub struct CouponCheck {
    #[serde(default)]
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct CouponCheckResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount: Option<Discount>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<CouponSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn validate_coupon(
    State(state): State<AppState>,
    payload: Result<Json<CouponCheck>, JsonRejection>,
) -> Result<Json<CouponCheckResponse>, ApiError> {
    let check = body(payload)?;
    let response = match state.coupons.resolve(&check.code).await? {
        CouponValidation::Valid(coupon) => CouponCheckResponse {
            valid: true,
            code: Some(coupon.code),
            discount: Some(coupon.discount),
            source: Some(coupon.source),
            error: None,
        },
        CouponValidation::Invalid { error } => CouponCheckResponse {
            valid: false,
            code: None,
            discount: None,
            source: None,
            error: Some(error),
        },
    };
    Ok(Json(response))
}
