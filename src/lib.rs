pub mod adapters;
pub mod config;
pub mod domain;
pub mod infra;
pub mod services;

use {
    axum::{
        Router,
        extract::DefaultBodyLimit,
        routing::{get, post},
    },
    domain::store::CheckoutStore,
    services::{checkout::CheckoutBuilder, coupon::CouponResolver, fulfillment::Fulfillment},
    std::{sync::Arc, time::Duration},
    tower_http::timeout::TimeoutLayer,
};

#[derive(Clone)]
pub struct AppState {
    pub checkout: Arc<CheckoutBuilder>,
    pub fulfillment: Arc<Fulfillment>,
    pub coupons: Arc<CouponResolver>,
    pub store: Arc<dyn CheckoutStore>,
    pub webhook_secrets: Arc<[String]>,
    pub stale_ttl: Duration,
}

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(|| async { "ok" }))
        .route(
            "/api/checkout/session",
            post(adapters::checkout_api::create_checkout_session),
        )
        .route(
            "/api/checkout/coupon",
            post(adapters::checkout_api::validate_coupon),
        )
        .route(
            "/api/stripe/webhook",
            post(adapters::stripe::stripe_webhook_handler),
        )
        .layer(DefaultBodyLimit::max(64 * 1024)) // 64 KB, provider events are typically <20 KB
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .with_state(state)
}
