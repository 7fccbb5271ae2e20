mod common;

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use chrono::Utc;
use common::*;
use serde_json::{Value, json};
use std::{sync::Arc, time::Duration};
use storefront_checkout::{
    AppState, REQUEST_TIMEOUT,
    adapters::stripe::signature::{self, SIGNATURE_HEADER, TIMESTAMP_TOLERANCE_SECS},
    domain::{
        checkout::{CheckoutSessionUpsert, CheckoutSource, CheckoutStatus},
        metadata::Metadata,
        store::CheckoutStore,
        webhook_log::{CRM_SYNC_EVENT, WebhookLogStatus},
    },
    router,
};
use tower::ServiceExt;

async fn call(state: AppState, request: Request<Body>) -> (StatusCode, Value) {
    let response = router(state).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn webhook(body: &str, signature: Option<String>) -> Request<Body> {
    let mut builder = Request::post("/api/stripe/webhook").header("content-type", "application/json");
    if let Some(sig) = signature {
        builder = builder.header(SIGNATURE_HEADER, sig);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn json_post(path: &str, body: Value) -> Request<Body> {
    Request::post(path)
        .header("content-type", "application/json")
        .header("x-forwarded-for", "198.51.100.4, 10.0.0.1")
        .header("user-agent", "integration-test")
        .body(Body::from(body.to_string()))
        .unwrap()
}

// ── 1. signature gate ──────────────────────────────────────────────────────

#[tokio::test]
async fn missing_signature_is_rejected() {
    let h = Harness::new();
    let body = checkout_completed_event("evt_1", "cs_1", Some("pi_1"));

    let (status, json) = call(h.state(), webhook(&body, None)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_code"], "webhook_signature_invalid");
    assert_eq!(h.store.order_count(), 0);
}

#[tokio::test]
async fn tampered_body_is_rejected() {
    let h = Harness::new();
    let body = checkout_completed_event("evt_1", "cs_1", Some("pi_1"));
    let sig = sign(&body);
    let tampered = body.replace("5000", "1");

    let (status, _) = call(h.state(), webhook(&tampered, Some(sig))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(h.store.order_count(), 0);
}

#[test]
fn stale_timestamp_fails_verification() {
    let payload = r#"{"id":"evt_1"}"#;
    let now = Utc::now().timestamp();
    let secrets = vec![WEBHOOK_SECRET.to_string()];

    let old = signature::sign(payload, WEBHOOK_SECRET, now - TIMESTAMP_TOLERANCE_SECS - 1).unwrap();
    assert!(signature::verify(payload, &old, &secrets, now).is_err());

    let recent = signature::sign(payload, WEBHOOK_SECRET, now - 10).unwrap();
    assert!(signature::verify(payload, &recent, &secrets, now).is_ok());

    let future = signature::sign(payload, WEBHOOK_SECRET, now + 3600).unwrap();
    assert!(signature::verify(payload, &future, &secrets, now).is_err());
}

#[test]
fn any_configured_secret_verifies() {
    let payload = r#"{"id":"evt_1"}"#;
    let now = Utc::now().timestamp();
    let secrets = vec!["whsec_live".to_string(), "whsec_test".to_string()];

    let header = signature::sign(payload, "whsec_test", now).unwrap();
    assert!(signature::verify(payload, &header, &secrets, now).is_ok());

    let foreign = signature::sign(payload, "whsec_other", now).unwrap();
    assert!(signature::verify(payload, &foreign, &secrets, now).is_err());

    // extra v1 entries (secret rotation) are tolerated
    let rotated = format!("{header},v1=deadbeef");
    assert!(signature::verify(payload, &rotated, &secrets, now).is_ok());
    assert!(signature::verify(payload, "v1=abc", &secrets, now).is_err());
}

// ── 2. dispatch ────────────────────────────────────────────────────────────

#[tokio::test]
async fn checkout_completed_creates_order() {
    let h = Harness::new();
    let body = checkout_completed_event("evt_1", "cs_1", Some("pi_1"));

    let (status, json) = call(h.state(), webhook(&body, Some(sign(&body)))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["received"], true);
    assert!(json["orderId"].is_string());

    let order = h.store.find_order("pi_1").await.unwrap().unwrap();
    assert_eq!(order.id.to_string(), json["orderId"].as_str().unwrap());
    assert_eq!(order.customer_email.as_deref(), Some("buyer@example.com"));
    assert_eq!(order.lander_id.as_deref(), Some("widget-lander"));
    assert_eq!(order.metadata.get_str("tosAccepted"), Some("true"));

    let session = h.store.find_checkout_session("cs_1").await.unwrap().unwrap();
    assert_eq!(session.status, CheckoutStatus::Completed);
    assert_eq!(h.licenses.calls(), 1);
    assert_eq!(h.crm.calls(), 1);
}

#[tokio::test]
async fn redelivered_webhook_is_idempotent() {
    let h = Harness::new();
    let body = checkout_completed_event("evt_1", "cs_1", Some("pi_1"));

    let (_, first) = call(h.state(), webhook(&body, Some(sign(&body)))).await;
    let (status, second) = call(h.state(), webhook(&body, Some(sign(&body)))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["orderId"], second["orderId"]);
    assert_eq!(h.store.order_count(), 1);
}

#[tokio::test]
async fn session_without_payment_intent_keys_order_by_session() {
    let h = Harness::new();
    let body = checkout_completed_event("evt_1", "cs_free", None);

    let (status, _) = call(h.state(), webhook(&body, Some(sign(&body)))).await;

    assert_eq!(status, StatusCode::OK);
    assert!(h.store.find_order("cs_free").await.unwrap().is_some());
}

#[tokio::test]
async fn payment_failure_marks_session_failed() {
    let h = Harness::new();
    h.store
        .upsert_checkout_session(&CheckoutSessionUpsert {
            provider_session_id: "cs_7".into(),
            payment_intent_id: Some("pi_7".into()),
            offer_id: Some("widget".into()),
            lander_id: None,
            customer_email: None,
            metadata: Metadata::new(),
            status: CheckoutStatus::Pending,
            source: CheckoutSource::Stripe,
        })
        .await
        .unwrap();
    let body = payment_intent_event("evt_7", "payment_intent.payment_failed", "pi_7");

    let (status, json) = call(h.state(), webhook(&body, Some(sign(&body)))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({ "received": true, "sessionStatus": "failed" }));
    let session = h.store.find_checkout_session("cs_7").await.unwrap().unwrap();
    assert_eq!(session.metadata.get_str("lastPaymentError"), Some("Your card was declined."));
}

#[tokio::test]
async fn payment_success_without_session_is_acknowledged() {
    let h = Harness::new();
    let body = payment_intent_event("evt_8", "payment_intent.succeeded", "pi_8");

    let (status, json) = call(h.state(), webhook(&body, Some(sign(&body)))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({ "received": true, "sessionStatus": null }));
    assert_eq!(h.store.order_count(), 0);
}

#[tokio::test]
async fn unknown_event_is_acknowledged() {
    let h = Harness::new();
    let body = json!({
        "id": "evt_9",
        "type": "customer.created",
        "created": 1_700_000_000,
        "livemode": false,
        "data": { "object": { "id": "cus_1" } }
    })
    .to_string();

    let (status, json) = call(h.state(), webhook(&body, Some(sign(&body)))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json, json!({ "received": true }));
}

// ── 3. failures ────────────────────────────────────────────────────────────

#[tokio::test]
async fn malformed_payload_is_rejected() {
    let h = Harness::new();
    let body = "{not json";

    let (status, json) = call(h.state(), webhook(body, Some(sign(body)))).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_code"], "malformed_payload");
}

#[tokio::test]
async fn storage_outage_asks_provider_to_retry() {
    let h = Harness::new();
    let failing: Arc<dyn CheckoutStore> = Arc::new(FailingStore);
    let fulfillment = storefront_checkout::services::fulfillment::Fulfillment::new(
        catalog(),
        failing.clone(),
        h.licenses.clone(),
        h.crm.clone(),
        h.alerter.clone(),
        fast_settings(),
    );
    let state = AppState {
        fulfillment: Arc::new(fulfillment),
        store: failing,
        ..h.state()
    };
    let body = checkout_completed_event("evt_1", "cs_1", Some("pi_1"));

    let (status, json) = call(state, webhook(&body, Some(sign(&body)))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error_code"], "internal_error");
}

#[tokio::test(start_paused = true)]
async fn hung_crm_is_recorded_before_the_request_times_out() {
    let h = Harness::with(FakeLicenses::new(LicenseMode::Grant), FakeCrm::hanging());
    let body = checkout_completed_event("evt_1", "cs_1", Some("pi_1"));
    let started = tokio::time::Instant::now();

    let (status, _) = call(h.state(), webhook(&body, Some(sign(&body)))).await;

    assert_eq!(status, StatusCode::OK);
    assert!(started.elapsed() < REQUEST_TIMEOUT);
    assert_eq!(h.store.order_count(), 1);

    let logs = h.store.webhook_logs("pi_1").await.unwrap();
    let crm_log = logs.iter().find(|l| l.event_type == CRM_SYNC_EVENT).unwrap();
    assert_eq!(crm_log.status, WebhookLogStatus::Error);
    assert_eq!(crm_log.message.as_deref(), Some("crm call timed out"));
}

// ── 4. stale sweep piggybacks on webhooks ──────────────────────────────────

#[tokio::test]
async fn webhook_triggers_stale_sweep() {
    let h = Harness::new();
    h.store
        .upsert_checkout_session(&CheckoutSessionUpsert {
            provider_session_id: "cs_stale".into(),
            payment_intent_id: None,
            offer_id: Some("widget".into()),
            lander_id: None,
            customer_email: None,
            metadata: Metadata::new(),
            status: CheckoutStatus::Pending,
            source: CheckoutSource::Stripe,
        })
        .await
        .unwrap();
    h.store.backdate_session("cs_stale", Utc::now() - chrono::Duration::days(2));

    let body = json!({
        "id": "evt_10",
        "type": "customer.created",
        "created": 1_700_000_000,
        "livemode": false,
        "data": { "object": {} }
    })
    .to_string();
    let (status, _) = call(h.state(), webhook(&body, Some(sign(&body)))).await;
    assert_eq!(status, StatusCode::OK);

    // the sweep is detached; give it a moment
    let mut swept = false;
    for _ in 0..50 {
        let session = h.store.find_checkout_session("cs_stale").await.unwrap().unwrap();
        if session.status == CheckoutStatus::Abandoned {
            swept = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(swept, "stale session was not abandoned");
}

// ── 5. checkout endpoints ──────────────────────────────────────────────────

#[tokio::test]
async fn healthz_responds() {
    let h = Harness::new();
    let response = router(h.state())
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn checkout_endpoint_returns_url_and_captures_caller() {
    let h = Harness::new();
    let (status, json) = call(
        h.state(),
        json_post(
            "/api/checkout/session",
            json!({ "offerId": "widget", "couponCode": "TENOFF", "customer": { "email": "a@b.co" } }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], "cs_test_1");
    assert_eq!(json["url"], "https://checkout.test/cs_test_1");
    assert!(json.get("client_secret").is_none());

    let params = h.provider.last_session();
    assert_eq!(params.metadata.get("termsAcceptedIp").map(String::as_str), Some("198.51.100.4"));
    assert_eq!(
        params.metadata.get("termsAcceptedUserAgent").map(String::as_str),
        Some("integration-test")
    );
}

#[tokio::test]
async fn checkout_endpoint_embedded_mode() {
    let h = Harness::new();
    let (status, json) = call(
        h.state(),
        json_post("/api/checkout/session", json!({ "offerId": "widget", "uiMode": "embedded" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["client_secret"], "cs_test_1_secret");
    assert!(json.get("url").is_none());
}

#[tokio::test]
async fn checkout_endpoint_rejects_bad_input() {
    let h = Harness::new();

    let (status, json) = call(h.state(), json_post("/api/checkout/session", json!({ "offerId": "nope" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_code"], "invalid_checkout_request");

    let (status, json) = call(
        h.state(),
        json_post("/api/checkout/session", json!({ "offerId": "widget", "couponCode": "BOGUS" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error_code"], "invalid_coupon");

    let (status, _) = call(h.state(), json_post("/api/checkout/session", json!({ "quantity": "many" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn checkout_endpoint_reports_provider_failure() {
    let h = Harness::new();
    *h.provider.fail_sessions.lock().unwrap() = Some("api down".into());

    let (status, json) = call(h.state(), json_post("/api/checkout/session", json!({ "offerId": "widget" }))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error_code"], "checkout_session_creation_failed");
}

#[tokio::test]
async fn coupon_endpoint_validates_codes() {
    let h = Harness::new();

    let (status, json) = call(h.state(), json_post("/api/checkout/coupon", json!({ "code": "save20" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["valid"], true);
    assert_eq!(json["code"], "SAVE20");
    assert_eq!(json["source"], "local");
    assert_eq!(json["discount"]["type"], "percentage");

    let (status, json) = call(h.state(), json_post("/api/checkout/coupon", json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["valid"], false);
    assert_eq!(json["error"], "Coupon code is required");
}
