use {
    super::{
        events::{self, EventKind, StripeEvent},
        signature::{self, SIGNATURE_HEADER},
    },
    crate::{
        AppState,
        adapters::api_errors::ApiError,
        domain::{error::PipelineError, order::FulfillmentOptions},
        services::{
            payment_updates::{PaymentUpdateResult, apply_payment_failed, apply_payment_succeeded},
            sweeper::spawn_stale_sweep,
        },
    },
    axum::{Json, extract::State, http::HeaderMap},
    chrono::Utc,
    serde_json::json,
};

#[tracing::instrument(
    name = "webhook",
    skip_all,
    fields(event_id = tracing::field::Empty, event_type = tracing::field::Empty)
)]
pub async fn stripe_webhook_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<serde_json::Value>, ApiError> {
    let sig = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| PipelineError::WebhookSignature("missing Stripe-Signature header".into()))?;

    signature::verify(&body, sig, &state.webhook_secrets, Utc::now().timestamp())?;

    let (event, raw_event) = events::parse_event(&body)?;
    tracing::Span::current()
        .record("event_id", tracing::field::display(&event.id))
        .record("event_type", tracing::field::display(&event.event_type));

    let result = dispatch(&state, &event, raw_event).await;
    if let Err(e) = &result {
        tracing::error!(error = %e, "webhook handling failed");
    }

    spawn_stale_sweep(state.store.clone(), state.stale_ttl);

    Ok(Json(result?))
}

async fn dispatch(
    state: &AppState,
    event: &StripeEvent,
    raw_event: serde_json::Value,
) -> Result<serde_json::Value, PipelineError> {
    match event.kind() {
        EventKind::CheckoutSessionCompleted => {
            let order = events::normalize_checkout_session(event, raw_event)?;
            let outcome = state
                .fulfillment
                .process(&order, FulfillmentOptions::default())
                .await?;
            Ok(json!({
                "received": true,
                "orderId": outcome.order_id,
            }))
        }
        EventKind::PaymentIntentSucceeded => {
            let update = events::payment_update(event)?;
            let result = apply_payment_succeeded(&*state.store, &update).await?;
            Ok(applied(result))
        }
        EventKind::PaymentIntentFailed | EventKind::PaymentIntentCanceled => {
            let update = events::payment_update(event)?;
            let result = apply_payment_failed(&*state.store, &update).await?;
            Ok(applied(result))
        }
        EventKind::Unhandled => {
            tracing::info!(livemode = event.livemode, "unhandled event type, acknowledged");
            Ok(json!({ "received": true }))
        }
    }
}

fn applied(result: PaymentUpdateResult) -> serde_json::Value {
    match result {
        PaymentUpdateResult::Applied { session_status } => json!({
            "received": true,
            "sessionStatus": session_status.as_str(),
        }),
        PaymentUpdateResult::NoSession => json!({
            "received": true,
            "sessionStatus": null,
        }),
    }
}
