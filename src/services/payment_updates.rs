use crate::domain::{
    checkout::{CheckoutSessionRecord, CheckoutStatus, SessionUpdate},
    error::PipelineError,
    metadata::Metadata,
    order::{OrderUpsert, PaymentUpdate},
    store::CheckoutStore,
    webhook_log::{NewWebhookLogEntry, WebhookLogStatus},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentUpdateResult {
    /// Session moved (or kept) and, for successes, the order upserted.
    Applied { session_status: CheckoutStatus },
    /// No checkout session carries this payment intent yet.
    NoSession,
}

/// `payment_intent.succeeded`: complete the owning session and record the
/// payment on the order. Safe in any order relative to session completion.
pub async fn apply_payment_succeeded(
    store: &dyn CheckoutStore,
    update: &PaymentUpdate,
) -> Result<PaymentUpdateResult, PipelineError> {
    let pi = update.payment_ref.as_str();
    let mut metadata = Metadata::new();
    if let Some(status) = &update.status {
        metadata.insert("paymentIntentStatus", status.as_str());
    }

    let session = store
        .update_session_by_payment_intent(
            pi,
            &SessionUpdate {
                status: Some(CheckoutStatus::Completed),
                payment_intent_id: None,
                customer_email: update.customer_email.clone(),
                metadata,
            },
        )
        .await?;

    let Some(session) = session else {
        tracing::info!(payment_ref = %pi, "no checkout session for payment intent yet");
        return Ok(PaymentUpdateResult::NoSession);
    };

    store
        .upsert_order(&OrderUpsert {
            payment_ref: pi.to_string(),
            checkout_session_id: Some(session.id),
            provider_session_id: Some(session.provider_session_id.clone()),
            offer_id: session.offer_id.clone(),
            lander_id: session.lander_id.clone(),
            customer_email: update
                .customer_email
                .clone()
                .or_else(|| session.customer_email.clone()),
            customer_name: None,
            amount_total: update.amount,
            currency: update.currency.clone(),
            payment_status: update.status.clone(),
            payment_method: update.payment_method.clone(),
            metadata: update.metadata.clone(),
            source: Some(session.source),
        })
        .await?;

    log(store, update, &session, WebhookLogStatus::Success, None).await;
    tracing::info!(payment_ref = %pi, status = %session.status, "payment intent succeeded");
    Ok(PaymentUpdateResult::Applied {
        session_status: session.status,
    })
}

/// `payment_intent.payment_failed` / `canceled`: mark the owning session
/// failed. A session that already completed keeps its status.
pub async fn apply_payment_failed(
    store: &dyn CheckoutStore,
    update: &PaymentUpdate,
) -> Result<PaymentUpdateResult, PipelineError> {
    let pi = update.payment_ref.as_str();
    let message = update
        .failure_message
        .clone()
        .unwrap_or_else(|| "payment failed".to_string());

    let session = store
        .update_session_by_payment_intent(
            pi,
            &SessionUpdate {
                status: Some(CheckoutStatus::Failed),
                payment_intent_id: None,
                customer_email: update.customer_email.clone(),
                metadata: Metadata::new().with("lastPaymentError", message.as_str()),
            },
        )
        .await?;

    let Some(session) = session else {
        tracing::info!(payment_ref = %pi, "no checkout session for failed payment intent");
        return Ok(PaymentUpdateResult::NoSession);
    };

    log(store, update, &session, WebhookLogStatus::Error, Some(message)).await;
    tracing::warn!(payment_ref = %pi, status = %session.status, "payment intent failed");
    Ok(PaymentUpdateResult::Applied {
        session_status: session.status,
    })
}

async fn log(
    store: &dyn CheckoutStore,
    update: &PaymentUpdate,
    session: &CheckoutSessionRecord,
    status: WebhookLogStatus,
    message: Option<String>,
) {
    let mut entry = NewWebhookLogEntry::new(update.payment_ref.as_str(), &update.event_type, status);
    entry.provider_session_id = Some(session.provider_session_id.clone());
    entry.offer_id = session.offer_id.clone();
    entry.lander_id = session.lander_id.clone();
    entry.message = message;
    if let Err(e) = store.record_webhook_log(&entry).await {
        tracing::warn!(error = %e, "webhook log write failed");
    }
}
