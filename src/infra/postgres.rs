pub mod account_repo;
pub mod checkout_repo;
pub mod order_repo;
pub mod webhook_log_repo;

use {
    crate::domain::{
        checkout::{CheckoutSessionRecord, CheckoutSessionUpsert, SessionUpdate},
        error::PipelineError,
        metadata::Metadata,
        order::{OrderRecord, OrderUpsert},
        provider::BoxFuture,
        store::CheckoutStore,
        webhook_log::{LoggedAttempt, NewWebhookLogEntry, WebhookLogRecord},
    },
    checkout_repo::SessionKey,
    sqlx::PgPool,
    std::time::Duration,
    uuid::Uuid,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

impl CheckoutStore for PgStore {
    fn ensure_account<'a>(
        &'a self,
        email: &'a str,
        name: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Uuid, PipelineError>> {
        Box::pin(account_repo::ensure_account(&self.pool, email, name))
    }

    fn upsert_checkout_session<'a>(
        &'a self,
        session: &'a CheckoutSessionUpsert,
    ) -> BoxFuture<'a, Result<CheckoutSessionRecord, PipelineError>> {
        Box::pin(checkout_repo::upsert(&self.pool, session))
    }

    fn update_session_by_provider_id<'a>(
        &'a self,
        provider_session_id: &'a str,
        update: &'a SessionUpdate,
    ) -> BoxFuture<'a, Result<Option<CheckoutSessionRecord>, PipelineError>> {
        Box::pin(checkout_repo::update(
            &self.pool,
            SessionKey::ProviderSessionId(provider_session_id),
            update,
        ))
    }

    fn update_session_by_payment_intent<'a>(
        &'a self,
        payment_intent_id: &'a str,
        update: &'a SessionUpdate,
    ) -> BoxFuture<'a, Result<Option<CheckoutSessionRecord>, PipelineError>> {
        Box::pin(checkout_repo::update(
            &self.pool,
            SessionKey::PaymentIntentId(payment_intent_id),
            update,
        ))
    }

    fn find_checkout_session<'a>(
        &'a self,
        provider_session_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<CheckoutSessionRecord>, PipelineError>> {
        Box::pin(checkout_repo::find(&self.pool, provider_session_id))
    }

    fn upsert_order<'a>(
        &'a self,
        order: &'a OrderUpsert,
    ) -> BoxFuture<'a, Result<OrderRecord, PipelineError>> {
        Box::pin(order_repo::upsert(&self.pool, order))
    }

    fn merge_order_metadata<'a>(
        &'a self,
        payment_ref: &'a str,
        patch: &'a Metadata,
    ) -> BoxFuture<'a, Result<bool, PipelineError>> {
        Box::pin(order_repo::merge_metadata(&self.pool, payment_ref, patch))
    }

    fn find_order<'a>(
        &'a self,
        payment_ref: &'a str,
    ) -> BoxFuture<'a, Result<Option<OrderRecord>, PipelineError>> {
        Box::pin(order_repo::find(&self.pool, payment_ref))
    }

    fn record_webhook_log<'a>(
        &'a self,
        entry: &'a NewWebhookLogEntry,
    ) -> BoxFuture<'a, Result<LoggedAttempt, PipelineError>> {
        Box::pin(webhook_log_repo::insert(&self.pool, entry))
    }

    fn webhook_logs<'a>(
        &'a self,
        payment_ref: &'a str,
    ) -> BoxFuture<'a, Result<Vec<WebhookLogRecord>, PipelineError>> {
        Box::pin(webhook_log_repo::list_for_payment(&self.pool, payment_ref))
    }

    fn mark_stale_sessions(&self, ttl: Duration) -> BoxFuture<'_, Result<u64, PipelineError>> {
        Box::pin(checkout_repo::mark_stale(&self.pool, ttl))
    }
}
