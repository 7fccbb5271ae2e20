use {
    super::{
        checkout::{CheckoutSessionRecord, CheckoutSessionUpsert, SessionUpdate},
        error::PipelineError,
        metadata::Metadata,
        order::{OrderRecord, OrderUpsert},
        provider::BoxFuture,
        webhook_log::{LoggedAttempt, NewWebhookLogEntry, WebhookLogRecord},
    },
    std::time::Duration,
    uuid::Uuid,
};

/// Durable state behind checkout and fulfillment. Every write is a single
/// idempotent upsert keyed by a provider identifier.
pub trait CheckoutStore: Send + Sync {
    /// Upsert an account by (case-insensitive) email. Name is only filled in
    /// when the stored one is empty.
    fn ensure_account<'a>(
        &'a self,
        email: &'a str,
        name: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Uuid, PipelineError>>;

    /// Insert or merge by provider session id. Status only advances;
    /// scalars are COALESCEd; incoming metadata keys overwrite stored ones.
    fn upsert_checkout_session<'a>(
        &'a self,
        session: &'a CheckoutSessionUpsert,
    ) -> BoxFuture<'a, Result<CheckoutSessionRecord, PipelineError>>;

    fn update_session_by_provider_id<'a>(
        &'a self,
        provider_session_id: &'a str,
        update: &'a SessionUpdate,
    ) -> BoxFuture<'a, Result<Option<CheckoutSessionRecord>, PipelineError>>;

    fn update_session_by_payment_intent<'a>(
        &'a self,
        payment_intent_id: &'a str,
        update: &'a SessionUpdate,
    ) -> BoxFuture<'a, Result<Option<CheckoutSessionRecord>, PipelineError>>;

    fn find_checkout_session<'a>(
        &'a self,
        provider_session_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<CheckoutSessionRecord>, PipelineError>>;

    /// Insert or merge by payment reference. Scalars are COALESCEd; incoming
    /// metadata only fills keys that are not stored yet.
    fn upsert_order<'a>(
        &'a self,
        order: &'a OrderUpsert,
    ) -> BoxFuture<'a, Result<OrderRecord, PipelineError>>;

    /// Explicit overwrite of the named metadata keys.
    fn merge_order_metadata<'a>(
        &'a self,
        payment_ref: &'a str,
        patch: &'a Metadata,
    ) -> BoxFuture<'a, Result<bool, PipelineError>>;

    fn find_order<'a>(
        &'a self,
        payment_ref: &'a str,
    ) -> BoxFuture<'a, Result<Option<OrderRecord>, PipelineError>>;

    fn record_webhook_log<'a>(
        &'a self,
        entry: &'a NewWebhookLogEntry,
    ) -> BoxFuture<'a, Result<LoggedAttempt, PipelineError>>;

    fn webhook_logs<'a>(
        &'a self,
        payment_ref: &'a str,
    ) -> BoxFuture<'a, Result<Vec<WebhookLogRecord>, PipelineError>>;

    /// Move `pending` sessions older than `ttl` to `abandoned`.
    fn mark_stale_sessions(&self, ttl: Duration) -> BoxFuture<'_, Result<u64, PipelineError>>;
}
