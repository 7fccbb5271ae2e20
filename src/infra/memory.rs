use {
    crate::domain::{
        checkout::{
            CheckoutSessionRecord, CheckoutSessionUpsert, CheckoutSource, CheckoutStatus,
            SessionUpdate,
        },
        error::PipelineError,
        metadata::Metadata,
        order::{OrderRecord, OrderUpsert},
        provider::BoxFuture,
        store::CheckoutStore,
        webhook_log::{LoggedAttempt, NewWebhookLogEntry, WebhookLogRecord, WebhookLogStatus},
    },
    chrono::{DateTime, Utc},
    std::{
        collections::HashMap,
        sync::{Mutex, MutexGuard},
        time::Duration,
    },
    uuid::Uuid,
};

#[derive(Debug, Clone)]
pub struct AccountRecord {
    pub id: Uuid,
    pub email: String,
    pub name: Option<String>,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<String, AccountRecord>,
    sessions: HashMap<String, CheckoutSessionRecord>,
    orders: HashMap<String, OrderRecord>,
    logs: Vec<WebhookLogRecord>,
}

/// Process-local store with the same merge rules as the Postgres one.
/// Used when no `DATABASE_URL` is configured, and by tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, PipelineError> {
        self.inner
            .lock()
            .map_err(|_| PipelineError::Storage("memory store lock poisoned".into()))
    }

    pub fn account(&self, email: &str) -> Option<AccountRecord> {
        let inner = self.lock().ok()?;
        inner.accounts.get(&email.trim().to_lowercase()).cloned()
    }

    pub fn order_count(&self) -> usize {
        self.lock().map(|i| i.orders.len()).unwrap_or(0)
    }

    /// Rewrites a session's creation time. Lets callers simulate age.
    pub fn backdate_session(&self, provider_session_id: &str, created_at: DateTime<Utc>) -> bool {
        let Ok(mut inner) = self.lock() else {
            return false;
        };
        match inner.sessions.get_mut(provider_session_id) {
            Some(session) => {
                session.created_at = created_at;
                true
            }
            None => false,
        }
    }

    fn ensure_account_inner(&self, email: &str, name: Option<&str>) -> Result<Uuid, PipelineError> {
        let key = email.trim().to_lowercase();
        if key.is_empty() {
            return Err(PipelineError::Validation("account email is empty".into()));
        }
        let mut inner = self.lock()?;
        let account = inner
            .accounts
            .entry(key.clone())
            .or_insert_with(|| AccountRecord {
                id: Uuid::now_v7(),
                email: key,
                name: None,
            });
        if account.name.is_none() {
            account.name = name.filter(|n| !n.trim().is_empty()).map(str::to_string);
        }
        Ok(account.id)
    }

    fn upsert_session_inner(
        &self,
        s: &CheckoutSessionUpsert,
    ) -> Result<CheckoutSessionRecord, PipelineError> {
        let now = Utc::now();
        let mut inner = self.lock()?;
        let record = inner
            .sessions
            .entry(s.provider_session_id.clone())
            .and_modify(|existing| {
                existing.status = existing.status.advance(s.status);
                coalesce(&mut existing.payment_intent_id, &s.payment_intent_id);
                coalesce(&mut existing.offer_id, &s.offer_id);
                coalesce(&mut existing.lander_id, &s.lander_id);
                coalesce(&mut existing.customer_email, &s.customer_email);
                existing.metadata.overwrite(&s.metadata);
                existing.updated_at = now;
            })
            .or_insert_with(|| CheckoutSessionRecord {
                id: Uuid::now_v7(),
                provider_session_id: s.provider_session_id.clone(),
                payment_intent_id: s.payment_intent_id.clone(),
                offer_id: s.offer_id.clone(),
                lander_id: s.lander_id.clone(),
                customer_email: s.customer_email.clone(),
                metadata: s.metadata.clone(),
                status: s.status,
                source: s.source,
                created_at: now,
                updated_at: now,
            });
        Ok(record.clone())
    }

    fn update_session_inner(
        &self,
        matches: impl Fn(&CheckoutSessionRecord) -> bool,
        update: &SessionUpdate,
    ) -> Result<Option<CheckoutSessionRecord>, PipelineError> {
        let mut inner = self.lock()?;
        // several sessions can share a payment intent; the newest wins
        let Some(session) = inner
            .sessions
            .values_mut()
            .filter(|s| matches(s))
            .max_by_key(|s| s.created_at)
        else {
            return Ok(None);
        };
        if let Some(status) = update.status {
            session.status = session.status.advance(status);
        }
        coalesce(&mut session.payment_intent_id, &update.payment_intent_id);
        coalesce(&mut session.customer_email, &update.customer_email);
        session.metadata.overwrite(&update.metadata);
        session.updated_at = Utc::now();
        Ok(Some(session.clone()))
    }

    fn upsert_order_inner(&self, o: &OrderUpsert) -> Result<OrderRecord, PipelineError> {
        let now = Utc::now();
        let mut inner = self.lock()?;
        let record = inner
            .orders
            .entry(o.payment_ref.clone())
            .and_modify(|existing| {
                if o.checkout_session_id.is_some() {
                    existing.checkout_session_id = o.checkout_session_id;
                }
                coalesce(&mut existing.provider_session_id, &o.provider_session_id);
                coalesce(&mut existing.offer_id, &o.offer_id);
                coalesce(&mut existing.lander_id, &o.lander_id);
                coalesce(&mut existing.customer_email, &o.customer_email);
                coalesce(&mut existing.customer_name, &o.customer_name);
                coalesce(&mut existing.amount_total, &o.amount_total);
                coalesce(&mut existing.currency, &o.currency);
                coalesce(&mut existing.payment_status, &o.payment_status);
                coalesce(&mut existing.payment_method, &o.payment_method);
                existing.metadata.merge_absent(&o.metadata);
                existing.updated_at = now;
            })
            .or_insert_with(|| OrderRecord {
                id: Uuid::now_v7(),
                payment_ref: o.payment_ref.clone(),
                checkout_session_id: o.checkout_session_id,
                provider_session_id: o.provider_session_id.clone(),
                offer_id: o.offer_id.clone(),
                lander_id: o.lander_id.clone(),
                customer_email: o.customer_email.clone(),
                customer_name: o.customer_name.clone(),
                amount_total: o.amount_total,
                currency: o.currency.clone(),
                payment_status: o.payment_status.clone(),
                payment_method: o.payment_method.clone(),
                metadata: o.metadata.clone(),
                source: o.source.unwrap_or(CheckoutSource::Stripe),
                created_at: now,
                updated_at: now,
            });
        Ok(record.clone())
    }

    fn record_log_inner(&self, e: &NewWebhookLogEntry) -> Result<LoggedAttempt, PipelineError> {
        let mut inner = self.lock()?;
        let same_stream = |r: &&WebhookLogRecord| {
            r.payment_ref == e.payment_ref && r.event_type == e.event_type
        };
        let prior_attempts = inner
            .logs
            .iter()
            .filter(same_stream)
            .filter(|r| r.status != WebhookLogStatus::Pending)
            .count();
        let prior_errors = inner
            .logs
            .iter()
            .filter(same_stream)
            .filter(|r| r.status == WebhookLogStatus::Error)
            .count();

        let attempt = i32::try_from(prior_attempts + 1).unwrap_or(i32::MAX);
        let error_count =
            prior_errors as i64 + i64::from(e.status == WebhookLogStatus::Error);

        inner.logs.push(WebhookLogRecord {
            id: e.id,
            payment_ref: e.payment_ref.clone(),
            provider_session_id: e.provider_session_id.clone(),
            event_type: e.event_type.clone(),
            offer_id: e.offer_id.clone(),
            lander_id: e.lander_id.clone(),
            status: e.status,
            message: e.message.clone(),
            attempt,
            metadata: e.metadata.clone(),
            created_at: Utc::now(),
        });

        Ok(LoggedAttempt {
            attempt,
            error_count,
        })
    }

    fn mark_stale_inner(&self, ttl: Duration) -> Result<u64, PipelineError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| PipelineError::Validation(format!("stale ttl out of range: {e}")))?;
        let now = Utc::now();
        let cutoff = now - ttl;
        let mut inner = self.lock()?;
        let mut swept = 0;
        for session in inner.sessions.values_mut() {
            if session.status == CheckoutStatus::Pending
                && session.created_at < cutoff
            {
                session.status = CheckoutStatus::Abandoned;
                session.updated_at = now;
                swept += 1;
            }
        }
        Ok(swept)
    }
}

fn coalesce<T: Clone>(stored: &mut Option<T>, incoming: &Option<T>) {
    if let Some(value) = incoming {
        *stored = Some(value.clone());
    }
}

impl CheckoutStore for MemoryStore {
    fn ensure_account<'a>(
        &'a self,
        email: &'a str,
        name: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Uuid, PipelineError>> {
        Box::pin(async move { self.ensure_account_inner(email, name) })
    }

    fn upsert_checkout_session<'a>(
        &'a self,
        session: &'a CheckoutSessionUpsert,
    ) -> BoxFuture<'a, Result<CheckoutSessionRecord, PipelineError>> {
        Box::pin(async move { self.upsert_session_inner(session) })
    }

    fn update_session_by_provider_id<'a>(
        &'a self,
        provider_session_id: &'a str,
        update: &'a SessionUpdate,
    ) -> BoxFuture<'a, Result<Option<CheckoutSessionRecord>, PipelineError>> {
        Box::pin(async move {
            self.update_session_inner(|s| s.provider_session_id == provider_session_id, update)
        })
    }

    fn update_session_by_payment_intent<'a>(
        &'a self,
        payment_intent_id: &'a str,
        update: &'a SessionUpdate,
    ) -> BoxFuture<'a, Result<Option<CheckoutSessionRecord>, PipelineError>> {
        Box::pin(async move {
            self.update_session_inner(
                |s| s.payment_intent_id.as_deref() == Some(payment_intent_id),
                update,
            )
        })
    }

    fn find_checkout_session<'a>(
        &'a self,
        provider_session_id: &'a str,
    ) -> BoxFuture<'a, Result<Option<CheckoutSessionRecord>, PipelineError>> {
        Box::pin(async move { Ok(self.lock()?.sessions.get(provider_session_id).cloned()) })
    }

    fn upsert_order<'a>(
        &'a self,
        order: &'a OrderUpsert,
    ) -> BoxFuture<'a, Result<OrderRecord, PipelineError>> {
        Box::pin(async move { self.upsert_order_inner(order) })
    }

    fn merge_order_metadata<'a>(
        &'a self,
        payment_ref: &'a str,
        patch: &'a Metadata,
    ) -> BoxFuture<'a, Result<bool, PipelineError>> {
        Box::pin(async move {
            let mut inner = self.lock()?;
            match inner.orders.get_mut(payment_ref) {
                Some(order) => {
                    order.metadata.overwrite(patch);
                    order.updated_at = Utc::now();
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    fn find_order<'a>(
        &'a self,
        payment_ref: &'a str,
    ) -> BoxFuture<'a, Result<Option<OrderRecord>, PipelineError>> {
        Box::pin(async move { Ok(self.lock()?.orders.get(payment_ref).cloned()) })
    }

    fn record_webhook_log<'a>(
        &'a self,
        entry: &'a NewWebhookLogEntry,
    ) -> BoxFuture<'a, Result<LoggedAttempt, PipelineError>> {
        Box::pin(async move { self.record_log_inner(entry) })
    }

    fn webhook_logs<'a>(
        &'a self,
        payment_ref: &'a str,
    ) -> BoxFuture<'a, Result<Vec<WebhookLogRecord>, PipelineError>> {
        Box::pin(async move {
            Ok(self
                .lock()?
                .logs
                .iter()
                .filter(|r| r.payment_ref == payment_ref)
                .cloned()
                .collect())
        })
    }

    fn mark_stale_sessions(&self, ttl: Duration) -> BoxFuture<'_, Result<u64, PipelineError>> {
        Box::pin(async move { self.mark_stale_inner(ttl) })
    }
}
