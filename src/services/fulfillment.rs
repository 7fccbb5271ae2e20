use {
    super::retry::{RetryConfig, with_retry},
    crate::domain::{
        checkout::{CheckoutSessionRecord, CheckoutSessionUpsert, CheckoutStatus, SessionUpdate},
        error::{CrmError, PipelineError},
        license::{LicenseConfig, LicenseGrant, LicenseRequest},
        metadata::Metadata,
        offer::{Offer, OfferCatalog},
        order::{CrmOutcome, FulfillmentOptions, FulfillmentOutcome, LicenseOutcome, NormalizedOrder, OrderUpsert},
        provider::{CrmClient, CrmSyncRequest, LicenseService, OpsAlert, OpsAlerter},
        store::CheckoutStore,
        webhook_log::{
            CRM_SYNC_EVENT, LoggedAttempt, NewWebhookLogEntry, OPS_ALERT_THRESHOLD,
            WebhookLogStatus,
        },
    },
    chrono::Utc,
    std::{sync::Arc, time::Duration},
};

pub const MISSING_CUSTOMER_EMAIL: &str = "missing_customer_email";
pub const MISSING_CONFIGURATION: &str = "missing_configuration";
pub const ALREADY_SYNCED: &str = "already_synced";
pub const SKIP_SIDE_EFFECTS: &str = "skip_side_effects";
pub const MISSING_OFFER: &str = "missing_offer_id";

#[derive(Debug, Clone)]
pub struct FulfillmentSettings {
    pub license_timeout: Duration,
    pub crm_timeout: Duration,
    /// Ceiling for the whole CRM step, retries and backoff included.
    pub crm_budget: Duration,
    pub alert_timeout: Duration,
    pub crm_retry: RetryConfig,
    pub alert_threshold: i64,
}

impl Default for FulfillmentSettings {
    fn default() -> Self {
        Self {
            license_timeout: Duration::from_secs(5),
            crm_timeout: Duration::from_secs(8),
            crm_budget: Duration::from_secs(15),
            alert_timeout: Duration::from_secs(5),
            crm_retry: RetryConfig::default(),
            alert_threshold: OPS_ALERT_THRESHOLD,
        }
    }
}

impl FulfillmentSettings {
    /// Longest a single delivery can spend waiting on outside services.
    pub fn worst_case(&self) -> Duration {
        self.license_timeout + self.crm_budget + self.alert_timeout
    }
}

/// Post-payment pipeline: account, session, order, license, CRM, alert.
/// Every step is keyed by a stable identity so replays converge.
pub struct Fulfillment {
    catalog: Arc<OfferCatalog>,
    store: Arc<dyn CheckoutStore>,
    licenses: Arc<dyn LicenseService>,
    crm: Arc<dyn CrmClient>,
    alerter: Arc<dyn OpsAlerter>,
    settings: FulfillmentSettings,
}

impl Fulfillment {
    pub fn new(
        catalog: Arc<OfferCatalog>,
        store: Arc<dyn CheckoutStore>,
        licenses: Arc<dyn LicenseService>,
        crm: Arc<dyn CrmClient>,
        alerter: Arc<dyn OpsAlerter>,
        settings: FulfillmentSettings,
    ) -> Self {
        Self {
            catalog,
            store,
            licenses,
            crm,
            alerter,
            settings,
        }
    }

    #[tracing::instrument(
        name = "fulfillment",
        skip_all,
        fields(payment_ref = %order.payment_ref, session_id = %order.provider_session_id)
    )]
    pub async fn process(
        &self,
        order: &NormalizedOrder,
        options: FulfillmentOptions,
    ) -> Result<FulfillmentOutcome, PipelineError> {
        let payment_ref = order.payment_ref.as_str();
        self.append_log(self.log_entry(order, &order.event_type, WebhookLogStatus::Pending))
            .await;

        // ── 1. account ─────────────────────────────────────────────────────
        let account_id = match order.customer_email.as_deref() {
            Some(email) => Some(
                self.store
                    .ensure_account(email, order.customer_name.as_deref())
                    .await?,
            ),
            None => {
                tracing::info!("no customer email, skipping account");
                None
            }
        };

        // ── 2. checkout session ────────────────────────────────────────────
        let session = self
            .store
            .upsert_checkout_session(&CheckoutSessionUpsert {
                provider_session_id: order.provider_session_id.as_str().to_string(),
                payment_intent_id: payment_ref
                    .starts_with("pi_")
                    .then(|| payment_ref.to_string()),
                offer_id: order.offer_id.clone(),
                lander_id: order.lander_id.clone(),
                customer_email: order.customer_email.clone(),
                metadata: order.metadata.clone(),
                status: CheckoutStatus::Completed,
                source: order.source,
            })
            .await?;

        // ── 3. license configuration (recorded with the order) ─────────────
        let offer = order.offer_id.as_deref().and_then(|id| self.catalog.offer(id));
        let license_config = order.offer_id.as_deref().map(|offer_id| {
            let template = offer.map(|o| o.license.clone()).unwrap_or_default();
            LicenseConfig::resolve(offer_id, &template, &order.metadata)
        });
        if order.offer_id.is_some() && offer.is_none() {
            tracing::warn!(offer_id = ?order.offer_id, "offer not in catalog, using license defaults");
        }

        // ── 4. order ───────────────────────────────────────────────────────
        let record = self
            .store
            .upsert_order(&self.order_upsert(order, &session, license_config.as_ref())?)
            .await?;
        tracing::info!(order_id = %record.id, "order persisted");

        let mut outcome = FulfillmentOutcome {
            order_id: record.id,
            checkout_session_id: session.id,
            account_id,
            license_config: license_config.clone(),
            license: LicenseOutcome::Skipped(SKIP_SIDE_EFFECTS.into()),
            crm: CrmOutcome::Skipped(SKIP_SIDE_EFFECTS.into()),
        };

        if options.skip_side_effects {
            tracing::info!("side effects skipped");
            return Ok(outcome);
        }

        let Some(license_config) = license_config else {
            tracing::warn!("order carries no offer id, skipping license and crm");
            outcome.license = LicenseOutcome::Skipped(MISSING_OFFER.into());
            outcome.crm = CrmOutcome::Skipped(MISSING_OFFER.into());
            return Ok(outcome);
        };

        // ── 5 + 6. license ─────────────────────────────────────────────────
        outcome.license = self.issue_license(order, &license_config).await?;
        let grant = match &outcome.license {
            LicenseOutcome::Issued(grant) => Some(grant),
            _ => None,
        };

        // ── 7 + 8. crm ─────────────────────────────────────────────────────
        outcome.crm = self
            .sync_crm(order, offer, &session, grant, &license_config)
            .await;

        let mut done = self.log_entry(order, &order.event_type, WebhookLogStatus::Success);
        done.metadata = Metadata::new()
            .with("license", license_status(&outcome.license))
            .with("crm", crm_status(&outcome.crm));
        self.append_log(done).await;

        Ok(outcome)
    }

    fn order_upsert(
        &self,
        order: &NormalizedOrder,
        session: &CheckoutSessionRecord,
        license_config: Option<&LicenseConfig>,
    ) -> Result<OrderUpsert, PipelineError> {
        let mut metadata = order.metadata.clone();
        metadata.insert("providerEventId", order.event_id.as_str());
        metadata.insert("providerEventType", order.event_type.as_str());
        metadata.insert("rawEvent", serde_json::to_string(&order.raw_event)?);
        if let Some(config) = license_config {
            metadata.insert(
                "licenseConfig",
                Metadata::new()
                    .with("tier", config.tier.as_str())
                    .with("entitlements", config.entitlements.join(","))
                    .with("features", serde_json::to_string(&config.features)?),
            );
        }

        Ok(OrderUpsert {
            payment_ref: order.payment_ref.as_str().to_string(),
            checkout_session_id: Some(session.id),
            provider_session_id: Some(order.provider_session_id.as_str().to_string()),
            offer_id: order.offer_id.clone(),
            lander_id: order.lander_id.clone(),
            customer_email: order.customer_email.clone(),
            customer_name: order.customer_name.clone(),
            amount_total: order.amount_total,
            currency: order.currency.clone(),
            payment_status: order.payment_status.clone(),
            payment_method: order.payment_method.clone(),
            metadata,
            source: Some(order.source),
        })
    }

    /// Failure is reported, never propagated: the order is already stored
    /// and the missing license shows up in its metadata.
    async fn issue_license(
        &self,
        order: &NormalizedOrder,
        config: &LicenseConfig,
    ) -> Result<LicenseOutcome, PipelineError> {
        let payment_ref = order.payment_ref.as_str();
        let Some(email) = order.customer_email.as_deref() else {
            tracing::info!("no customer email, license not issued");
            return Ok(LicenseOutcome::Skipped(MISSING_CUSTOMER_EMAIL.into()));
        };

        let request = LicenseRequest {
            id: payment_ref.to_string(),
            provider: order.source.as_str().to_string(),
            provider_object_id: payment_ref.to_string(),
            user_email: email.to_string(),
            tier: config.tier.clone(),
            entitlements: config.entitlements.clone(),
            features: config.features.clone(),
            metadata: order.metadata.clone(),
            status: "completed".into(),
            event_type: order.event_type.clone(),
            amount: order.amount_total,
            currency: order.currency.clone(),
            raw_event: order.raw_event.clone(),
        };

        let result = tokio::time::timeout(self.settings.license_timeout, self.licenses.issue(&request))
            .await
            .unwrap_or_else(|_| {
                Err(PipelineError::LicenseIssuanceFailed(format!(
                    "timed out after {:?}",
                    self.settings.license_timeout
                )))
            });

        match result {
            Ok(Some(grant)) => {
                let patch = Metadata::new().with("license", grant.stamp(Utc::now()));
                self.store.merge_order_metadata(payment_ref, &patch).await?;
                tracing::info!(license_id = ?grant.license_id, action = ?grant.action, "license issued");
                Ok(LicenseOutcome::Issued(grant))
            }
            Ok(None) => {
                tracing::info!("license service returned no license");
                Ok(LicenseOutcome::NotIssued)
            }
            Err(e) => {
                tracing::error!(error = %e, tier = %config.tier, "license issuance failed");
                let patch = Metadata::new()
                    .with("licenseError", e.to_string())
                    .with("licenseErrorAt", Utc::now().to_rfc3339());
                if let Err(store_err) = self.store.merge_order_metadata(payment_ref, &patch).await {
                    tracing::error!(error = %store_err, "failed to record license error");
                }
                Ok(LicenseOutcome::Failed(e.to_string()))
            }
        }
    }

    async fn sync_crm(
        &self,
        order: &NormalizedOrder,
        offer: Option<&Offer>,
        session: &CheckoutSessionRecord,
        grant: Option<&LicenseGrant>,
        license: &LicenseConfig,
    ) -> CrmOutcome {
        let Some((offer, crm_config)) = offer.and_then(|o| o.crm.as_ref().map(|c| (o, c))) else {
            let mut entry = self.log_entry(order, CRM_SYNC_EVENT, WebhookLogStatus::Success);
            entry.message = Some("crm sync skipped".into());
            entry.metadata = Metadata::new()
                .with("outcome", "skipped")
                .with("skipReason", MISSING_CONFIGURATION);
            self.append_log(entry).await;
            return CrmOutcome::Skipped(MISSING_CONFIGURATION.into());
        };

        let Some(email) = order.customer_email.clone() else {
            tracing::error!(offer_id = %offer.id, "crm sync impossible without customer email");
            self.patch_session(
                session,
                Metadata::new().with("crmSyncError", MISSING_CUSTOMER_EMAIL),
            )
            .await;
            let mut entry = self.log_entry(order, CRM_SYNC_EVENT, WebhookLogStatus::Error);
            entry.message = Some(MISSING_CUSTOMER_EMAIL.into());
            if let Some(logged) = self.append_log(entry).await {
                self.alert_if_needed(order, logged, MISSING_CUSTOMER_EMAIL).await;
            }
            return CrmOutcome::Failed(MISSING_CUSTOMER_EMAIL.into());
        };

        if session.metadata.get_str("crmSyncedAt").is_some() {
            tracing::info!("crm already synced for this session");
            return CrmOutcome::Skipped(ALREADY_SYNCED.into());
        }

        let request = CrmSyncRequest {
            offer_id: offer.id.clone(),
            offer_name: offer.name.clone(),
            config: crm_config.into(),
            email,
            name: order.customer_name.clone(),
            phone: order.customer_phone.clone(),
            amount_total: order.amount_total,
            currency: order.currency.clone(),
            payment_ref: order.payment_ref.as_str().to_string(),
            provider_session_id: order.provider_session_id.as_str().to_string(),
            license_key: grant.and_then(|g| g.license_key.clone()),
            license_tier: Some(license.tier.clone()),
            license_entitlements: license.entitlements.clone(),
            affiliate_id: order.metadata.get_str("affiliateId").map(str::to_string),
        };

        let crm_timeout = self.settings.crm_timeout;
        let crm = &self.crm;
        let request = &request;
        let attempts = with_retry(&self.settings.crm_retry, CrmError::is_retryable, || async move {
            tokio::time::timeout(crm_timeout, crm.sync_purchase(request))
                .await
                .unwrap_or(Err(CrmError::Timeout))
        });
        // Expiry must leave room to record the failure before the request times out.
        let result = tokio::time::timeout(self.settings.crm_budget, attempts)
            .await
            .unwrap_or_else(|_| {
                tracing::warn!(budget = ?self.settings.crm_budget, "crm sync budget exhausted");
                Err(CrmError::Timeout)
            });

        match result {
            Ok(synced) => {
                let mut patch = Metadata::new()
                    .with("crmSyncedAt", Utc::now().to_rfc3339())
                    .with("crmSyncError", "");
                if let Some(contact_id) = &synced.contact_id {
                    patch.insert("crmContactId", contact_id.as_str());
                }
                self.patch_session(session, patch).await;

                let mut entry = self.log_entry(order, CRM_SYNC_EVENT, WebhookLogStatus::Success);
                entry.message = Some("crm sync succeeded".into());
                entry.metadata = Metadata::new()
                    .with("outcome", "synced")
                    .with("opportunityCreated", synced.opportunity_created);
                self.append_log(entry).await;

                tracing::info!(contact_id = ?synced.contact_id, "crm synced");
                CrmOutcome::Synced {
                    contact_id: synced.contact_id,
                    opportunity_created: synced.opportunity_created,
                }
            }
            Err(e) => {
                tracing::error!(error = %e, status = ?e.status(), "crm sync failed");
                self.patch_session(session, Metadata::new().with("crmSyncError", e.to_string()))
                    .await;

                let mut entry = self.log_entry(order, CRM_SYNC_EVENT, WebhookLogStatus::Error);
                entry.message = Some(e.to_string());
                if let Some(status) = e.status() {
                    entry.metadata.insert("httpStatus", i64::from(status));
                }
                if let Some(logged) = self.append_log(entry).await {
                    self.alert_if_needed(order, logged, &e.to_string()).await;
                }
                CrmOutcome::Failed(e.to_string())
            }
        }
    }

    async fn alert_if_needed(&self, order: &NormalizedOrder, logged: LoggedAttempt, error: &str) {
        if logged.error_count < self.settings.alert_threshold {
            return;
        }

        let alert = OpsAlert {
            title: "CRM sync failed after multiple attempts".into(),
            context: Metadata::new()
                .with("paymentRef", order.payment_ref.as_str())
                .with("checkoutSessionId", order.provider_session_id.as_str())
                .with("offerId", order.offer_id.clone().unwrap_or_default())
                .with("customerEmail", order.customer_email.clone().unwrap_or_default())
                .with("attempts", logged.error_count)
                .with("error", error),
        };

        match tokio::time::timeout(self.settings.alert_timeout, self.alerter.send(&alert)).await {
            Ok(Ok(())) => tracing::warn!(failures = logged.error_count, "ops alert sent"),
            Ok(Err(e)) => tracing::error!(error = %e, "ops alert failed"),
            Err(_) => tracing::error!("ops alert timed out"),
        }
    }

    async fn patch_session(&self, session: &CheckoutSessionRecord, metadata: Metadata) {
        let update = SessionUpdate::metadata_only(metadata);
        if let Err(e) = self
            .store
            .update_session_by_provider_id(&session.provider_session_id, &update)
            .await
        {
            tracing::error!(error = %e, "failed to update checkout session metadata");
        }
    }

    fn log_entry(
        &self,
        order: &NormalizedOrder,
        event_type: &str,
        status: WebhookLogStatus,
    ) -> NewWebhookLogEntry {
        let mut entry = NewWebhookLogEntry::new(order.payment_ref.as_str(), event_type, status);
        entry.provider_session_id = Some(order.provider_session_id.as_str().to_string());
        entry.offer_id = order.offer_id.clone();
        entry.lander_id = order.lander_id.clone();
        entry
    }

    /// Observability only: a failed log write never fails the pipeline.
    async fn append_log(&self, entry: NewWebhookLogEntry) -> Option<LoggedAttempt> {
        match self.store.record_webhook_log(&entry).await {
            Ok(logged) => Some(logged),
            Err(e) => {
                tracing::warn!(error = %e, event_type = %entry.event_type, "webhook log write failed");
                None
            }
        }
    }
}

fn license_status(outcome: &LicenseOutcome) -> &'static str {
    match outcome {
        LicenseOutcome::Issued(_) => "issued",
        LicenseOutcome::NotIssued => "not_issued",
        LicenseOutcome::Skipped(_) => "skipped",
        LicenseOutcome::Failed(_) => "failed",
    }
}

fn crm_status(outcome: &CrmOutcome) -> &'static str {
    match outcome {
        CrmOutcome::Synced { .. } => "synced",
        CrmOutcome::Skipped(_) => "skipped",
        CrmOutcome::Failed(_) => "failed",
    }
}
