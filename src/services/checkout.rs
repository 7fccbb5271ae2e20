use {
    super::{
        coupon::CouponResolver,
        order_bump::{BumpDecision, resolve_selection},
        pricing::{BumpLine, PricingInput, PricingPlan, assemble},
    },
    crate::domain::{
        checkout::{
            CheckoutRequest, CheckoutSessionCreated, CheckoutSessionUpsert, CheckoutSource,
            CheckoutStatus, RequestContext, UiMode,
        },
        coupon::{AppliedCoupon, CouponValidation},
        error::PipelineError,
        metadata::Metadata,
        offer::{Offer, OfferCatalog, OrderBumpConfig},
        provider::{CheckoutSessionParams, PaymentProvider, PriceLookup, ProviderPrice},
        store::CheckoutStore,
    },
    chrono::Utc,
    std::{future::Future, sync::Arc, time::Duration},
};

pub const USER_AGENT_MAX_CHARS: usize = 250;
const CHECKOUT_SESSION_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";
/// Survive the provider's key cap ahead of client-supplied tracking keys.
const PROVIDER_METADATA_KEEP_FIRST: [&str; 6] = [
    "offerId",
    "landerId",
    "environment",
    "coupon",
    "orderBump",
    "termsAccepted",
];

#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    /// Public origin used to build default success/cancel URLs.
    pub base_url: String,
    pub provider_timeout: Duration,
}

/// Builds provider checkout sessions from offers, coupons and bumps.
pub struct CheckoutBuilder {
    catalog: Arc<OfferCatalog>,
    provider: Arc<dyn PaymentProvider>,
    coupons: Arc<CouponResolver>,
    store: Arc<dyn CheckoutStore>,
    settings: CheckoutSettings,
}

impl CheckoutBuilder {
    pub fn new(
        catalog: Arc<OfferCatalog>,
        provider: Arc<dyn PaymentProvider>,
        coupons: Arc<CouponResolver>,
        store: Arc<dyn CheckoutStore>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            catalog,
            provider,
            coupons,
            store,
            settings,
        }
    }

    #[tracing::instrument(
        name = "checkout_session",
        skip_all,
        fields(offer_id = tracing::field::Empty, session_id = tracing::field::Empty)
    )]
    pub async fn create(
        &self,
        request: CheckoutRequest,
        ctx: RequestContext,
    ) -> Result<CheckoutSessionCreated, PipelineError> {
        let offer = self.offer_for(&request)?;
        tracing::Span::current().record("offer_id", tracing::field::display(&offer.id));

        let quantity = request.quantity.unwrap_or(1);
        if quantity == 0 {
            return Err(PipelineError::InvalidCheckoutRequest(
                "quantity must be at least 1".into(),
            ));
        }
        let customer_email = customer_email(&request)?;

        let coupon = self.applied_coupon(&request).await?;
        let base_price = self.price(&offer_lookup(offer)).await?;

        let bump_price = match resolve_selection(offer, request.order_bump.as_ref()) {
            BumpDecision::Selected(bump) => Some((bump, self.price(&bump_lookup(offer, bump)).await?)),
            BumpDecision::NotRequested | BumpDecision::Mismatch { .. } => None,
        };

        let plan = assemble(PricingInput {
            product_name: &offer.name,
            base_price: &base_price,
            quantity,
            coupon: coupon.as_ref(),
            order_bump: bump_price
                .as_ref()
                .map(|(config, price)| BumpLine { config, price }),
        })?;

        let metadata = self.session_metadata(offer, &request, &ctx, &plan);
        let provider_metadata = metadata.to_provider_strings(&PROVIDER_METADATA_KEEP_FIRST);
        if !provider_metadata.dropped.is_empty() || !provider_metadata.truncated.is_empty() {
            tracing::warn!(
                dropped = ?provider_metadata.dropped,
                truncated = ?provider_metadata.truncated,
                "metadata trimmed to provider limits"
            );
        }
        let (success_url, cancel_url) = self.urls(offer);

        let params = CheckoutSessionParams {
            line_items: plan.line_items.clone(),
            ui_mode: request.ui_mode,
            success_url,
            cancel_url,
            customer_email: customer_email.clone(),
            client_reference_id: Some(offer.id.clone()),
            promotion_code: plan.promotion_code.clone(),
            metadata: provider_metadata.values,
        };

        let session = bounded(
            self.settings.provider_timeout,
            self.provider.create_checkout_session(&params),
            "create checkout session",
        )
        .await
        .map_err(|e| match e {
            PipelineError::CheckoutSessionCreationFailed(_) => e,
            other => PipelineError::CheckoutSessionCreationFailed(other.to_string()),
        })?;
        tracing::Span::current().record("session_id", tracing::field::display(&session.id));

        let pending = CheckoutSessionUpsert {
            provider_session_id: session.id.clone(),
            payment_intent_id: session.payment_intent_id.clone(),
            offer_id: Some(offer.id.clone()),
            lander_id: request.lander_id.clone(),
            customer_email,
            metadata: metadata.clone(),
            status: CheckoutStatus::Pending,
            source: CheckoutSource::Stripe,
        };
        // Fulfillment upserts this row again on completion.
        if let Err(e) = self.store.upsert_checkout_session(&pending).await {
            tracing::error!(error = %e, "failed to persist pending checkout session");
        }

        tracing::info!(
            subtotal = plan.subtotal.cents(),
            discount = plan.discount.cents(),
            adjusted_total = plan.adjusted_total.cents(),
            bump = plan.bump_amount.map(|b| b.cents()),
            ui_mode = ?request.ui_mode,
            "checkout session created"
        );

        let (client_secret, url) = match request.ui_mode {
            UiMode::Embedded => (session.client_secret, None),
            UiMode::Hosted => (None, session.url),
        };

        Ok(CheckoutSessionCreated {
            id: session.id,
            client_secret,
            url,
            metadata,
        })
    }

    fn offer_for(&self, request: &CheckoutRequest) -> Result<&Offer, PipelineError> {
        let offer_id = request
            .offer_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| PipelineError::InvalidCheckoutRequest("offerId is required".into()))?;
        self.catalog
            .offer(offer_id)
            .ok_or_else(|| PipelineError::InvalidCheckoutRequest(format!("unknown offer: {offer_id}")))
    }

    async fn applied_coupon(
        &self,
        request: &CheckoutRequest,
    ) -> Result<Option<AppliedCoupon>, PipelineError> {
        let Some(raw) = request.coupon_code.as_deref().filter(|c| !c.trim().is_empty()) else {
            return Ok(None);
        };
        match self.coupons.resolve(raw).await? {
            CouponValidation::Valid(coupon) => Ok(Some(coupon)),
            CouponValidation::Invalid { error } => Err(PipelineError::InvalidCoupon(error)),
        }
    }

    async fn price(&self, lookup: &PriceLookup) -> Result<ProviderPrice, PipelineError> {
        bounded(
            self.settings.provider_timeout,
            self.provider.resolve_price(lookup),
            "resolve price",
        )
        .await
        .map_err(|e| match e {
            PipelineError::UnsupportedPriceConfiguration(_) => e,
            other => PipelineError::CheckoutSessionCreationFailed(other.to_string()),
        })
    }

    fn session_metadata(
        &self,
        offer: &Offer,
        request: &CheckoutRequest,
        ctx: &RequestContext,
        plan: &PricingPlan,
    ) -> Metadata {
        let mut metadata = offer.default_metadata.clone();
        metadata.merge_absent(&request.metadata);
        metadata.overwrite(&plan.metadata);

        metadata.insert("offerId", offer.id.as_str());
        metadata.insert("productName", offer.name.as_str());
        metadata.insert("environment", self.provider.environment().as_str());
        if let Some(lander) = request.lander_id.as_deref().filter(|l| !l.is_empty()) {
            metadata.insert("landerId", lander);
        }
        if let Some(affiliate) = request.affiliate_id.as_deref().map(str::trim).filter(|a| !a.is_empty()) {
            metadata.insert("affiliateId", affiliate);
        }
        if let Some(name) = request
            .customer
            .as_ref()
            .and_then(|c| c.name.as_deref())
            .map(str::trim)
            .filter(|n| !n.is_empty())
        {
            metadata.insert("customerName", name);
        }

        if !metadata.contains_key("orderBumpSelected") {
            metadata.insert("orderBumpSelected", false);
        }
        if metadata.get_str("checkoutSource").is_none() {
            metadata.insert("checkoutSource", request.ui_mode.checkout_source_tag());
        }

        if let Some(client_at) = metadata.get_str("termsAcceptedAt").map(str::to_string) {
            if !metadata.contains_key("termsAcceptedAtClient") {
                metadata.insert("termsAcceptedAtClient", client_at);
            }
        }
        metadata.insert("termsAccepted", "true");
        metadata.insert("termsAcceptedAt", Utc::now().to_rfc3339());
        if let Some(ip) = ctx.client_ip.as_deref() {
            metadata.insert("termsAcceptedIp", ip);
        }
        if let Some(ua) = ctx.user_agent.as_deref() {
            metadata.insert("termsAcceptedUserAgent", truncate_chars(ua, USER_AGENT_MAX_CHARS));
        }

        metadata
    }

    fn urls(&self, offer: &Offer) -> (String, String) {
        let base = self.settings.base_url.trim_end_matches('/');
        let success = offer.success_url.clone().unwrap_or_else(|| {
            format!("{base}/checkout/success?session_id={CHECKOUT_SESSION_PLACEHOLDER}")
        });
        let cancel = offer
            .cancel_url
            .clone()
            .unwrap_or_else(|| format!("{base}/{}", offer.id));
        (success, cancel)
    }
}

fn offer_lookup(offer: &Offer) -> PriceLookup {
    PriceLookup {
        slug: offer.id.clone(),
        product_name: offer.name.clone(),
        product_description: offer.description.clone(),
        reference: offer.price.clone(),
    }
}

fn bump_lookup(offer: &Offer, bump: &OrderBumpConfig) -> PriceLookup {
    PriceLookup {
        slug: format!("{}--{}", offer.id, bump.id),
        product_name: bump.title.clone(),
        product_description: bump.description.clone(),
        reference: bump.price.clone(),
    }
}

fn customer_email(request: &CheckoutRequest) -> Result<Option<String>, PipelineError> {
    let email = request
        .customer
        .as_ref()
        .and_then(|c| c.email.as_deref())
        .map(str::trim)
        .filter(|e| !e.is_empty());
    match email {
        Some(e) if !e.contains('@') => Err(PipelineError::InvalidCheckoutRequest(format!(
            "invalid customer email: {e}"
        ))),
        other => Ok(other.map(str::to_lowercase)),
    }
}

pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Apply a deadline to a provider call.
async fn bounded<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, PipelineError>>,
    what: &str,
) -> Result<T, PipelineError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| PipelineError::Provider(format!("{what} timed out after {limit:?}")))?
}
