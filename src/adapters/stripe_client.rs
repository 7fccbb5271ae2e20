use {
    crate::domain::{
        checkout::UiMode,
        coupon::{Coupon, Discount},
        error::PipelineError,
        money::{Currency, MoneyAmount},
        offer::PriceReference,
        provider::{
            BoxFuture, CheckoutSessionParams, CouponStore, Environment, LineItem, PaymentProvider,
            PriceLookup, ProviderCheckoutSession, ProviderPrice,
        },
    },
    chrono::DateTime,
    std::collections::HashMap,
};

const LOOKUP_KEY_PREFIX: &str = "slug:";

pub struct StripeProvider {
    client: stripe::Client,
    environment: Environment,
    /// Account prices are cloned from when missing in `client`'s environment.
    source: Option<stripe::Client>,
}

impl StripeProvider {
    pub fn new(secret_key: &str, source_secret_key: Option<&str>) -> Self {
        Self {
            client: stripe::Client::new(secret_key),
            environment: Environment::from_secret_key(secret_key),
            source: source_secret_key
                .filter(|k| *k != secret_key)
                .map(stripe::Client::new),
        }
    }
}

fn api_error(context: &str, e: stripe::StripeError) -> PipelineError {
    PipelineError::Provider(format!("Stripe API ({context}): {e}"))
}

fn is_missing(e: &stripe::StripeError) -> bool {
    matches!(e, stripe::StripeError::Stripe(req) if req.http_status == 404)
}

fn convert_currency(c: stripe::Currency) -> Result<Currency, PipelineError> {
    match c {
        stripe::Currency::USD => Ok(Currency::Usd),
        stripe::Currency::EUR => Ok(Currency::Eur),
        stripe::Currency::GBP => Ok(Currency::Gbp),
        stripe::Currency::CAD => Ok(Currency::Cad),
        stripe::Currency::AUD => Ok(Currency::Aud),
        other => Err(PipelineError::UnsupportedPriceConfiguration(format!(
            "unsupported currency: {other:?}"
        ))),
    }
}

fn to_stripe_currency(c: Currency) -> stripe::Currency {
    match c {
        Currency::Usd => stripe::Currency::USD,
        Currency::Eur => stripe::Currency::EUR,
        Currency::Gbp => stripe::Currency::GBP,
        Currency::Cad => stripe::Currency::CAD,
        Currency::Aud => stripe::Currency::AUD,
    }
}

fn provider_price(price: &stripe::Price, product_name: &str) -> Result<ProviderPrice, PipelineError> {
    let currency = price.currency.ok_or_else(|| {
        PipelineError::UnsupportedPriceConfiguration(format!("price {} has no currency", price.id))
    })?;
    Ok(ProviderPrice {
        id: Some(price.id.to_string()),
        unit_amount: price.unit_amount.map(MoneyAmount::new).transpose()?,
        currency: convert_currency(currency)?,
        product_name: product_name.to_string(),
    })
}

impl StripeProvider {
    async fn resolve_price_inner(&self, lookup: &PriceLookup) -> Result<ProviderPrice, PipelineError> {
        let price_id = match &lookup.reference {
            PriceReference::Amount { amount, currency } => {
                return Ok(ProviderPrice {
                    id: None,
                    unit_amount: Some(*amount),
                    currency: *currency,
                    product_name: lookup.product_name.clone(),
                });
            }
            PriceReference::Provider { provider_price_id } => provider_price_id
                .parse::<stripe::PriceId>()
                .map_err(|e| {
                    PipelineError::UnsupportedPriceConfiguration(format!(
                        "invalid price id {provider_price_id}: {e}"
                    ))
                })?,
        };

        match stripe::Price::retrieve(&self.client, &price_id, &[]).await {
            Ok(price) => return provider_price(&price, &lookup.product_name),
            Err(e) if is_missing(&e) => {
                tracing::info!(price_id = %price_id, slug = %lookup.slug, "price missing in active environment");
            }
            Err(e) => return Err(api_error("retrieve price", e)),
        }

        let lookup_key = format!("{LOOKUP_KEY_PREFIX}{}", lookup.slug);
        if let Some(existing) = self.find_by_lookup_key(&lookup_key).await? {
            return provider_price(&existing, &lookup.product_name);
        }

        let Some(source) = &self.source else {
            return Err(PipelineError::UnsupportedPriceConfiguration(format!(
                "price {price_id} not found and no source account to clone from"
            )));
        };
        let original = stripe::Price::retrieve(source, &price_id, &[])
            .await
            .map_err(|e| api_error("retrieve source price", e))?;
        let cloned = self.clone_price(lookup, &original, &lookup_key).await?;
        tracing::info!(
            source_price = %price_id,
            price_id = %cloned.id,
            lookup_key = %lookup_key,
            "cloned price into active environment"
        );
        provider_price(&cloned, &lookup.product_name)
    }

    async fn find_by_lookup_key(&self, lookup_key: &str) -> Result<Option<stripe::Price>, PipelineError> {
        let mut params = stripe::ListPrices::new();
        params.lookup_keys = Some(vec![lookup_key.to_string()]);
        params.active = Some(true);
        let prices = stripe::Price::list(&self.client, &params)
            .await
            .map_err(|e| api_error("list prices", e))?;
        Ok(prices.data.into_iter().next())
    }

    async fn clone_price(
        &self,
        lookup: &PriceLookup,
        original: &stripe::Price,
        lookup_key: &str,
    ) -> Result<stripe::Price, PipelineError> {
        let currency = original.currency.ok_or_else(|| {
            PipelineError::UnsupportedPriceConfiguration(format!(
                "source price {} has no currency",
                original.id
            ))
        })?;
        let metadata = HashMap::from([
            ("slug".to_string(), lookup.slug.clone()),
            ("sourcePriceId".to_string(), original.id.to_string()),
        ]);

        let mut product_params = stripe::CreateProduct::new(&lookup.product_name);
        product_params.description = lookup.product_description.as_deref();
        product_params.metadata = Some(metadata.clone());
        let product = stripe::Product::create(&self.client, product_params)
            .await
            .map_err(|e| api_error("create product", e))?;

        let mut price_params = stripe::CreatePrice::new(currency);
        price_params.product = Some(stripe::IdOrCreate::Id(product.id.as_str()));
        price_params.unit_amount = original.unit_amount;
        price_params.lookup_key = Some(lookup_key);
        // A concurrent clone may have claimed the key; take it over.
        price_params.transfer_lookup_key = Some(true);
        price_params.metadata = Some(metadata);
        stripe::Price::create(&self.client, price_params)
            .await
            .map_err(|e| api_error("create price", e))
    }

    async fn create_session_inner(
        &self,
        p: &CheckoutSessionParams,
    ) -> Result<ProviderCheckoutSession, PipelineError> {
        let line_items = p.line_items.iter().map(line_item).collect();

        let mut params = stripe::CreateCheckoutSession::new();
        params.mode = Some(stripe::CheckoutSessionMode::Payment);
        params.line_items = Some(line_items);
        match p.ui_mode {
            UiMode::Embedded => {
                params.ui_mode = Some(stripe::CheckoutSessionUiMode::Embedded);
                params.return_url = Some(&p.success_url);
            }
            UiMode::Hosted => {
                params.success_url = Some(&p.success_url);
                params.cancel_url = Some(&p.cancel_url);
            }
        }
        params.customer_email = p.customer_email.as_deref();
        params.client_reference_id = p.client_reference_id.as_deref();
        if let Some(code) = &p.promotion_code {
            params.discounts = Some(vec![stripe::CreateCheckoutSessionDiscounts {
                promotion_code: Some(code.clone()),
                ..Default::default()
            }]);
        }
        params.metadata = Some(p.metadata.clone());
        params.payment_intent_data = Some(stripe::CreateCheckoutSessionPaymentIntentData {
            metadata: Some(p.metadata.clone()),
            ..Default::default()
        });

        let session = stripe::CheckoutSession::create(&self.client, params)
            .await
            .map_err(|e| PipelineError::CheckoutSessionCreationFailed(e.to_string()))?;

        Ok(ProviderCheckoutSession {
            id: session.id.to_string(),
            url: session.url,
            client_secret: session.client_secret,
            payment_intent_id: session.payment_intent.as_ref().map(|e| match e {
                stripe::Expandable::Id(id) => id.to_string(),
                stripe::Expandable::Object(pi) => pi.id.to_string(),
            }),
        })
    }

    async fn find_promotion_code(&self, code: &str) -> Result<Option<Coupon>, PipelineError> {
        let mut params = stripe::ListPromotionCodes::new();
        params.code = Some(code);
        params.limit = Some(1);
        let codes = stripe::PromotionCode::list(&self.client, &params)
            .await
            .map_err(|e| api_error("list promotion codes", e))?;
        let Some(promo) = codes.data.into_iter().next() else {
            return Ok(None);
        };

        let coupon = &promo.coupon;
        let discount = match (coupon.percent_off, coupon.amount_off) {
            (Some(percent_off), _) => Discount::Percentage { percent_off },
            (None, Some(amount_off)) => Discount::Fixed {
                amount_off: MoneyAmount::new(amount_off)?,
                currency: coupon.currency.map(convert_currency).transpose()?,
            },
            (None, None) => {
                tracing::warn!(promotion_code = %promo.id, "promotion code without a discount");
                return Ok(None);
            }
        };

        let promo_exhausted = promo
            .max_redemptions
            .is_some_and(|max| promo.times_redeemed >= max);
        let coupon_exhausted = coupon
            .max_redemptions
            .is_some_and(|max| coupon.times_redeemed.unwrap_or(0) >= max);

        Ok(Some(Coupon {
            code: promo.code.clone(),
            discount,
            provider_promotion_code: Some(promo.id.to_string()),
            expires_at: promo
                .expires_at
                .or(coupon.redeem_by)
                .and_then(|ts| DateTime::from_timestamp(ts, 0)),
            active: promo.active && coupon.valid.unwrap_or(true),
            exhausted: promo_exhausted || coupon_exhausted,
        }))
    }
}

fn line_item(item: &LineItem) -> stripe::CreateCheckoutSessionLineItems {
    match item {
        LineItem::Price { price_id, quantity } => stripe::CreateCheckoutSessionLineItems {
            price: Some(price_id.clone()),
            quantity: Some(*quantity),
            ..Default::default()
        },
        LineItem::Custom {
            name,
            unit_amount,
            currency,
            quantity,
            metadata,
        } => stripe::CreateCheckoutSessionLineItems {
            price_data: Some(stripe::CreateCheckoutSessionLineItemsPriceData {
                currency: to_stripe_currency(*currency),
                unit_amount: Some(unit_amount.cents()),
                product_data: Some(stripe::CreateCheckoutSessionLineItemsPriceDataProductData {
                    name: name.clone(),
                    metadata: Some(metadata.clone()),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            quantity: Some(*quantity),
            ..Default::default()
        },
    }
}

impl PaymentProvider for StripeProvider {
    fn environment(&self) -> Environment {
        self.environment
    }

    fn resolve_price<'a>(
        &'a self,
        lookup: &'a PriceLookup,
    ) -> BoxFuture<'a, Result<ProviderPrice, PipelineError>> {
        Box::pin(self.resolve_price_inner(lookup))
    }

    fn create_checkout_session<'a>(
        &'a self,
        params: &'a CheckoutSessionParams,
    ) -> BoxFuture<'a, Result<ProviderCheckoutSession, PipelineError>> {
        Box::pin(self.create_session_inner(params))
    }
}

impl CouponStore for StripeProvider {
    fn name(&self) -> &'static str {
        "stripe"
    }

    fn find_coupon<'a>(
        &'a self,
        code: &'a str,
    ) -> BoxFuture<'a, Result<Option<Coupon>, PipelineError>> {
        Box::pin(self.find_promotion_code(code))
    }
}
