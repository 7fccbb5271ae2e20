use {
    crate::domain::{
        coupon::{AppliedCoupon, Discount},
        error::PipelineError,
        metadata::Metadata,
        money::MoneyAmount,
        offer::OrderBumpConfig,
        provider::{LineItem, ProviderPrice},
    },
    std::collections::HashMap,
};

pub struct BumpLine<'a> {
    pub config: &'a OrderBumpConfig,
    pub price: &'a ProviderPrice,
}

pub struct PricingInput<'a> {
    pub product_name: &'a str,
    pub base_price: &'a ProviderPrice,
    pub quantity: u64,
    pub coupon: Option<&'a AppliedCoupon>,
    pub order_bump: Option<BumpLine<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PricingPlan {
    pub line_items: Vec<LineItem>,
    /// Provider-native promotion code; the provider applies the discount.
    pub promotion_code: Option<String>,
    pub subtotal: MoneyAmount,
    pub discount: MoneyAmount,
    pub adjusted_total: MoneyAmount,
    pub bump_amount: Option<MoneyAmount>,
    /// Every intermediate number, for reconciliation without recomputation.
    pub metadata: Metadata,
}

impl PricingPlan {
    pub fn total(&self) -> Option<MoneyAmount> {
        match self.bump_amount {
            Some(bump) => self.adjusted_total.checked_add(bump),
            None => Some(self.adjusted_total),
        }
    }
}

/// Discount for `subtotal`, clamped so the total never goes negative.
/// Percentages round half away from zero; fixed amounts apply per unit.
pub fn compute_discount(
    subtotal: MoneyAmount,
    discount: &Discount,
    quantity: u64,
) -> Result<MoneyAmount, PipelineError> {
    discount.validate()?;
    let raw = match discount {
        Discount::Percentage { percent_off } => {
            let cents = (subtotal.cents() as f64 * percent_off / 100.0).round();
            MoneyAmount::new(cents as i64)?
        }
        Discount::Fixed { amount_off, .. } => amount_off
            .checked_mul(quantity)
            .ok_or_else(|| PipelineError::Validation("discount overflow".into()))?,
    };
    Ok(raw.min(subtotal))
}

/// Split `total` across `quantity` units as `(units, unit_amount)` groups
/// that sum exactly to `total`: `q - r` units at `floor(total / q)` and
/// `r` units one cent higher.
pub fn split_evenly(
    total: MoneyAmount,
    quantity: u64,
) -> Result<Vec<(u64, MoneyAmount)>, PipelineError> {
    if quantity == 0 {
        return Err(PipelineError::Validation("quantity must be at least 1".into()));
    }
    let q = i64::try_from(quantity)
        .map_err(|_| PipelineError::Validation(format!("quantity too large: {quantity}")))?;
    let base_unit = total.cents() / q;
    // remainder < q, so it fits back into u64
    let remainder = (total.cents() - base_unit * q) as u64;

    let mut groups = Vec::with_capacity(2);
    if quantity > remainder {
        groups.push((quantity - remainder, MoneyAmount::new(base_unit)?));
    }
    if remainder > 0 {
        groups.push((remainder, MoneyAmount::new(base_unit + 1)?));
    }
    Ok(groups)
}

fn original_line_item(name: &str, price: &ProviderPrice, unit: MoneyAmount, quantity: u64) -> LineItem {
    match &price.id {
        Some(price_id) => LineItem::Price {
            price_id: price_id.clone(),
            quantity,
        },
        None => LineItem::Custom {
            name: name.to_string(),
            unit_amount: unit,
            currency: price.currency,
            quantity,
            metadata: HashMap::new(),
        },
    }
}

pub fn assemble(input: PricingInput<'_>) -> Result<PricingPlan, PipelineError> {
    let PricingInput {
        product_name,
        base_price,
        quantity,
        coupon,
        order_bump,
    } = input;

    if quantity == 0 {
        return Err(PipelineError::InvalidCheckoutRequest(
            "quantity must be at least 1".into(),
        ));
    }

    let unit = base_price.unit_amount.ok_or_else(|| {
        PipelineError::UnsupportedPriceConfiguration(format!(
            "price {} has no fixed unit amount",
            base_price.id.as_deref().unwrap_or("<inline>")
        ))
    })?;
    let subtotal = unit
        .checked_mul(quantity)
        .ok_or_else(|| PipelineError::Validation("subtotal overflow".into()))?;

    let mut metadata = Metadata::new()
        .with("quantity", quantity as i64)
        .with("couponOriginalUnitCents", unit.cents())
        .with("couponSubtotalCents", subtotal.cents());

    let mut line_items = Vec::new();
    let mut promotion_code = None;
    let mut discount = MoneyAmount::ZERO;
    let mut adjusted_total = subtotal;

    match coupon {
        None => line_items.push(original_line_item(product_name, base_price, unit, quantity)),
        Some(coupon) => {
            if let Discount::Fixed {
                currency: Some(currency),
                ..
            } = &coupon.discount
            {
                if *currency != base_price.currency {
                    return Err(PipelineError::InvalidCoupon(format!(
                        "coupon {} is in {currency}, price is in {}",
                        coupon.code, base_price.currency
                    )));
                }
            }

            discount = compute_discount(subtotal, &coupon.discount, quantity)?;
            adjusted_total = subtotal
                .checked_sub(discount)
                .ok_or_else(|| PipelineError::Validation("discount exceeds subtotal".into()))?;

            metadata.insert("couponCode", coupon.code.as_str());
            metadata.insert("couponSource", coupon.source.as_str());
            metadata.insert("couponType", coupon.discount.kind());

            match &coupon.provider_promotion_code {
                Some(promo) => {
                    line_items.push(original_line_item(product_name, base_price, unit, quantity));
                    promotion_code = Some(promo.clone());
                }
                None => {
                    let groups = split_evenly(adjusted_total, quantity)?;
                    if let Some((_, first_unit)) = groups.first() {
                        metadata.insert("couponAdjustedUnitCents", first_unit.cents());
                    }
                    for (units, unit_amount) in groups {
                        let mut item_metadata = HashMap::from([
                            ("coupon_code".to_string(), coupon.code.clone()),
                            ("unit_amount_cents".to_string(), unit_amount.cents().to_string()),
                        ]);
                        if let Some(price_id) = &base_price.id {
                            item_metadata.insert("base_price_id".into(), price_id.clone());
                        }
                        line_items.push(LineItem::Custom {
                            name: product_name.to_string(),
                            unit_amount,
                            currency: base_price.currency,
                            quantity: units,
                            metadata: item_metadata,
                        });
                    }
                }
            }

            metadata.insert("couponDiscountCents", discount.cents());
            metadata.insert("couponAdjustedTotalCents", adjusted_total.cents());
        }
    }

    let mut bump_amount = None;
    if let Some(BumpLine { config, price }) = order_bump {
        let amount = price.unit_amount.ok_or_else(|| {
            PipelineError::UnsupportedPriceConfiguration(format!(
                "order bump {} has no fixed unit amount",
                config.id
            ))
        })?;
        if price.currency != base_price.currency {
            return Err(PipelineError::UnsupportedPriceConfiguration(format!(
                "order bump {} is in {}, offer is in {}",
                config.id, price.currency, base_price.currency
            )));
        }
        line_items.push(original_line_item(&config.title, price, amount, 1));
        metadata.insert("orderBumpId", config.id.as_str());
        metadata.insert("orderBumpSelected", true);
        metadata.insert("orderBumpUnitCents", amount.cents());
        bump_amount = Some(amount);
    }

    Ok(PricingPlan {
        line_items,
        promotion_code,
        subtotal,
        discount,
        adjusted_total,
        bump_amount,
        metadata,
    })
}
