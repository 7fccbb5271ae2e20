use {
    crate::domain::{
        coupon::{
            AppliedCoupon, COUPON_INVALID, COUPON_REQUIRED, CouponSource, CouponValidation,
            normalize_code,
        },
        error::PipelineError,
        provider::CouponStore,
    },
    chrono::Utc,
    std::sync::Arc,
};

/// Looks a code up in each store in order; the first store that knows the
/// code decides validity.
pub struct CouponResolver {
    stores: Vec<Arc<dyn CouponStore>>,
}

impl CouponResolver {
    pub fn new(stores: Vec<Arc<dyn CouponStore>>) -> Self {
        Self { stores }
    }

    /// Read-only. `Err` only for a failing backing store.
    pub async fn resolve(&self, raw_code: &str) -> Result<CouponValidation, PipelineError> {
        let code = normalize_code(raw_code);
        if code.is_empty() {
            return Ok(CouponValidation::invalid(COUPON_REQUIRED));
        }

        for store in &self.stores {
            let Some(coupon) = store.find_coupon(&code).await? else {
                continue;
            };

            if let Some(reason) = coupon.rejection(Utc::now()) {
                tracing::info!(code = %code, store = store.name(), reason, "coupon rejected");
                return Ok(CouponValidation::invalid(reason));
            }
            if let Err(e) = coupon.discount.validate() {
                tracing::warn!(code = %code, store = store.name(), error = %e, "coupon misconfigured");
                return Ok(CouponValidation::invalid(COUPON_INVALID));
            }

            let source = if coupon.provider_promotion_code.is_some() {
                CouponSource::Provider
            } else {
                CouponSource::Local
            };
            return Ok(CouponValidation::Valid(AppliedCoupon {
                code,
                discount: coupon.discount,
                provider_promotion_code: coupon.provider_promotion_code,
                source,
            }));
        }

        Ok(CouponValidation::invalid(COUPON_INVALID))
    }
}
