use {
    crate::domain::{
        coupon::{Coupon, normalize_code},
        error::PipelineError,
        offer::OfferCatalog,
        provider::{BoxFuture, CouponStore},
    },
    std::{path::Path, sync::Arc},
};

pub fn load_catalog(path: &Path) -> Result<OfferCatalog, PipelineError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| PipelineError::Config(format!("reading {}: {e}", path.display())))?;
    let catalog = OfferCatalog::from_json(&raw)?;
    for coupon in catalog.coupons() {
        coupon.discount.validate()?;
    }
    tracing::info!(
        path = %path.display(),
        offers = catalog.len(),
        coupons = catalog.coupons().len(),
        "offer catalog loaded"
    );
    Ok(catalog)
}

/// Coupons configured alongside the offers.
pub struct CatalogCouponStore {
    catalog: Arc<OfferCatalog>,
}

impl CatalogCouponStore {
    pub fn new(catalog: Arc<OfferCatalog>) -> Self {
        Self { catalog }
    }
}

impl CouponStore for CatalogCouponStore {
    fn name(&self) -> &'static str {
        "local"
    }

    fn find_coupon<'a>(
        &'a self,
        code: &'a str,
    ) -> BoxFuture<'a, Result<Option<Coupon>, PipelineError>> {
        Box::pin(async move {
            Ok(self
                .catalog
                .coupons()
                .iter()
                .find(|c| normalize_code(&c.code) == code)
                .cloned())
        })
    }
}
