use {
    super::{
        coupon::Coupon,
        error::PipelineError,
        metadata::Metadata,
        money::{Currency, MoneyAmount},
    },
    serde::{Deserialize, Serialize},
    std::collections::HashMap,
};

/// Where an offer's unit price comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PriceReference {
    Provider { provider_price_id: String },
    Amount { amount: MoneyAmount, currency: Currency },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBumpConfig {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: PriceReference,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrmConfig {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub pipeline_id: Option<String>,
    #[serde(default)]
    pub stage_id: Option<String>,
    #[serde(default)]
    pub opportunity_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LicenseTemplate {
    #[serde(default)]
    pub tier: Option<String>,
    #[serde(default)]
    pub entitlements: Vec<String>,
    #[serde(default)]
    pub features: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offer {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: PriceReference,
    #[serde(default)]
    pub order_bump: Option<OrderBumpConfig>,
    #[serde(default)]
    pub crm: Option<CrmConfig>,
    #[serde(default)]
    pub license: LicenseTemplate,
    #[serde(default)]
    pub default_metadata: Metadata,
    #[serde(default)]
    pub success_url: Option<String>,
    #[serde(default)]
    pub cancel_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    offers: Vec<Offer>,
    #[serde(default)]
    coupons: Vec<Coupon>,
}

/// Offers and local coupons, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct OfferCatalog {
    offers: HashMap<String, Offer>,
    coupons: Vec<Coupon>,
}

impl OfferCatalog {
    pub fn new(offers: Vec<Offer>, coupons: Vec<Coupon>) -> Result<Self, PipelineError> {
        let mut by_id = HashMap::with_capacity(offers.len());
        for offer in offers {
            if offer.id.trim().is_empty() {
                return Err(PipelineError::Config("offer with empty id".into()));
            }
            if let Some(dup) = by_id.insert(offer.id.clone(), offer) {
                return Err(PipelineError::Config(format!("duplicate offer id: {}", dup.id)));
            }
        }
        Ok(Self {
            offers: by_id,
            coupons,
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, PipelineError> {
        let file: CatalogFile = serde_json::from_str(raw)
            .map_err(|e| PipelineError::Config(format!("offer catalog: {e}")))?;
        Self::new(file.offers, file.coupons)
    }

    pub fn offer(&self, id: &str) -> Option<&Offer> {
        self.offers.get(id)
    }

    pub fn coupons(&self) -> &[Coupon] {
        &self.coupons
    }

    pub fn len(&self) -> usize {
        self.offers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offers.is_empty()
    }
}
