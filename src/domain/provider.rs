use {
    super::{
        checkout::UiMode,
        coupon::Coupon,
        error::{CrmError, PipelineError},
        license::{LicenseGrant, LicenseRequest},
        metadata::Metadata,
        money::{Currency, MoneyAmount},
        offer::{CrmConfig, PriceReference},
    },
    serde::Serialize,
    std::{collections::HashMap, future::Future, pin::Pin},
};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Which provider environment the active API key points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Test,
    Live,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Test => "test",
            Self::Live => "live",
        }
    }

    pub fn from_secret_key(key: &str) -> Self {
        if key.starts_with("sk_live_") || key.starts_with("rk_live_") {
            Self::Live
        } else {
            Self::Test
        }
    }
}

/// A price as it exists in the active provider environment.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPrice {
    /// `None` when the amount comes from local configuration.
    pub id: Option<String>,
    /// `None` for amount-less prices (metered, customer-chosen).
    pub unit_amount: Option<MoneyAmount>,
    pub currency: Currency,
    pub product_name: String,
}

/// What to resolve: the configured reference plus the stable slug used as
/// lookup key when the price has to be cloned into the active environment.
#[derive(Debug, Clone)]
pub struct PriceLookup {
    pub slug: String,
    pub product_name: String,
    pub product_description: Option<String>,
    pub reference: PriceReference,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineItem {
    Price {
        price_id: String,
        quantity: u64,
    },
    Custom {
        name: String,
        unit_amount: MoneyAmount,
        currency: Currency,
        quantity: u64,
        metadata: HashMap<String, String>,
    },
}

impl LineItem {
    pub fn quantity(&self) -> u64 {
        match self {
            Self::Price { quantity, .. } | Self::Custom { quantity, .. } => *quantity,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutSessionParams {
    pub line_items: Vec<LineItem>,
    pub ui_mode: UiMode,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: Option<String>,
    pub client_reference_id: Option<String>,
    pub promotion_code: Option<String>,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ProviderCheckoutSession {
    pub id: String,
    pub url: Option<String>,
    pub client_secret: Option<String>,
    pub payment_intent_id: Option<String>,
}

pub trait PaymentProvider: Send + Sync {
    fn environment(&self) -> Environment;

    /// Make sure an equivalent price exists in the active environment.
    fn resolve_price<'a>(
        &'a self,
        lookup: &'a PriceLookup,
    ) -> BoxFuture<'a, Result<ProviderPrice, PipelineError>>;

    fn create_checkout_session<'a>(
        &'a self,
        params: &'a CheckoutSessionParams,
    ) -> BoxFuture<'a, Result<ProviderCheckoutSession, PipelineError>>;
}

/// A source of coupons. `Ok(None)` means "not here", never an error.
pub trait CouponStore: Send + Sync {
    fn name(&self) -> &'static str;

    fn find_coupon<'a>(
        &'a self,
        code: &'a str,
    ) -> BoxFuture<'a, Result<Option<Coupon>, PipelineError>>;
}

pub trait LicenseService: Send + Sync {
    /// `Ok(None)` when the service has nothing to return (or is not configured).
    fn issue<'a>(
        &'a self,
        request: &'a LicenseRequest,
    ) -> BoxFuture<'a, Result<Option<LicenseGrant>, PipelineError>>;
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmSyncRequest {
    pub offer_id: String,
    pub offer_name: String,
    pub config: CrmConfigView,
    pub email: String,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub payment_ref: String,
    pub provider_session_id: String,
    pub license_key: Option<String>,
    pub license_tier: Option<String>,
    pub license_entitlements: Vec<String>,
    pub affiliate_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrmConfigView {
    pub tags: Vec<String>,
    pub pipeline_id: Option<String>,
    pub stage_id: Option<String>,
    pub opportunity_name: Option<String>,
}

impl From<&CrmConfig> for CrmConfigView {
    fn from(c: &CrmConfig) -> Self {
        Self {
            tags: c.tags.clone(),
            pipeline_id: c.pipeline_id.clone(),
            stage_id: c.stage_id.clone(),
            opportunity_name: c.opportunity_name.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrmSyncResult {
    pub contact_id: Option<String>,
    pub opportunity_created: bool,
}

pub trait CrmClient: Send + Sync {
    fn sync_purchase<'a>(
        &'a self,
        request: &'a CrmSyncRequest,
    ) -> BoxFuture<'a, Result<CrmSyncResult, CrmError>>;
}

#[derive(Debug, Clone, Serialize)]
pub struct OpsAlert {
    pub title: String,
    pub context: Metadata,
}

pub trait OpsAlerter: Send + Sync {
    fn send<'a>(&'a self, alert: &'a OpsAlert) -> BoxFuture<'a, Result<(), PipelineError>>;
}
