use {
    super::{
        checkout::CheckoutSource,
        id::{PaymentRef, ProviderSessionId},
        license::{LicenseConfig, LicenseGrant},
        metadata::Metadata,
    },
    chrono::{DateTime, Utc},
    serde::Serialize,
    uuid::Uuid,
};

/// Provider-agnostic view of a completed payment, produced by the webhook
/// adapter and consumed by the fulfillment orchestrator.
#[derive(Debug, Clone)]
pub struct NormalizedOrder {
    pub event_id: String,
    pub event_type: String,
    pub payment_ref: PaymentRef,
    pub provider_session_id: ProviderSessionId,
    pub offer_id: Option<String>,
    pub lander_id: Option<String>,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub payment_status: Option<String>,
    pub payment_method: Option<String>,
    pub metadata: Metadata,
    pub source: CheckoutSource,
    pub raw_event: serde_json::Value,
}

/// Payment-intent level update (succeeded / failed).
#[derive(Debug, Clone)]
pub struct PaymentUpdate {
    pub event_type: String,
    pub payment_ref: PaymentRef,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub status: Option<String>,
    pub customer_email: Option<String>,
    pub payment_method: Option<String>,
    pub failure_message: Option<String>,
    pub metadata: Metadata,
}

/// Order upsert. `None` scalars never overwrite stored values.
#[derive(Debug, Clone, Default)]
pub struct OrderUpsert {
    pub payment_ref: String,
    pub checkout_session_id: Option<Uuid>,
    pub provider_session_id: Option<String>,
    pub offer_id: Option<String>,
    pub lander_id: Option<String>,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub payment_status: Option<String>,
    pub payment_method: Option<String>,
    /// Merged under existing keys: stored values win.
    pub metadata: Metadata,
    pub source: Option<CheckoutSource>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderRecord {
    pub id: Uuid,
    pub payment_ref: String,
    pub checkout_session_id: Option<Uuid>,
    pub provider_session_id: Option<String>,
    pub offer_id: Option<String>,
    pub lander_id: Option<String>,
    pub customer_email: Option<String>,
    pub customer_name: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub payment_status: Option<String>,
    pub payment_method: Option<String>,
    pub metadata: Metadata,
    pub source: CheckoutSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FulfillmentOptions {
    /// Persist session and order only; no license, no CRM.
    pub skip_side_effects: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum LicenseOutcome {
    Issued(LicenseGrant),
    /// Service answered without a license (not configured, or nothing to mint).
    NotIssued,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum CrmOutcome {
    Synced { contact_id: Option<String>, opportunity_created: bool },
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct FulfillmentOutcome {
    pub order_id: Uuid,
    pub checkout_session_id: Uuid,
    pub account_id: Option<Uuid>,
    pub license_config: Option<LicenseConfig>,
    pub license: LicenseOutcome,
    pub crm: CrmOutcome,
}
