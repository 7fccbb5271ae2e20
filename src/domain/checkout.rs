use {
    super::{error::PipelineError, metadata::Metadata},
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    std::fmt,
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStatus {
    Pending,
    Abandoned,
    Failed,
    Completed,
}

impl CheckoutStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Abandoned => "abandoned",
            Self::Failed => "failed",
            Self::Completed => "completed",
        }
    }

    /// Lifecycle rank. Status never moves to a lower or equal rank, so late
    /// or duplicate events cannot regress a session.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Abandoned => 1,
            Self::Failed => 2,
            Self::Completed => 3,
        }
    }

    pub fn can_transition_to(&self, next: &CheckoutStatus) -> bool {
        next.rank() > self.rank()
    }

    /// Status after applying `incoming`: the further-along one wins.
    pub fn advance(self, incoming: CheckoutStatus) -> CheckoutStatus {
        if self.can_transition_to(&incoming) {
            incoming
        } else {
            self
        }
    }
}

impl fmt::Display for CheckoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for CheckoutStatus {
    type Error = PipelineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "pending" => Ok(Self::Pending),
            "abandoned" => Ok(Self::Abandoned),
            "failed" => Ok(Self::Failed),
            "completed" => Ok(Self::Completed),
            other => Err(PipelineError::Validation(format!(
                "unknown checkout status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CheckoutSource {
    Stripe,
    Paypal,
    Ghl,
}

impl CheckoutSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stripe => "stripe",
            Self::Paypal => "paypal",
            Self::Ghl => "ghl",
        }
    }
}

impl TryFrom<&str> for CheckoutSource {
    type Error = PipelineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s {
            "stripe" => Ok(Self::Stripe),
            "paypal" => Ok(Self::Paypal),
            "ghl" => Ok(Self::Ghl),
            other => Err(PipelineError::Validation(format!(
                "unknown checkout source: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UiMode {
    #[default]
    Hosted,
    Embedded,
}

impl UiMode {
    pub fn checkout_source_tag(&self) -> &'static str {
        match self {
            Self::Hosted => "stripe_checkout",
            Self::Embedded => "custom_checkout_stripe",
        }
    }
}

// ── Inbound request ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBumpSelection {
    pub id: String,
    #[serde(default)]
    pub selected: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerInput {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(default)]
    pub offer_id: Option<String>,
    #[serde(default)]
    pub coupon_code: Option<String>,
    #[serde(default)]
    pub quantity: Option<u64>,
    #[serde(default)]
    pub order_bump: Option<OrderBumpSelection>,
    #[serde(default)]
    pub affiliate_id: Option<String>,
    #[serde(default)]
    pub lander_id: Option<String>,
    #[serde(default)]
    pub customer: Option<CustomerInput>,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(default)]
    pub ui_mode: UiMode,
}

/// Facts about the HTTP caller captured for terms-of-service consent.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

/// What the builder hands back to the HTTP layer.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSessionCreated {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip)]
    pub metadata: Metadata,
}

// ── Persistence shapes ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CheckoutSessionUpsert {
    pub provider_session_id: String,
    pub payment_intent_id: Option<String>,
    pub offer_id: Option<String>,
    pub lander_id: Option<String>,
    pub customer_email: Option<String>,
    pub metadata: Metadata,
    pub status: CheckoutStatus,
    pub source: CheckoutSource,
}

/// Partial update applied to a session found by one of its provider ids.
#[derive(Debug, Clone)]
pub struct SessionUpdate {
    pub status: Option<CheckoutStatus>,
    pub payment_intent_id: Option<String>,
    pub customer_email: Option<String>,
    /// Keys here overwrite stored keys.
    pub metadata: Metadata,
}

impl SessionUpdate {
    pub fn metadata_only(metadata: Metadata) -> Self {
        Self {
            status: None,
            payment_intent_id: None,
            customer_email: None,
            metadata,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSessionRecord {
    pub id: Uuid,
    pub provider_session_id: String,
    pub payment_intent_id: Option<String>,
    pub offer_id: Option<String>,
    pub lander_id: Option<String>,
    pub customer_email: Option<String>,
    pub metadata: Metadata,
    pub status: CheckoutStatus,
    pub source: CheckoutSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
