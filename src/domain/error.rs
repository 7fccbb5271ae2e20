use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("invalid checkout request: {0}")]
    InvalidCheckoutRequest(String),

    #[error("invalid coupon: {0}")]
    InvalidCoupon(String),

    #[error("unsupported price configuration: {0}")]
    UnsupportedPriceConfiguration(String),

    #[error("checkout session creation failed: {0}")]
    CheckoutSessionCreationFailed(String),

    #[error("license issuance failed: {0}")]
    LicenseIssuanceFailed(String),

    #[error("crm sync failed: {0}")]
    CrmSyncFailed(#[from] CrmError),

    #[error("webhook signature: {0}")]
    WebhookSignature(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("provider: {0}")]
    Provider(String),

    #[error("config: {0}")]
    Config(String),

    #[error("storage: {0}")]
    Storage(String),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure talking to the CRM. Carries enough shape for retry classification.
#[derive(Debug, Clone, Error)]
pub enum CrmError {
    #[error("crm responded {status}: {message}")]
    Http { status: u16, message: String },

    #[error("crm call timed out")]
    Timeout,

    #[error("crm transport: {0}")]
    Transport(String),

    #[error("crm config: {0}")]
    Config(String),
}

pub const RETRYABLE_STATUS_CODES: [u16; 6] = [408, 429, 500, 502, 503, 504];

impl CrmError {
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http { status, .. } => RETRYABLE_STATUS_CODES.contains(status),
            Self::Timeout | Self::Transport(_) => true,
            Self::Config(_) => false,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}
