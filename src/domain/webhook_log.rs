use {
    super::{error::PipelineError, metadata::Metadata},
    chrono::{DateTime, Utc},
    serde::Serialize,
    uuid::Uuid,
};

/// Log stream for CRM sync attempts; drives operator alerts.
pub const CRM_SYNC_EVENT: &str = "crm_sync";

/// CRM failures per payment before an operator is paged.
pub const OPS_ALERT_THRESHOLD: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookLogStatus {
    Pending,
    Success,
    Error,
}

impl WebhookLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl TryFrom<&str> for WebhookLogStatus {
    type Error = PipelineError;

    fn try_from(s: &str) -> Result<Self, PipelineError> {
        match s {
            "pending" => Ok(Self::Pending),
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            other => Err(PipelineError::Validation(format!(
                "unknown webhook log status: {other}"
            ))),
        }
    }
}

/// Append-only. Never mutates order state.
#[derive(Debug, Clone)]
pub struct NewWebhookLogEntry {
    pub id: Uuid,
    pub payment_ref: String,
    pub provider_session_id: Option<String>,
    pub event_type: String,
    pub offer_id: Option<String>,
    pub lander_id: Option<String>,
    pub status: WebhookLogStatus,
    pub message: Option<String>,
    pub metadata: Metadata,
}

impl NewWebhookLogEntry {
    pub fn new(payment_ref: &str, event_type: &str, status: WebhookLogStatus) -> Self {
        Self {
            id: Uuid::now_v7(),
            payment_ref: payment_ref.to_string(),
            provider_session_id: None,
            event_type: event_type.to_string(),
            offer_id: None,
            lander_id: None,
            status,
            message: None,
            metadata: Metadata::new(),
        }
    }
}

/// Counters computed when an entry is appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggedAttempt {
    /// 1-based attempt number for this (payment, event type).
    pub attempt: i32,
    /// Error entries for this (payment, event type), including this one.
    pub error_count: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookLogRecord {
    pub id: Uuid,
    pub payment_ref: String,
    pub provider_session_id: Option<String>,
    pub event_type: String,
    pub offer_id: Option<String>,
    pub lander_id: Option<String>,
    pub status: WebhookLogStatus,
    pub message: Option<String>,
    pub attempt: i32,
    pub metadata: Metadata,
    pub created_at: DateTime<Utc>,
}
