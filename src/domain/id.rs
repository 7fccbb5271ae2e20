use derive_more::Display;
use serde::{Deserialize, Serialize};

use super::error::PipelineError;

/// Payment-intent identifier (`pi_xxx`). For zero-amount checkouts the
/// provider session id (`cs_xxx`) stands in as the payment reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentRef(String);

impl PaymentRef {
    pub fn new(id: impl Into<String>) -> Result<Self, PipelineError> {
        let id = id.into();
        if !(id.starts_with("pi_") || id.starts_with("cs_")) {
            return Err(PipelineError::Validation(format!(
                "PaymentRef must start with pi_ or cs_, got: {id}"
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Checkout session identifier (`cs_xxx`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProviderSessionId(String);

impl ProviderSessionId {
    pub fn new(id: impl Into<String>) -> Result<Self, PipelineError> {
        let id = id.into();
        if !id.starts_with("cs_") {
            return Err(PipelineError::Validation(format!(
                "ProviderSessionId must start with cs_, got: {id}"
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Stripe event identifier (`evt_xxx`).
#[derive(Debug, Clone, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(String);

impl EventId {
    pub fn new(id: impl Into<String>) -> Result<Self, PipelineError> {
        let id = id.into();
        if !id.starts_with("evt_") {
            return Err(PipelineError::Validation(format!(
                "EventId must start with evt_, got: {id}"
            )));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}
