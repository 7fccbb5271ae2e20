use {
    super::{
        error::PipelineError,
        money::{Currency, MoneyAmount},
    },
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

pub const COUPON_REQUIRED: &str = "Coupon code is required";
pub const COUPON_INVALID: &str = "Invalid coupon code";
pub const COUPON_EXPIRED: &str = "This coupon has expired";
pub const COUPON_EXHAUSTED: &str = "This coupon has reached its usage limit";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Discount {
    Percentage {
        percent_off: f64,
    },
    Fixed {
        amount_off: MoneyAmount,
        #[serde(default)]
        currency: Option<Currency>,
    },
}

impl Discount {
    pub fn validate(&self) -> Result<(), PipelineError> {
        match self {
            Self::Percentage { percent_off } if !(0.0..=100.0).contains(percent_off) => {
                Err(PipelineError::Validation(format!(
                    "percent_off must be within 0..=100, got: {percent_off}"
                )))
            }
            _ => Ok(()),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Percentage { .. } => "percentage",
            Self::Fixed { .. } => "fixed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CouponSource {
    Provider,
    Local,
}

impl CouponSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provider => "provider",
            Self::Local => "local",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coupon {
    pub code: String,
    pub discount: Discount,
    #[serde(default)]
    pub provider_promotion_code: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Set by provider stores when the promotion's redemption cap is reached.
    #[serde(default)]
    pub exhausted: bool,
}

fn default_active() -> bool {
    true
}

impl Coupon {
    /// Reason the coupon cannot be applied right now, if any.
    pub fn rejection(&self, now: DateTime<Utc>) -> Option<&'static str> {
        if !self.active || self.expires_at.is_some_and(|at| at <= now) {
            return Some(COUPON_EXPIRED);
        }
        if self.exhausted {
            return Some(COUPON_EXHAUSTED);
        }
        None
    }
}

/// A coupon that passed validation and is ready for pricing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppliedCoupon {
    pub code: String,
    pub discount: Discount,
    pub provider_promotion_code: Option<String>,
    pub source: CouponSource,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CouponValidation {
    Valid(AppliedCoupon),
    Invalid { error: String },
}

impl CouponValidation {
    pub fn invalid(error: &str) -> Self {
        Self::Invalid {
            error: error.to_string(),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }
}

/// Trim and upper-case a user-supplied code.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}
