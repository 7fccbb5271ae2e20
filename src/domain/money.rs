use {
    super::error::PipelineError,
    serde::{Deserialize, Serialize},
    std::fmt,
};

/// Integer amount in the currency's smallest unit (cents for USD).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MoneyAmount(i64);

impl MoneyAmount {
    pub const ZERO: MoneyAmount = MoneyAmount(0);

    pub fn new(cents: i64) -> Result<Self, PipelineError> {
        if cents < 0 {
            return Err(PipelineError::Validation(format!(
                "MoneyAmount cannot be negative, got: {cents}"
            )));
        }
        Ok(Self(cents))
    }

    pub fn cents(&self) -> i64 {
        self.0
    }

    pub fn checked_add(self, other: MoneyAmount) -> Option<MoneyAmount> {
        self.0.checked_add(other.0).map(MoneyAmount)
    }

    pub fn checked_sub(self, other: MoneyAmount) -> Option<MoneyAmount> {
        self.0
            .checked_sub(other.0)
            .filter(|&v| v >= 0)
            .map(MoneyAmount)
    }

    pub fn checked_mul(self, quantity: u64) -> Option<MoneyAmount> {
        i64::try_from(quantity)
            .ok()
            .and_then(|q| self.0.checked_mul(q))
            .map(MoneyAmount)
    }

    pub fn min(self, other: MoneyAmount) -> MoneyAmount {
        if self.0 <= other.0 { self } else { other }
    }
}

impl<'de> Deserialize<'de> for MoneyAmount {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let cents = i64::deserialize(deserializer)?;
        MoneyAmount::new(cents).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for MoneyAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Currency {
    Usd,
    Eur,
    Gbp,
    Cad,
    Aud,
}

impl Currency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usd => "usd",
            Self::Eur => "eur",
            Self::Gbp => "gbp",
            Self::Cad => "cad",
            Self::Aud => "aud",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<&str> for Currency {
    type Error = PipelineError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        match s.to_ascii_lowercase().as_str() {
            "usd" => Ok(Self::Usd),
            "eur" => Ok(Self::Eur),
            "gbp" => Ok(Self::Gbp),
            "cad" => Ok(Self::Cad),
            "aud" => Ok(Self::Aud),
            other => Err(PipelineError::Validation(format!(
                "unknown currency: {other}"
            ))),
        }
    }
}

