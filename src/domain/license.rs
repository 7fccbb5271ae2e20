use {
    super::{metadata::Metadata, offer::LicenseTemplate},
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

pub const TIER_OVERRIDE_KEY: &str = "licenseTier";
pub const ENTITLEMENTS_OVERRIDE_KEY: &str = "licenseEntitlements";
pub const FEATURES_OVERRIDE_KEY: &str = "licenseFeatures";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LicenseConfig {
    pub tier: String,
    pub entitlements: Vec<String>,
    pub features: serde_json::Map<String, serde_json::Value>,
}

impl LicenseConfig {
    /// Tier falls back to the offer id; the entitlement set always carries
    /// the offer id; event metadata overrides the offer template.
    pub fn resolve(offer_id: &str, template: &LicenseTemplate, event_metadata: &Metadata) -> Self {
        let tier = event_metadata
            .get_str(TIER_OVERRIDE_KEY)
            .map(str::to_string)
            .or_else(|| template.tier.clone().filter(|t| !t.trim().is_empty()))
            .unwrap_or_else(|| offer_id.to_string());

        let requested = event_metadata
            .get_str(ENTITLEMENTS_OVERRIDE_KEY)
            .map(parse_entitlements)
            .unwrap_or_else(|| template.entitlements.clone());

        let mut entitlements: Vec<String> = Vec::with_capacity(requested.len() + 1);
        for value in requested.into_iter().chain(std::iter::once(offer_id.to_string())) {
            let value = value.trim().to_string();
            if !value.is_empty() && !entitlements.contains(&value) {
                entitlements.push(value);
            }
        }

        let features = event_metadata
            .get_str(FEATURES_OVERRIDE_KEY)
            .and_then(|raw| match serde_json::from_str::<serde_json::Value>(raw) {
                Ok(serde_json::Value::Object(map)) => Some(map),
                _ => {
                    tracing::warn!(offer_id, "ignoring non-object licenseFeatures override");
                    None
                }
            })
            .unwrap_or_else(|| template.features.clone());

        Self {
            tier,
            entitlements,
            features,
        }
    }
}

/// Accepts either a JSON array or a comma-separated list.
fn parse_entitlements(raw: &str) -> Vec<String> {
    if let Ok(list) = serde_json::from_str::<Vec<String>>(raw) {
        return list;
    }
    raw.split(',').map(|s| s.trim().to_string()).collect()
}

/// Body sent to the license service.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseRequest {
    /// Idempotency key.
    pub id: String,
    pub provider: String,
    pub provider_object_id: String,
    pub user_email: String,
    pub tier: String,
    pub entitlements: Vec<String>,
    pub features: serde_json::Map<String, serde_json::Value>,
    pub metadata: Metadata,
    pub status: String,
    pub event_type: String,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    pub raw_event: serde_json::Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseGrant {
    #[serde(default)]
    pub license_key: Option<String>,
    #[serde(default)]
    pub license_id: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
}

impl LicenseGrant {
    /// Metadata object stored under `license` on the order.
    pub fn stamp(&self, at: DateTime<Utc>) -> Metadata {
        let mut stamp = Metadata::new().with("updatedAt", at.to_rfc3339());
        stamp.insert("action", self.action.clone().unwrap_or_else(|| "created".into()));
        if let Some(id) = &self.license_id {
            stamp.insert("licenseId", id.as_str());
        }
        if let Some(key) = &self.license_key {
            stamp.insert("licenseKey", key.as_str());
        }
        stamp
    }
}
