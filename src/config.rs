use {
    crate::{
        REQUEST_TIMEOUT,
        adapters::crm_client::CrmSettings,
        domain::error::PipelineError,
        services::{fulfillment::FulfillmentSettings, sweeper::DEFAULT_STALE_TTL},
    },
    std::{env, path::PathBuf, str::FromStr, time::Duration},
};

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// `None` runs against the in-memory store.
    pub database_url: Option<String>,
    pub bind_addr: String,
    pub public_base_url: String,
    pub stripe_secret_key: String,
    pub stripe_live_secret_key: Option<String>,
    pub webhook_secrets: Vec<String>,
    pub offer_catalog_path: PathBuf,
    pub license_service_url: Option<String>,
    pub license_service_token: Option<String>,
    pub license_timeout: Duration,
    pub crm: Option<CrmSettings>,
    pub crm_timeout: Duration,
    pub crm_budget: Duration,
    pub crm_retry_base: Duration,
    pub ops_alert_webhook_url: Option<String>,
    pub stale_session_ttl: Duration,
    pub sweep_interval: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, PipelineError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let stripe_secret_key = get("STRIPE_SECRET_KEY")
            .ok_or_else(|| PipelineError::Config("STRIPE_SECRET_KEY must be set".into()))?;
        let webhook_secrets: Vec<String> = ["STRIPE_WEBHOOK_SECRET", "STRIPE_WEBHOOK_SECRET_TEST"]
            .into_iter()
            .filter_map(&get)
            .collect();
        if webhook_secrets.is_empty() {
            return Err(PipelineError::Config(
                "STRIPE_WEBHOOK_SECRET must be set".into(),
            ));
        }

        let bind_addr = get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let public_base_url =
            get("PUBLIC_BASE_URL").unwrap_or_else(|| format!("http://{bind_addr}"));

        let crm = match (get("CRM_BASE_URL"), get("CRM_API_TOKEN"), get("CRM_LOCATION_ID")) {
            (Some(base_url), Some(token), Some(location_id)) => Some(CrmSettings {
                base_url,
                token,
                location_id,
            }),
            (None, None, None) => None,
            _ => {
                return Err(PipelineError::Config(
                    "CRM_BASE_URL, CRM_API_TOKEN and CRM_LOCATION_ID must be set together".into(),
                ));
            }
        };

        let license_timeout = Duration::from_millis(parse_or(&get, "LICENSE_TIMEOUT_MS", 5000)?);
        let crm_budget = Duration::from_millis(parse_or(&get, "CRM_BUDGET_MS", 15000)?);
        let budget = FulfillmentSettings {
            license_timeout,
            crm_budget,
            ..FulfillmentSettings::default()
        };
        if budget.worst_case() >= REQUEST_TIMEOUT {
            return Err(PipelineError::Config(format!(
                "LICENSE_TIMEOUT_MS + CRM_BUDGET_MS + alert timeout ({:?}) must stay under the request timeout ({REQUEST_TIMEOUT:?})",
                budget.worst_case()
            )));
        }

        Ok(Self {
            database_url: get("DATABASE_URL"),
            bind_addr,
            public_base_url,
            stripe_secret_key,
            stripe_live_secret_key: get("STRIPE_LIVE_SECRET_KEY"),
            webhook_secrets,
            offer_catalog_path: get("OFFER_CATALOG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("config/offers.json")),
            license_service_url: get("LICENSE_SERVICE_URL"),
            license_service_token: get("LICENSE_SERVICE_TOKEN"),
            license_timeout,
            crm,
            crm_timeout: Duration::from_millis(parse_or(&get, "CRM_TIMEOUT_MS", 8000)?),
            crm_budget,
            crm_retry_base: Duration::from_millis(parse_or(&get, "CRM_RETRY_BASE_MS", 500)?),
            ops_alert_webhook_url: get("OPS_ALERT_WEBHOOK_URL"),
            stale_session_ttl: Duration::from_secs(
                parse_or(&get, "STALE_SESSION_TTL_HOURS", DEFAULT_STALE_TTL.as_secs() / 3600)?
                    * 3600,
            ),
            sweep_interval: Duration::from_secs(parse_or(&get, "SWEEP_INTERVAL_SECS", 900)?),
        })
    }
}

fn parse_or<T: FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, PipelineError> {
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| PipelineError::Config(format!("{key} is not a valid number: {raw}"))),
    }
}
