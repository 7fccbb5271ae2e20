use std::{collections::HashMap, path::PathBuf, time::Duration};
use storefront_checkout::{
    REQUEST_TIMEOUT, config::AppConfig, domain::error::PipelineError,
    services::fulfillment::FulfillmentSettings,
};

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

const REQUIRED: [(&str, &str); 2] = [
    ("STRIPE_SECRET_KEY", "sk_test_123"),
    ("STRIPE_WEBHOOK_SECRET", "whsec_abc"),
];

#[test]
fn defaults_apply_when_only_required_vars_are_set() {
    let config = AppConfig::from_lookup(lookup(&REQUIRED)).unwrap();

    assert!(config.database_url.is_none());
    assert_eq!(config.bind_addr, "0.0.0.0:3000");
    assert_eq!(config.public_base_url, "http://0.0.0.0:3000");
    assert_eq!(config.webhook_secrets, vec!["whsec_abc".to_string()]);
    assert_eq!(config.offer_catalog_path, PathBuf::from("config/offers.json"));
    assert_eq!(config.license_timeout, Duration::from_millis(5000));
    assert_eq!(config.crm_timeout, Duration::from_millis(8000));
    assert_eq!(config.crm_budget, Duration::from_millis(15000));
    assert_eq!(config.crm_retry_base, Duration::from_millis(500));
    assert_eq!(config.stale_session_ttl, Duration::from_secs(24 * 3600));
    assert_eq!(config.sweep_interval, Duration::from_secs(900));
    assert!(config.crm.is_none());
}

#[test]
fn both_webhook_secrets_are_collected() {
    let config = AppConfig::from_lookup(lookup(&[
        ("STRIPE_SECRET_KEY", "sk_live_123"),
        ("STRIPE_WEBHOOK_SECRET", "whsec_live"),
        ("STRIPE_WEBHOOK_SECRET_TEST", "whsec_test"),
        ("CRM_BASE_URL", "https://crm.example.com"),
        ("CRM_API_TOKEN", "token"),
        ("CRM_LOCATION_ID", "loc_1"),
        ("STALE_SESSION_TTL_HOURS", "48"),
    ]))
    .unwrap();

    assert_eq!(config.webhook_secrets.len(), 2);
    assert_eq!(config.crm.unwrap().location_id, "loc_1");
    assert_eq!(config.stale_session_ttl, Duration::from_secs(48 * 3600));
}

#[test]
fn missing_secrets_are_config_errors() {
    let err = AppConfig::from_lookup(lookup(&[("STRIPE_WEBHOOK_SECRET", "whsec_abc")])).unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));

    // blank counts as unset
    let err = AppConfig::from_lookup(lookup(&[
        ("STRIPE_SECRET_KEY", "sk_test_123"),
        ("STRIPE_WEBHOOK_SECRET", "   "),
    ]))
    .unwrap_err();
    assert!(matches!(err, PipelineError::Config(_)));
}

#[test]
fn partial_crm_settings_are_rejected() {
    let mut vars = REQUIRED.to_vec();
    vars.push(("CRM_BASE_URL", "https://crm.example.com"));
    let err = AppConfig::from_lookup(lookup(&vars)).unwrap_err();
    assert!(matches!(err, PipelineError::Config(ref m) if m.contains("CRM_API_TOKEN")));
}

#[test]
fn non_numeric_timeout_is_rejected() {
    let mut vars = REQUIRED.to_vec();
    vars.push(("CRM_TIMEOUT_MS", "soon"));
    assert!(AppConfig::from_lookup(lookup(&vars)).is_err());
}

#[test]
fn timeouts_that_outlast_the_request_are_rejected() {
    let mut vars = REQUIRED.to_vec();
    vars.push(("CRM_BUDGET_MS", "25000"));
    let err = AppConfig::from_lookup(lookup(&vars)).unwrap_err();
    assert!(matches!(err, PipelineError::Config(ref m) if m.contains("CRM_BUDGET_MS")));

    let mut vars = REQUIRED.to_vec();
    vars.push(("LICENSE_TIMEOUT_MS", "2000"));
    vars.push(("CRM_BUDGET_MS", "20000"));
    assert!(AppConfig::from_lookup(lookup(&vars)).is_ok());
}

#[test]
fn default_fulfillment_budget_fits_the_request_timeout() {
    assert!(FulfillmentSettings::default().worst_case() < REQUEST_TIMEOUT);
}
