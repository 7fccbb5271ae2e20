pub mod api_errors;
pub mod checkout_api;
pub mod crm_client;
pub mod license_client;
pub mod ops_alert;
pub mod stripe;
pub mod stripe_client;
