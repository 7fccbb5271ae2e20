pub mod checkout;
pub mod coupon;
pub mod error;
pub mod id;
pub mod license;
pub mod metadata;
pub mod money;
pub mod offer;
pub mod order;
pub mod provider;
pub mod store;
pub mod webhook_log;
