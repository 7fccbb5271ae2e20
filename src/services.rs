pub mod checkout;
pub mod coupon;
pub mod fulfillment;
pub mod order_bump;
pub mod payment_updates;
pub mod pricing;
pub mod retry;
pub mod sweeper;
