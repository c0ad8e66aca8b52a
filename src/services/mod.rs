//! Application services: persistence, notifications, identity, checkout, the
//! shopping assistant and the storefront session that drives them.
pub mod assistant;
pub mod checkout;
pub mod events;
pub mod gemini;
pub mod identity;
pub mod notifier;
pub mod storage;
pub mod storefront;

pub use storefront::{CartView, StoreSnapshot, Storefront, StorefrontOptions};
