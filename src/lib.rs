//! Nayavish Storefront
//!
//! Storefront core for a handmade cosmetics shop.
//!
//! ## Features
//! - Product catalog with derived MRP / discount / price
//! - Shopping bag and checkout with free-delivery threshold
//! - Order status workflow and sales dashboard
//! - Password, sign-up, OTP and guest identity resolution
//! - Persisted store settings with legacy migration
//! - Simulated SMS / WhatsApp / voice gateway
//! - Backup, restore and reset of all persisted data
//! - Optional Gemini-backed shopping assistant
//!
//! ## Sessions
//! A [`Storefront`] holds exactly one session. The cart, the signed-in
//! customer and the admin flag are shared by every HTTP client: once anyone
//! signs in to the admin console, every caller has admin access until
//! `POST /api/v1/admin/logout`. Expose the router only where that is acceptable,
//! for example behind an authenticating proxy or to a single kiosk.

use thiserror::Error;

pub mod config;
pub mod domain;
pub mod http;
pub mod services;

pub use config::AppConfig;
pub use services::{Storefront, StorefrontOptions};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum StorefrontError {
    #[error("Product not found")]
    ProductNotFound,

    #[error("Admin login required")]
    AdminRequired,

    #[error("Please sign in first")]
    NotSignedIn,

    #[error(transparent)]
    Product(#[from] domain::aggregates::ProductError),

    #[error(transparent)]
    Cart(#[from] domain::aggregates::CartError),

    #[error(transparent)]
    Order(#[from] domain::aggregates::OrderError),

    #[error(transparent)]
    Settings(#[from] domain::settings::SettingsError),

    #[error(transparent)]
    Checkout(#[from] services::checkout::CheckoutError),

    #[error(transparent)]
    Auth(#[from] services::identity::AuthError),

    #[error(transparent)]
    Notify(#[from] services::notifier::NotifyError),

    #[error(transparent)]
    Storage(#[from] services::storage::StorageError),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, StorefrontError>;
