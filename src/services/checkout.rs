//! Order placement and the admin status workflow.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::domain::aggregates::{Cart, Order, OrderError, OrderRecipient, OrderStatus, PaymentMethod, User};
use crate::domain::events::OrderEvent;
use crate::domain::pricing::OrderTotals;
use crate::domain::settings::StoreSettings;
use crate::domain::value_objects::{validate_phone, Phone};
use crate::services::identity::{IdentityResolver, Resolution};

#[derive(Clone, Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutDetails {
    #[validate(custom = "required")]
    pub full_name: String,
    #[serde(default)]
    #[validate(custom = "optional_email")]
    pub email: Option<String>,
    #[validate(custom = "validate_phone")]
    pub phone: String,
    #[validate(custom = "required")]
    pub address: String,
    #[validate(custom = "required")]
    pub city: String,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

fn required(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() { Err(ValidationError::new("required")) } else { Ok(()) }
}

fn optional_email(value: &str) -> Result<(), ValidationError> {
    let value = value.trim();
    if value.is_empty() || validator::validate_email(value) { Ok(()) } else { Err(ValidationError::new("email")) }
}

/// Result of a successful checkout.
#[derive(Clone, Debug)]
pub struct Placement {
    pub order: Order,
    /// The account the order is attributed to; `Created` when checkout made a new one.
    pub customer: Resolution,
}

impl Placement {
    pub fn event(&self) -> OrderEvent {
        OrderEvent::Placed {
            order_id: self.order.id().to_string(),
            customer_email: self.order.customer_email().to_string(),
            total: self.order.total(),
        }
    }
}

/// Builds an order from the cart. Nothing is mutated here; the caller stores
/// the order, clears the cart and records a created user.
pub fn place(
    order_id: String,
    cart: &Cart,
    details: &CheckoutDetails,
    settings: &StoreSettings,
    users: &[User],
    current_user: Option<&User>,
    now: DateTime<Utc>,
) -> Result<Placement, CheckoutError> {
    if cart.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }
    details.validate()?;
    let phone = Phone::parse(&details.phone).map_err(|e| CheckoutError::Invalid(e.to_string()))?;

    let totals = OrderTotals::compute(cart.items(), &settings.delivery_policy());
    let customer = match current_user {
        Some(user) => Resolution::Existing(user.clone()),
        None => IdentityResolver::new(users).resolve_checkout(
            &details.full_name,
            details.email.as_deref(),
            phone.as_str(),
            &details.address,
            now,
        ),
    };
    let recipient = OrderRecipient {
        customer_name: details.full_name.trim().to_string(),
        customer_email: customer.user().email.clone(),
        shipping_address: format!("{}, {}", details.address.trim(), details.city.trim()),
        payment_method: details.payment_method,
    };
    let order = Order::place(order_id, recipient, cart.items().to_vec(), totals, now)?;
    Ok(Placement { order, customer })
}

/// Moves one order to `next`. Unknown ids are ignored.
pub fn transition(orders: &mut [Order], order_id: &str, next: OrderStatus) -> Result<Option<OrderEvent>, OrderError> {
    match orders.iter_mut().find(|o| o.id() == order_id) {
        Some(order) => order.transition(next).map(Some),
        None => Ok(None),
    }
}

pub fn sms_confirmation(order: &Order, store_name: &str) -> String {
    format!("Order {} received at {store_name}. Total: {}.", order.id(), order.total())
}

pub fn whatsapp_confirmation(order: &Order) -> String {
    format!("Order {} confirmed! We are packing your goodies.", order.id())
}

/// Rejects overlapping submissions of the same action.
#[derive(Debug, Default)]
pub struct ProcessingFlag(AtomicBool);

impl ProcessingFlag {
    pub fn new() -> Self { Self::default() }

    /// `None` while another holder is active.
    pub fn try_acquire(&self) -> Option<ProcessingGuard<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| ProcessingGuard(&self.0))
    }

    pub fn is_busy(&self) -> bool { self.0.load(Ordering::Acquire) }
}

#[must_use]
pub struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) { self.0.store(false, Ordering::Release); }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CheckoutError {
    #[error("Your bag is empty")]
    EmptyCart,
    #[error("Invalid checkout details: {0}")]
    Invalid(String),
    #[error("A checkout is already in progress")]
    InProgress,
    #[error(transparent)]
    Order(#[from] OrderError),
}

impl From<ValidationErrors> for CheckoutError {
    fn from(e: ValidationErrors) -> Self { Self::Invalid(e.to_string()) }
}
