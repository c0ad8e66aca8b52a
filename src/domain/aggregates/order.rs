//! Order Aggregate

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::aggregates::cart::CartItem;
use crate::domain::aggregates::user::User;
use crate::domain::events::OrderEvent;
use crate::domain::pricing::OrderTotals;
use crate::domain::value_objects::Money;

/// Share of revenue reported as profit on the admin dashboard.
pub const ESTIMATED_MARGIN_PERCENT: i64 = 40;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    #[default]
    Pending,
    Accepted,
    Preparing,
    #[serde(rename = "Out for Delivery")]
    OutForDelivery,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        Self::Pending, Self::Accepted, Self::Preparing,
        Self::OutForDelivery, Self::Delivered, Self::Cancelled,
    ];

    /// The fulfilment path shown to customers, in order.
    pub const TRACKING_STEPS: [OrderStatus; 5] = [
        Self::Pending, Self::Accepted, Self::Preparing, Self::OutForDelivery, Self::Delivered,
    ];

    pub fn allowed_next(&self) -> &'static [OrderStatus] {
        match self {
            Self::Pending => &[Self::Accepted, Self::Cancelled],
            Self::Accepted => &[Self::Preparing],
            Self::Preparing => &[Self::OutForDelivery],
            Self::OutForDelivery => &[Self::Delivered],
            Self::Delivered | Self::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: OrderStatus) -> bool { self.allowed_next().contains(&next) }
    pub fn is_terminal(&self) -> bool { self.allowed_next().is_empty() }

    /// Position on the tracking path; cancelled orders are off the path.
    pub fn tracking_step(&self) -> Option<usize> { Self::TRACKING_STEPS.iter().position(|s| s == self) }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Accepted => "Accepted",
            Self::Preparing => "Preparing",
            Self::OutForDelivery => "Out for Delivery",
            Self::Delivered => "Delivered",
            Self::Cancelled => "Cancelled",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for OrderStatus {
    type Err = OrderError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace(['_', '-'], " ");
        Self::ALL.into_iter().find(|st| st.as_str().eq_ignore_ascii_case(&wanted)).ok_or_else(|| OrderError::UnknownStatus(s.to_string()))
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[default]
    #[serde(rename = "COD")]
    CashOnDelivery,
    #[serde(rename = "UPI")]
    Upi,
    Card,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    id: String,
    customer_name: String,
    customer_email: String,
    items: Vec<CartItem>,
    subtotal: Money,
    shipping: Money,
    total: Money,
    date: DateTime<Utc>,
    status: OrderStatus,
    shipping_address: String,
    payment_method: PaymentMethod,
}

/// Customer-facing fields of a new order.
#[derive(Clone, Debug)]
pub struct OrderRecipient {
    pub customer_name: String,
    pub customer_email: String,
    pub shipping_address: String,
    pub payment_method: PaymentMethod,
}

impl Order {
    pub fn place(id: impl Into<String>, recipient: OrderRecipient, items: Vec<CartItem>, totals: OrderTotals, date: DateTime<Utc>) -> Result<Self, OrderError> {
        if items.is_empty() { return Err(OrderError::NoItems); }
        Ok(Self {
            id: id.into(),
            customer_name: recipient.customer_name,
            customer_email: recipient.customer_email,
            items,
            subtotal: totals.subtotal,
            shipping: totals.shipping,
            total: totals.total,
            date,
            status: OrderStatus::Pending,
            shipping_address: recipient.shipping_address,
            payment_method: recipient.payment_method,
        })
    }

    pub fn id(&self) -> &str { &self.id }
    pub fn customer_name(&self) -> &str { &self.customer_name }
    pub fn customer_email(&self) -> &str { &self.customer_email }
    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn subtotal(&self) -> Money { self.subtotal }
    pub fn shipping(&self) -> Money { self.shipping }
    pub fn total(&self) -> Money { self.total }
    pub fn date(&self) -> DateTime<Utc> { self.date }
    pub fn status(&self) -> OrderStatus { self.status }
    pub fn shipping_address(&self) -> &str { &self.shipping_address }
    pub fn payment_method(&self) -> PaymentMethod { self.payment_method }

    pub fn transition(&mut self, next: OrderStatus) -> Result<OrderEvent, OrderError> {
        let from = self.status;
        if !from.can_transition_to(next) {
            return Err(OrderError::InvalidTransition { from, to: next });
        }
        self.status = next;
        Ok(OrderEvent::StatusChanged { order_id: self.id.clone(), from, to: next })
    }

    /// Admin rejection of a pending order.
    pub fn reject(&mut self) -> Result<OrderEvent, OrderError> { self.transition(OrderStatus::Cancelled) }

    pub fn belongs_to(&self, user: &User) -> bool {
        self.customer_email == user.email || self.customer_name == user.name
    }
}

/// `ORD-` followed by the last six digits of the epoch-millisecond clock.
pub fn generate_order_id(now: DateTime<Utc>) -> String {
    format!("ORD-{:06}", now.timestamp_millis().rem_euclid(1_000_000))
}

pub fn orders_for<'a>(orders: &'a [Order], user: &User) -> Vec<&'a Order> {
    orders.iter().filter(|o| o.belongs_to(user)).collect()
}

/// Admin dashboard figures.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SalesSummary {
    pub revenue: Money,
    pub orders: usize,
    pub delivered: usize,
    pub pending: usize,
    pub estimated_profit: Money,
}

impl SalesSummary {
    pub fn from_orders(orders: &[Order]) -> Self {
        let revenue: Money = orders.iter().map(Order::total).sum();
        Self {
            revenue,
            orders: orders.len(),
            delivered: orders.iter().filter(|o| o.status == OrderStatus::Delivered).count(),
            pending: orders.iter().filter(|o| o.status == OrderStatus::Pending).count(),
            estimated_profit: Money::new(revenue.amount() * ESTIMATED_MARGIN_PERCENT / 100),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("No items")]
    NoItems,
    #[error("Cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("Unknown order status: {0}")]
    UnknownStatus(String),
}
