//! Domain events
use serde::Serialize;

use crate::domain::aggregates::order::OrderStatus;
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "aggregate", content = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    Product(ProductEvent),
    Order(OrderEvent),
    User(UserEvent),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProductEvent {
    Created { product_id: String },
    Updated { product_id: String },
    Removed { product_id: String },
    StockAdjusted { product_id: String, stock: u32 },
    VisibilityChanged { product_id: String, is_active: bool },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrderEvent {
    Placed { order_id: String, customer_email: String, total: Money },
    StatusChanged { order_id: String, from: OrderStatus, to: OrderStatus },
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserEvent {
    Registered { user_id: String, email: String },
}

impl DomainEvent {
    /// Message subject, e.g. `storefront.order.status_changed`.
    pub fn subject(&self) -> String {
        let (aggregate, name) = match self {
            Self::Product(e) => ("product", match e {
                ProductEvent::Created { .. } => "created",
                ProductEvent::Updated { .. } => "updated",
                ProductEvent::Removed { .. } => "removed",
                ProductEvent::StockAdjusted { .. } => "stock_adjusted",
                ProductEvent::VisibilityChanged { .. } => "visibility_changed",
            }),
            Self::Order(e) => ("order", match e {
                OrderEvent::Placed { .. } => "placed",
                OrderEvent::StatusChanged { .. } => "status_changed",
            }),
            Self::User(UserEvent::Registered { .. }) => ("user", "registered"),
        };
        format!("storefront.{aggregate}.{name}")
    }
}

impl From<ProductEvent> for DomainEvent { fn from(e: ProductEvent) -> Self { Self::Product(e) } }
impl From<OrderEvent> for DomainEvent { fn from(e: OrderEvent) -> Self { Self::Order(e) } }
impl From<UserEvent> for DomainEvent { fn from(e: UserEvent) -> Self { Self::User(e) } }
