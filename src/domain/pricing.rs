//! Price derivation and order settlement.
//!
//! The admin product form edits three coupled fields: MRP, discount
//! percentage and selling price. Whichever field was edited last wins and the
//! dependent field is recomputed. Operands that do not parse leave the
//! dependent field untouched.
//!
//! Recomputing a discount from a derived price only reproduces the original
//! discount to within one point, because the price is rounded to whole units.

use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::aggregates::cart::CartItem;
use crate::domain::value_objects::Money;

/// Parses a form field. Blank or malformed input yields `None`.
pub fn parse_amount(input: &str) -> Option<Decimal> {
    Decimal::from_str(input.trim()).ok()
}

/// Half-up rounding to a whole unit (`.5` rounds toward positive infinity).
pub fn round_half_up(value: Decimal) -> Option<i64> {
    value.checked_add(Decimal::new(5, 1))?.floor().to_i64()
}

/// `round(mrp * (1 - discount / 100))`
pub fn selling_price(mrp: Decimal, discount: Decimal) -> Option<i64> {
    let factor = Decimal::ONE.checked_sub(discount.checked_div(Decimal::ONE_HUNDRED)?)?;
    round_half_up(mrp.checked_mul(factor)?)
}

/// `round((mrp - price) / mrp * 100)`, only defined for a positive MRP.
pub fn discount_percentage(mrp: Decimal, price: Decimal) -> Option<i64> {
    if mrp <= Decimal::ZERO {
        return None;
    }
    let ratio = mrp.checked_sub(price)?.checked_div(mrp)?;
    round_half_up(ratio.checked_mul(Decimal::ONE_HUNDRED)?)
}

/// Discount stored on a product for a given price pair; zero when MRP is not positive.
pub fn product_discount(mrp: Money, price: Money) -> i64 {
    discount_percentage(Decimal::from(mrp.amount()), Decimal::from(price.amount())).unwrap_or(0)
}

/// Raw text of the three coupled pricing fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceForm {
    pub mrp: String,
    pub discount: String,
    pub price: String,
}

/// Whole-unit pricing resolved from a submitted form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedPricing {
    pub price: Money,
    pub mrp: Money,
    pub discount_percentage: i64,
}

impl PriceForm {
    pub fn new(mrp: impl Into<String>, discount: impl Into<String>, price: impl Into<String>) -> Self {
        Self { mrp: mrp.into(), discount: discount.into(), price: price.into() }
    }

    pub fn edit_mrp(&mut self, value: impl Into<String>) {
        self.mrp = value.into();
        self.reprice();
    }

    pub fn edit_discount(&mut self, value: impl Into<String>) {
        self.discount = value.into();
        self.reprice();
    }

    pub fn edit_price(&mut self, value: impl Into<String>) {
        self.price = value.into();
        if let (Some(mrp), Some(price)) = (parse_amount(&self.mrp), parse_amount(&self.price)) {
            if let Some(discount) = discount_percentage(mrp, price) {
                self.discount = discount.to_string();
            }
        }
    }

    fn reprice(&mut self) {
        if let (Some(mrp), Some(discount)) = (parse_amount(&self.mrp), parse_amount(&self.discount)) {
            if let Some(price) = selling_price(mrp, discount) {
                self.price = price.to_string();
            }
        }
    }

    /// Missing price becomes 0, missing or zero MRP falls back to the price,
    /// missing discount becomes 0.
    pub fn resolve(&self) -> ResolvedPricing {
        let whole = |field: &str| parse_amount(field).and_then(round_half_up);
        let price = whole(&self.price).unwrap_or(0);
        let mrp = whole(&self.mrp).filter(|m| *m != 0).unwrap_or(price);
        let discount_percentage = whole(&self.discount).unwrap_or(0);
        ResolvedPricing { price: Money::new(price), mrp: Money::new(mrp), discount_percentage }
    }
}

/// Delivery charge rule taken from store settings at checkout time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeliveryPolicy {
    pub fee: Money,
    pub free_threshold: Money,
}

impl DeliveryPolicy {
    pub fn shipping_for(&self, subtotal: Money) -> Money {
        if subtotal >= self.free_threshold { Money::ZERO } else { self.fee }
    }

    pub fn progress(&self, subtotal: Money) -> FreeDeliveryProgress {
        let threshold = self.free_threshold.amount();
        let percent = if threshold > 0 {
            (subtotal.amount().max(0).saturating_mul(100) / threshold).min(100) as u8
        } else {
            100
        };
        FreeDeliveryProgress { remaining: self.free_threshold.saturating_sub(subtotal).max(Money::ZERO), percent }
    }
}

/// How far a basket is from free delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct FreeDeliveryProgress {
    pub remaining: Money,
    pub percent: u8,
}

/// Settled amounts for an order. `total` is always `subtotal + shipping`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct OrderTotals {
    pub subtotal: Money,
    pub shipping: Money,
    pub total: Money,
}

impl OrderTotals {
    pub fn compute(items: &[CartItem], policy: &DeliveryPolicy) -> Self {
        Self::from_subtotal(subtotal(items), policy)
    }

    pub fn from_subtotal(subtotal: Money, policy: &DeliveryPolicy) -> Self {
        let shipping = policy.shipping_for(subtotal);
        Self { subtotal, shipping, total: subtotal.add(shipping) }
    }
}

pub fn subtotal(items: &[CartItem]) -> Money {
    items.iter().map(CartItem::line_total).sum()
}

/// List-price total, counting the selling price where no MRP is recorded.
pub fn mrp_total(items: &[CartItem]) -> Money {
    items
        .iter()
        .map(|i| {
            let unit = if i.product.mrp.is_zero() { i.product.price } else { i.product.mrp };
            unit.multiply(i.quantity)
        })
        .sum()
}
