//! Cart Aggregate

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::aggregates::product::Product;
use crate::domain::pricing;
use crate::domain::value_objects::Money;

/// A product as it was when added to the bag, plus the quantity.
///
/// Later catalog edits never reach an item already in the cart.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    #[serde(flatten)]
    pub product: Product,
    pub quantity: u32,
}

impl CartItem {
    pub fn id(&self) -> &str { &self.product.id }
    pub fn line_total(&self) -> Money { self.product.price.multiply(self.quantity) }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Cart {
    items: Vec<CartItem>,
}

impl Cart {
    pub fn new() -> Self { Self::default() }

    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn line_count(&self) -> usize { self.items.len() }

    /// Total units across all lines (the bag badge).
    pub fn item_count(&self) -> u32 { self.items.iter().fold(0u32, |n, i| n.saturating_add(i.quantity)) }

    pub fn quantity_of(&self, product_id: &str) -> u32 {
        self.items.iter().find(|i| i.id() == product_id).map_or(0, |i| i.quantity)
    }

    pub fn subtotal(&self) -> Money { pricing::subtotal(&self.items) }

    /// Difference between list price and selling price over the whole bag.
    pub fn savings(&self) -> Money { pricing::mrp_total(&self.items).saturating_sub(self.subtotal()) }

    /// Adds one unit, merging with an existing line for the same product.
    pub fn add(&mut self, product: &Product) -> Result<&CartItem, CartError> {
        if !product.is_active { return Err(CartError::Unavailable); }
        if !product.is_in_stock() { return Err(CartError::OutOfStock); }
        let idx = match self.items.iter().position(|i| i.id() == product.id) {
            Some(idx) => {
                self.items[idx].quantity = self.items[idx].quantity.saturating_add(1);
                idx
            }
            None => {
                self.items.push(CartItem { product: product.clone(), quantity: 1 });
                self.items.len() - 1
            }
        };
        Ok(&self.items[idx])
    }

    /// Moves the quantity by `delta`, never below one.
    pub fn adjust_quantity(&mut self, product_id: &str, delta: i64) -> Result<u32, CartError> {
        let item = self.items.iter_mut().find(|i| i.id() == product_id).ok_or(CartError::ItemNotFound)?;
        let next = i64::from(item.quantity).saturating_add(delta).clamp(1, i64::from(u32::MAX));
        item.quantity = next as u32;
        Ok(item.quantity)
    }

    pub fn remove(&mut self, product_id: &str) -> Result<CartItem, CartError> {
        let idx = self.items.iter().position(|i| i.id() == product_id).ok_or(CartError::ItemNotFound)?;
        Ok(self.items.remove(idx))
    }

    pub fn clear(&mut self) { self.items.clear(); }

    /// Takes ordered quantities out of the bag; lines added after the order
    /// was read, and any extra units, stay.
    pub fn remove_ordered(&mut self, ordered: &[CartItem]) {
        for line in ordered {
            if let Some(idx) = self.items.iter().position(|i| i.id() == line.id()) {
                match self.items[idx].quantity.saturating_sub(line.quantity) {
                    0 => { self.items.remove(idx); }
                    left => self.items[idx].quantity = left,
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("Item not found")]
    ItemNotFound,
    #[error("Product is out of stock")]
    OutOfStock,
    #[error("Product is not available")]
    Unavailable,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::product::tests::sample_product;

    #[test]
    fn test_cart_operations() {
        let mut cart = Cart::new();
        let widget = sample_product("P1");
        cart.add(&widget).unwrap();
        cart.add(&widget).unwrap();
        assert_eq!(cart.line_count(), 1);
        assert_eq!(cart.quantity_of("P1"), 2); // merged
        assert_eq!(cart.subtotal(), Money::new(200));

        assert_eq!(cart.adjust_quantity("P1", -5).unwrap(), 1);
        assert_eq!(cart.adjust_quantity("P1", 3).unwrap(), 4);
        assert_eq!(cart.adjust_quantity("P9", 1), Err(CartError::ItemNotFound));

        cart.remove("P1").unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn test_remove_ordered_keeps_later_lines() {
        let mut cart = Cart::new();
        cart.add(&sample_product("P1")).unwrap();
        let ordered = cart.items().to_vec();
        cart.add(&sample_product("P1")).unwrap();
        cart.add(&sample_product("P2")).unwrap();

        cart.remove_ordered(&ordered);
        assert_eq!(cart.quantity_of("P1"), 1);
        assert_eq!(cart.quantity_of("P2"), 1);
        let rest = cart.items().to_vec();
        cart.remove_ordered(&rest);
        assert!(cart.is_empty());
    }

    #[test]
    fn test_extreme_adjustments_saturate() {
        let mut cart = Cart::new();
        cart.add(&sample_product("P1")).unwrap();
        cart.add(&sample_product("P2")).unwrap();
        assert_eq!(cart.adjust_quantity("P1", i64::MAX).unwrap(), u32::MAX);
        assert_eq!(cart.adjust_quantity("P2", i64::MAX).unwrap(), u32::MAX);
        assert_eq!(cart.item_count(), u32::MAX);
        assert_eq!(cart.adjust_quantity("P1", i64::MIN).unwrap(), 1);
    }

    #[test]
    fn test_items_are_snapshots() {
        let mut cart = Cart::new();
        let mut product = sample_product("P1");
        cart.add(&product).unwrap();
        product.price = Money::new(999);
        assert_eq!(cart.items()[0].product.price, Money::new(100));
    }

    #[test]
    fn test_rejects_hidden_or_empty_stock() {
        let mut cart = Cart::new();
        let mut hidden = sample_product("P1");
        hidden.is_active = false;
        assert_eq!(cart.add(&hidden).unwrap_err(), CartError::Unavailable);
        let mut sold_out = sample_product("P2");
        sold_out.stock = 0;
        assert_eq!(cart.add(&sold_out).unwrap_err(), CartError::OutOfStock);
    }

    #[test]
    fn test_savings_and_count() {
        let mut cart = Cart::new();
        let mut serum = sample_product("P1");
        serum.mrp = Money::new(1200);
        serum.price = Money::new(899);
        cart.add(&serum).unwrap();
        cart.add(&sample_product("P2")).unwrap();
        cart.adjust_quantity("P2", 2).unwrap();
        assert_eq!(cart.item_count(), 4);
        assert_eq!(cart.savings(), Money::new(301));
    }

    #[test]
    fn test_item_json_is_flat() {
        let item = CartItem { product: sample_product("P1"), quantity: 2 };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["id"], "P1");
        assert_eq!(json["quantity"], 2);
    }
}
