//! Product Aggregate and the catalog that holds it

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::pricing::{self, PriceForm};
use crate::domain::value_objects::{round_number, Money};

pub const DEFAULT_PRODUCT_IMAGE: &str =
    "https://images.unsplash.com/photo-1629198688000-71f23e745b6e?auto=format&fit=crop&q=80&w=800";

/// Number of products shown in the recommendations strip when none is flagged.
pub const FALLBACK_RECOMMENDATIONS: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category { Skincare, Haircare, Makeup, Wellness, Fragrance, Combos }

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Skincare, Category::Haircare, Category::Makeup,
        Category::Wellness, Category::Fragrance, Category::Combos,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Skincare => "Skincare",
            Self::Haircare => "Haircare",
            Self::Makeup => "Makeup",
            Self::Wellness => "Wellness",
            Self::Fragrance => "Fragrance",
            Self::Combos => "Combos",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for Category {
    type Err = ProductError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL.into_iter().find(|c| c.as_str().eq_ignore_ascii_case(s.trim())).ok_or_else(|| ProductError::UnknownCategory(s.to_string()))
    }
}

/// Category selector of the shop view; `All` matches every product.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CategoryFilter {
    #[default]
    All,
    Only(Category),
}

impl CategoryFilter {
    pub fn matches(&self, category: Category) -> bool {
        match self { Self::All => true, Self::Only(c) => *c == category }
    }
}

impl FromStr for CategoryFilter {
    type Err = ProductError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() || s.trim().eq_ignore_ascii_case("all") { return Ok(Self::All); }
        s.parse().map(Self::Only)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Money,
    pub mrp: Money,
    #[serde(default, deserialize_with = "round_number")]
    pub discount_percentage: i64,
    pub category: Category,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub rating: f32,
    #[serde(default)]
    pub stock: u32,
    #[serde(default = "active_by_default")]
    pub is_active: bool,
    #[serde(default)]
    pub is_recommended: bool,
}

fn active_by_default() -> bool { true }

impl Product {
    pub fn is_in_stock(&self) -> bool { self.stock > 0 }

    /// Recomputes the stored discount from the current price pair.
    pub fn refresh_discount(&mut self) {
        self.discount_percentage = pricing::product_discount(self.mrp, self.price);
    }

    pub fn matches_search(&self, query: &str) -> bool {
        self.name.to_lowercase().contains(&query.trim().to_lowercase())
    }
}

/// Stock input is parsed as an integer; negative or unparseable input becomes 0.
pub fn parse_stock(raw: &str) -> u32 {
    let raw = raw.trim();
    let digits_end = raw
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+'))))
        .map_or(raw.len(), |(i, _)| i);
    raw[..digits_end].parse::<i64>().unwrap_or(0).clamp(0, i64::from(u32::MAX)) as u32
}

/// Admin add/edit form for a product.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: Option<Category>,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub stock: String,
    #[serde(default)]
    pub is_recommended: bool,
    #[serde(default)]
    pub pricing: PriceForm,
}

impl ProductDraft {
    /// Prefills the form from an existing product for editing.
    pub fn from_product(product: &Product) -> Self {
        Self {
            name: product.name.clone(),
            description: product.description.clone(),
            category: Some(product.category),
            image: product.image.clone(),
            stock: product.stock.to_string(),
            is_recommended: product.is_recommended,
            pricing: PriceForm::new(product.mrp.amount().to_string(), product.discount_percentage.to_string(), product.price.amount().to_string()),
        }
    }

    pub fn build(&self, id: impl Into<String>) -> Result<Product, ProductError> {
        let name = self.name.trim();
        if name.is_empty() { return Err(ProductError::MissingName); }
        let resolved = self.pricing.resolve();
        Ok(Product {
            id: id.into(),
            name: name.to_string(),
            description: self.description.trim().to_string(),
            price: resolved.price,
            mrp: resolved.mrp,
            discount_percentage: resolved.discount_percentage,
            category: self.category.unwrap_or(Category::Skincare),
            image: if self.image.trim().is_empty() { DEFAULT_PRODUCT_IMAGE.to_string() } else { self.image.trim().to_string() },
            rating: 5.0,
            stock: parse_stock(&self.stock),
            is_active: true,
            is_recommended: self.is_recommended,
        })
    }
}

pub fn generate_product_id(now: DateTime<Utc>) -> String {
    format!("prod-{}", now.timestamp_millis())
}

/// The store's product collection. Newest products come first.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    products: Vec<Product>,
}

impl Catalog {
    pub fn new(products: Vec<Product>) -> Self { Self { products } }

    pub fn all(&self) -> &[Product] { &self.products }
    pub fn len(&self) -> usize { self.products.len() }
    pub fn is_empty(&self) -> bool { self.products.is_empty() }
    pub fn get(&self, id: &str) -> Option<&Product> { self.products.iter().find(|p| p.id == id) }

    pub fn add(&mut self, product: Product) { self.products.insert(0, product); }

    /// Replaces the product with the same id. Returns `false` when none matched.
    pub fn update(&mut self, product: Product) -> bool {
        match self.products.iter_mut().find(|p| p.id == product.id) {
            Some(slot) => { *slot = product; true }
            None => false,
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Product> {
        let idx = self.products.iter().position(|p| p.id == id)?;
        Some(self.products.remove(idx))
    }

    pub fn set_stock(&mut self, id: &str, raw: &str) -> Option<u32> {
        let product = self.products.iter_mut().find(|p| p.id == id)?;
        product.stock = parse_stock(raw);
        Some(product.stock)
    }

    /// Flips visibility and returns the new value.
    pub fn toggle_active(&mut self, id: &str) -> Option<bool> {
        let product = self.products.iter_mut().find(|p| p.id == id)?;
        product.is_active = !product.is_active;
        Some(product.is_active)
    }

    /// Customer-facing listing.
    pub fn storefront(&self, filter: CategoryFilter, search: &str) -> Vec<&Product> {
        self.products
            .iter()
            .filter(|p| p.is_active && filter.matches(p.category) && p.matches_search(search))
            .collect()
    }

    pub fn recommendations(&self) -> Vec<&Product> {
        let flagged: Vec<&Product> = self.products.iter().filter(|p| p.is_active && p.is_recommended).collect();
        if !flagged.is_empty() {
            return flagged;
        }
        self.products.iter().filter(|p| p.is_active).take(FALLBACK_RECOMMENDATIONS).collect()
    }

    /// Catalog shipped with a fresh install.
    pub fn seed() -> Self {
        let entry = |id: &str, name: &str, description: &str, mrp: i64, price: i64, category: Category, rating: f32, stock: u32, recommended: bool| {
            let mut p = Product {
                id: id.into(),
                name: name.into(),
                description: description.into(),
                price: Money::new(price),
                mrp: Money::new(mrp),
                discount_percentage: 0,
                category,
                image: DEFAULT_PRODUCT_IMAGE.into(),
                rating,
                stock,
                is_active: true,
                is_recommended: recommended,
            };
            p.refresh_discount();
            p
        };
        Self::new(vec![
            entry("cos-1", "Kumkumadi Radiance Night Serum", "A blend of saffron and 24 ayurvedic herbs. Brightens skin tone and reduces pigmentation overnight.", 1200, 899, Category::Skincare, 4.9, 50, true),
            entry("cos-2", "Hibiscus & Onion Hair Oil", "Cold-pressed herbal oil to control hair fall and boost volume.", 650, 499, Category::Haircare, 5.0, 30, true),
            entry("cos-3", "Rose & Beetroot Lip Tint", "Natural lip and cheek tint for a flushed look with long-lasting hydration.", 450, 299, Category::Makeup, 4.8, 100, false),
            entry("cos-4", "Turmeric & Sandalwood Face Pack", "Traditional ubtan recipe for tan removal and instant glow.", 500, 350, Category::Skincare, 4.7, 45, false),
            entry("cos-5", "Organic Jasmine Mist Toner", "Steam-distilled jasmine water to tighten pores and refresh skin.", 399, 249, Category::Fragrance, 4.6, 20, false),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductError {
    #[error("Product name is required")]
    MissingName,
    #[error("Unknown category: {0}")]
    UnknownCategory(String),
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample_product(id: &str) -> Product {
        Product {
            id: id.into(),
            name: format!("Product {id}"),
            description: String::new(),
            price: Money::new(100),
            mrp: Money::new(100),
            discount_percentage: 0,
            category: Category::Skincare,
            image: DEFAULT_PRODUCT_IMAGE.into(),
            rating: 4.5,
            stock: 10,
            is_active: true,
            is_recommended: false,
        }
    }

    #[test]
    fn test_add_prepends_and_update_replaces() {
        let mut catalog = Catalog::default();
        catalog.add(sample_product("a"));
        catalog.add(sample_product("b"));
        assert_eq!(catalog.all()[0].id, "b");

        let mut edited = sample_product("a");
        edited.name = "Edited".into();
        assert!(catalog.update(edited));
        assert_eq!(catalog.get("a").unwrap().name, "Edited");
        assert!(!catalog.update(sample_product("missing")));
        assert_eq!(catalog.len(), 2);
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let mut catalog = Catalog::new(vec![sample_product("a")]);
        assert!(catalog.remove("zzz").is_none());
        assert_eq!(catalog.remove("a").unwrap().id, "a");
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_set_stock_clamps() {
        let mut catalog = Catalog::new(vec![sample_product("a")]);
        assert_eq!(catalog.set_stock("a", "-5"), Some(0));
        assert_eq!(catalog.set_stock("a", "abc"), Some(0));
        assert_eq!(catalog.set_stock("a", "42"), Some(42));
        assert_eq!(catalog.set_stock("a", "12units"), Some(12));
        assert_eq!(catalog.set_stock("nope", "1"), None);
    }

    #[test]
    fn test_storefront_filtering() {
        let mut serum = sample_product("a");
        serum.name = "Kumkumadi Serum".into();
        let mut oil = sample_product("b");
        oil.name = "Hair Oil".into();
        oil.category = Category::Haircare;
        let mut hidden = sample_product("c");
        hidden.name = "Hidden Serum".into();
        let mut catalog = Catalog::new(vec![serum, oil, hidden]);
        catalog.toggle_active("c");

        let all: Vec<_> = catalog.storefront(CategoryFilter::All, "").iter().map(|p| p.id.clone()).collect();
        assert_eq!(all, vec!["a", "b"]);
        let serums = catalog.storefront(CategoryFilter::All, "SERUM");
        assert_eq!(serums.len(), 1);
        let hair = catalog.storefront("Haircare".parse().unwrap(), "");
        assert_eq!(hair[0].id, "b");
        // hidden products stay in the admin view
        assert_eq!(catalog.all().len(), 3);
    }

    #[test]
    fn test_recommendations_fallback() {
        let catalog = Catalog::new((0..6).map(|i| sample_product(&i.to_string())).collect());
        assert_eq!(catalog.recommendations().len(), FALLBACK_RECOMMENDATIONS);
        assert_eq!(Catalog::seed().recommendations().len(), 2);
    }

    #[test]
    fn test_draft_build() {
        let draft = ProductDraft {
            name: " Neem Face Wash ".into(),
            stock: "-3".into(),
            pricing: PriceForm::new("400", "25", "300"),
            ..Default::default()
        };
        let product = draft.build("prod-1").unwrap();
        assert_eq!(product.name, "Neem Face Wash");
        assert_eq!(product.stock, 0);
        assert_eq!(product.discount_percentage, 25);
        assert_eq!(product.image, DEFAULT_PRODUCT_IMAGE);
        assert!(product.is_active);
        assert_eq!(ProductDraft::default().build("x"), Err(ProductError::MissingName));
    }

    #[test]
    fn test_loads_legacy_json_shape() {
        let raw = r#"{"id":"cos-1","name":"Serum","description":"d","price":899,"mrp":1200,
            "discountPercentage":25,"category":"Skincare","image":"i","rating":4.9,"stock":50,"isActive":true}"#;
        let product: Product = serde_json::from_str(raw).unwrap();
        assert_eq!(product.price, Money::new(899));
        assert!(!product.is_recommended);
    }

    #[test]
    fn test_draft_uses_camel_case_fields() {
        let raw = r#"{"name":"Neem Comb","category":"Haircare","isRecommended":true,
            "pricing":{"mrp":"200","discount":"","price":"150"}}"#;
        let draft: ProductDraft = serde_json::from_str(raw).unwrap();
        assert!(draft.is_recommended);
        assert!(serde_json::to_value(&draft).unwrap().get("isRecommended").is_some());
    }
}
