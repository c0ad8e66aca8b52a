//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod user;

pub use product::{Catalog, Category, CategoryFilter, Product, ProductDraft, ProductError};
pub use order::{Order, OrderError, OrderRecipient, OrderStatus, PaymentMethod, SalesSummary};
pub use cart::{Cart, CartError, CartItem};
pub use user::{CredentialError, User};
