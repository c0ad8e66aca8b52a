//! Storefront domain: aggregates, value objects, pricing, settings and events.
pub mod aggregates;
pub mod events;
pub mod pricing;
pub mod settings;
pub mod value_objects;
