//! Store-wide settings and their migration from older persisted blobs.
//!
//! Loading is additive: a persisted object is laid over the defaults key by
//! key, so fields introduced after the blob was written take their default
//! value.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::warn;

use crate::domain::pricing::DeliveryPolicy;
use crate::domain::value_objects::Money;

/// Renamed settings keys: (old, new).
const RENAMED_KEYS: [(&str, &str); 2] = [
    ("operatingHoursLunch", "openingHours"),
    ("operatingHoursDinner", "supportAvailability"),
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub text: String,
    pub link: String,
}

impl Badge {
    fn new(text: &str, link: &str) -> Self { Self { text: text.into(), link: link.into() } }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSettings {
    pub store_name: String,
    pub theme_color: String,
    pub hero_title: String,
    pub hero_subtitle: String,
    pub hero_image: String,
    #[serde(rename = "chefSectionTitle")]
    pub recommendations_title: String,
    pub delivery_fee: Money,
    pub support_email: String,
    pub support_phone: String,
    pub whatsapp_number: String,
    pub office_address: String,
    pub about_us: String,
    pub opening_hours: String,
    pub support_availability: String,
    pub operating_days: String,
    pub banner_highlight: String,
    pub promo_image: String,
    pub promo_background_color: String,
    pub promo_text_color: String,
    pub free_delivery_threshold: Money,
    pub custom_badges: Vec<Badge>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            store_name: "NAYAVISH COSMETICS".into(),
            theme_color: "#be185d".into(),
            hero_title: "Radiate Natural Beauty.".into(),
            hero_subtitle: "Handmade, Ayurvedic, and Organic formulations crafted by experienced grandmoms for your skin and hair.".into(),
            hero_image: "https://images.unsplash.com/photo-1596462502278-27bfdd403cc2?auto=format&fit=crop&q=80&w=1920".into(),
            recommendations_title: "Expert Recommendations".into(),
            delivery_fee: Money::new(60),
            support_email: "care@nayavish.com".into(),
            support_phone: "9876543210".into(),
            whatsapp_number: "9876543210".into(),
            office_address: "Nayavish Beauty House, Green Valley, Hyderabad - 500034".into(),
            about_us: "Bringing ancient Ayurvedic beauty secrets to the modern world.".into(),
            opening_hours: "10:00 AM - 08:00 PM".into(),
            support_availability: "Closed on Sundays".into(),
            operating_days: "Nationwide Delivery".into(),
            banner_highlight: "GLOW UP SALE: Flat 20% OFF on Haircare Kits!".into(),
            promo_image: String::new(),
            promo_background_color: "#fbcfe8".into(),
            promo_text_color: "#831843".into(),
            free_delivery_threshold: Money::new(999),
            custom_badges: default_badges(),
        }
    }
}

pub fn default_badges() -> Vec<Badge> {
    vec![
        Badge::new("Cruelty Free", "#"),
        Badge::new("100% Organic", "#"),
        Badge::new("Handmade", "#"),
    ]
}

impl StoreSettings {
    /// Builds settings from whatever was persisted, filling gaps from the defaults.
    pub fn from_persisted(persisted: Option<Value>) -> Self {
        let defaults = Self::default();
        let Some(Value::Object(mut saved)) = persisted else {
            return defaults;
        };
        migrate_legacy(&mut saved);

        let mut merged = match serde_json::to_value(&defaults) {
            Ok(Value::Object(map)) => map,
            _ => return defaults,
        };
        for (key, value) in saved {
            if !value.is_null() {
                merged.insert(key, value);
            }
        }
        match serde_json::from_value(Value::Object(merged)) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "persisted settings rejected, using defaults");
                defaults
            }
        }
    }

    /// Lays an admin edit over these settings. Unlike loading, a field of the
    /// wrong type rejects the whole edit.
    pub fn patched(&self, patch: Value) -> Result<Self, SettingsError> {
        let Value::Object(patch) = patch else {
            return Err(SettingsError::NotAnObject);
        };
        let mut merged = match serde_json::to_value(self)? {
            Value::Object(map) => map,
            _ => return Err(SettingsError::NotAnObject),
        };
        merged.extend(patch.into_iter().filter(|(_, v)| !v.is_null()));
        Ok(serde_json::from_value(Value::Object(merged))?)
    }

    pub fn delivery_policy(&self) -> DeliveryPolicy {
        DeliveryPolicy { fee: self.delivery_fee, free_threshold: self.free_delivery_threshold }
    }

    /// Adds a badge; both text and link are required.
    pub fn add_badge(&mut self, text: &str, link: &str) -> bool {
        let (text, link) = (text.trim(), link.trim());
        if text.is_empty() || link.is_empty() {
            return false;
        }
        self.custom_badges.push(Badge::new(text, link));
        true
    }

    pub fn remove_badge(&mut self, index: usize) -> Option<Badge> {
        (index < self.custom_badges.len()).then(|| self.custom_badges.remove(index))
    }
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Settings must be a JSON object")]
    NotAnObject,
    #[error("Invalid settings: {0}")]
    Invalid(#[from] serde_json::Error),
}

fn migrate_legacy(saved: &mut Map<String, Value>) {
    // Badges used to be bare strings; those are dropped in favour of the defaults.
    let legacy_badges = saved
        .get("customBadges")
        .and_then(Value::as_array)
        .and_then(|badges| badges.first())
        .is_some_and(Value::is_string);
    if legacy_badges {
        saved.remove("customBadges");
    }

    for (old, new) in RENAMED_KEYS {
        if let Some(value) = saved.remove(old) {
            saved.entry(new).or_insert(value);
        }
    }
}
