//! Shopping assistant backed by an optional text-completion model.
//!
//! The assistant never fails toward the caller: a missing backend, a backend
//! error or an empty completion each turn into a fixed reply.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use crate::domain::aggregates::{Order, Product};

pub const NOT_CONFIGURED_REPLY: &str = "I'm sorry, I cannot help right now as the AI service is not configured.";
pub const UNAVAILABLE_REPLY: &str = "I'm having a little trouble connecting to the beauty desk. Please try again in a moment.";
pub const EMPTY_REPLY: &str = "I'm not sure which product matches that. Would you like to try our Kumkumadi Serum?";

const TEMPERATURE: f32 = 0.7;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self { Self { role: ChatRole::User, content: content.into() } }
    pub fn model(content: impl Into<String>) -> Self { Self { role: ChatRole::Model, content: content.into() } }
}

/// One request to the completion backend: the full conversation is resent every time.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub system_instruction: String,
    pub contents: Vec<ChatMessage>,
    pub temperature: f32,
}

#[async_trait]
pub trait TextCompletion: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<String, AssistantError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssistantError {
    #[error("Completion backend failed: {0}")]
    Backend(String),
}

#[derive(Clone, Default)]
pub struct ShoppingAssistant {
    backend: Option<Arc<dyn TextCompletion>>,
}

impl ShoppingAssistant {
    pub fn new(backend: Option<Arc<dyn TextCompletion>>) -> Self { Self { backend } }

    pub async fn advise(&self, query: &str, catalog: &[Product], history: &[ChatMessage], user_orders: &[Order]) -> String {
        let Some(backend) = &self.backend else {
            return NOT_CONFIGURED_REPLY.to_string();
        };
        let mut contents = history.to_vec();
        contents.push(ChatMessage::user(query));
        let request = CompletionRequest {
            system_instruction: system_instruction(catalog, user_orders),
            contents,
            temperature: TEMPERATURE,
        };
        match backend.complete(request).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => EMPTY_REPLY.to_string(),
            Err(e) => {
                warn!(error = %e, "assistant backend failed");
                UNAVAILABLE_REPLY.to_string()
            }
        }
    }
}

fn order_context(orders: &[Order]) -> String {
    if orders.is_empty() {
        return "The user has no previous order history.".to_string();
    }
    let history: Vec<_> = orders
        .iter()
        .map(|o| json!({ "date": o.date(), "items": o.items().iter().map(|i| i.product.name.as_str()).collect::<Vec<_>>() }))
        .collect();
    format!(
        "The user has previously bought these beauty products: {}. Use this history to suggest matching skincare or makeup items.",
        serde_json::Value::Array(history)
    )
}

pub fn system_instruction(catalog: &[Product], orders: &[Order]) -> String {
    let catalog = serde_json::to_string(catalog).unwrap_or_else(|_| "[]".to_string());
    format!(
        "You are the Beauty & Skincare Consultant for NAYAVISH COSMETICS.\n\
         You are an expert in Ayurvedic formulations, skin types, and hair care.\n\
         Our current product catalog includes: {catalog}.\n\
         {}\n\
         Answer questions about skin concerns (acne, dry skin), hair fall, or makeup shades.\n\
         If the user asks for a suggestion based on their previous order, analyze their history.\n\
         Keep responses helpful, gentle, and focused on natural beauty. Emphasize that our products are handmade and chemical-free.",
        order_context(orders)
    )
}
