//! Runtime configuration read from the environment (after `.env` is loaded).

use std::time::Duration;

use thiserror::Error;

use crate::services::gemini::{GeminiConfig, DEFAULT_MODEL};
use crate::services::identity::{AdminCredentials, OtpVerification};
use crate::services::notifier::GatewayLatency;

pub const DEFAULT_PORT: u16 = 8083;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub port: u16,
    /// Absent means an in-memory store.
    pub database_url: Option<String>,
    pub nats_url: Option<String>,
    pub admin: AdminCredentials,
    pub otp_policy: OtpVerification,
    pub gateway_latency: GatewayLatency,
    /// Absent means the assistant answers with its not-configured reply.
    pub assistant: Option<GeminiConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match var("PORT") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidPort(raw))?,
            None => DEFAULT_PORT,
        };
        let defaults = AdminCredentials::default();
        let admin = AdminCredentials {
            email: var("STOREFRONT_ADMIN_EMAIL").unwrap_or(defaults.email),
            password: var("STOREFRONT_ADMIN_PASSWORD").unwrap_or(defaults.password),
        };
        let otp_policy = match var("STOREFRONT_OTP_MODE") {
            Some(raw) => raw.parse().map_err(ConfigError::InvalidOtpMode)?,
            None => OtpVerification::default(),
        };
        let gateway_latency = match var("STOREFRONT_GATEWAY_LATENCY_MS") {
            Some(raw) => {
                let millis: u64 = raw.parse().map_err(|_| ConfigError::InvalidLatency(raw))?;
                GatewayLatency { message: Duration::from_millis(millis), call: Duration::from_millis(millis) }
            }
            None => GatewayLatency::default(),
        };

        let assistant = var("API_KEY").map(|api_key| GeminiConfig {
            api_key,
            model: var("STOREFRONT_ASSISTANT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        });

        Ok(Self {
            port,
            database_url: var("DATABASE_URL"),
            nats_url: var("NATS_URL"),
            admin,
            otp_policy,
            gateway_latency,
            assistant,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("PORT must be a port number, got `{0}`")]
    InvalidPort(String),
    #[error("STOREFRONT_OTP_MODE: {0}")]
    InvalidOtpMode(String),
    #[error("STOREFRONT_GATEWAY_LATENCY_MS must be whole milliseconds, got `{0}`")]
    InvalidLatency(String),
}
