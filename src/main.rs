//! Nayavish Storefront - HTTP service

use std::sync::Arc;

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nayavish_storefront::services::assistant::{ShoppingAssistant, TextCompletion};
use nayavish_storefront::services::events::EventPublisher;
use nayavish_storefront::services::gemini::GeminiBackend;
use nayavish_storefront::services::notifier::SimulatedGateway;
use nayavish_storefront::services::storage::{KeyValueStore, MemoryStore, PgStore};
use nayavish_storefront::{http, AppConfig, Storefront, StorefrontOptions};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = AppConfig::from_env()?;

    let store: Arc<dyn KeyValueStore> = match &config.database_url {
        Some(url) => Arc::new(PgStore::connect(url).await?),
        None => {
            tracing::warn!("DATABASE_URL not set, data lives in memory only");
            Arc::new(MemoryStore::new())
        }
    };
    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => {
                tracing::warn!(error = %e, "NATS unavailable, events will not be published");
                None
            }
        },
        None => None,
    };

    let notifier = Arc::new(SimulatedGateway::new(store.clone(), config.gateway_latency));
    let options = StorefrontOptions { otp_policy: config.otp_policy, admin: config.admin.clone() };
    let backend: Option<Arc<dyn TextCompletion>> = match config.assistant.clone() {
        Some(gemini) => Some(Arc::new(GeminiBackend::new(gemini)?)),
        None => {
            tracing::info!("API_KEY not set, shopping assistant disabled");
            None
        }
    };
    let storefront = Storefront::open(store, notifier, options)
        .await?
        .with_events(EventPublisher::new(nats))
        .with_assistant(ShoppingAssistant::new(backend));
    let app = http::router(Arc::new(storefront));

    tracing::info!("🚀 Nayavish Storefront listening on 0.0.0.0:{}", config.port);
    axum::serve(tokio::net::TcpListener::bind(("0.0.0.0", config.port)).await?, app).await?;
    Ok(())
}
