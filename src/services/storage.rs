//! Key-value persistence for the storefront aggregates.
//!
//! Every aggregate is stored as one JSON document under a fixed key. There is
//! no multi-key atomicity: aggregates are written one after the other and the
//! last write wins.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgPoolOptions};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::domain::aggregates::{Order, Product, User};
use crate::services::notifier::SystemLogEntry;

pub const BACKUP_VERSION: &str = "1.0.3";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StorageKey {
    Products,
    Orders,
    Users,
    Settings,
    CurrentUser,
    Logs,
}

impl StorageKey {
    pub const ALL: [StorageKey; 6] = [
        Self::Products, Self::Orders, Self::Users, Self::Settings, Self::CurrentUser, Self::Logs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Products => "nayavish_products",
            Self::Orders => "nayavish_orders",
            Self::Users => "nayavish_users",
            Self::Settings => "nayavish_settings",
            Self::CurrentUser => "nayavish_current_user",
            Self::Logs => "nayavish_logs",
        }
    }
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn load(&self, key: StorageKey) -> Result<Option<Value>, StorageError>;
    async fn save(&self, key: StorageKey, value: &Value) -> Result<(), StorageError>;
    async fn remove(&self, key: StorageKey) -> Result<(), StorageError>;
}

pub async fn load_json<T: DeserializeOwned>(store: &dyn KeyValueStore, key: StorageKey) -> Result<Option<T>, StorageError> {
    match store.load(key).await? {
        None | Some(Value::Null) => Ok(None),
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
    }
}

pub async fn save_json<T: Serialize + ?Sized>(store: &dyn KeyValueStore, key: StorageKey, value: &T) -> Result<(), StorageError> {
    store.save(key, &serde_json::to_value(value)?).await
}

/// In-process store; contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<StorageKey, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self { Self::default() }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn load(&self, key: StorageKey) -> Result<Option<Value>, StorageError> {
        Ok(self.entries.read().await.get(&key).cloned())
    }

    async fn save(&self, key: StorageKey, value: &Value) -> Result<(), StorageError> {
        self.entries.write().await.insert(key, value.clone());
        Ok(())
    }

    async fn remove(&self, key: StorageKey) -> Result<(), StorageError> {
        self.entries.write().await.remove(&key);
        Ok(())
    }
}

/// PostgreSQL-backed store using a single `storefront_kv` table.
#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = PgPoolOptions::new().max_connections(5).connect(database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| StorageError::Migration(e.to_string()))?;
        info!("postgres store ready");
        Ok(Self { pool })
    }

}

#[async_trait]
impl KeyValueStore for PgStore {
    async fn load(&self, key: StorageKey) -> Result<Option<Value>, StorageError> {
        let raw: Option<String> = sqlx::query_scalar("SELECT value FROM storefront_kv WHERE key = $1")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await?;
        raw.map(|r| serde_json::from_str(&r)).transpose().map_err(StorageError::from)
    }

    async fn save(&self, key: StorageKey, value: &Value) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO storefront_kv (key, value, updated_at) VALUES ($1, $2, NOW()) \
             ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()",
        )
        .bind(key.as_str())
        .bind(serde_json::to_string(value)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, key: StorageKey) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM storefront_kv WHERE key = $1").bind(key.as_str()).execute(&self.pool).await?;
        Ok(())
    }
}

/// Full snapshot of every persisted aggregate.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Backup {
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub products: Value,
    pub orders: Value,
    pub users: Value,
    pub settings: Value,
    pub logs: Value,
}

pub async fn export_backup(store: &dyn KeyValueStore, now: DateTime<Utc>) -> Result<String, StorageError> {
    let list = |v: Option<Value>| v.unwrap_or_else(|| Value::Array(vec![]));
    let backup = Backup {
        timestamp: now,
        version: BACKUP_VERSION.to_string(),
        products: list(store.load(StorageKey::Products).await?),
        orders: list(store.load(StorageKey::Orders).await?),
        users: list(store.load(StorageKey::Users).await?),
        settings: store.load(StorageKey::Settings).await?.unwrap_or_else(|| Value::Object(Default::default())),
        logs: list(store.load(StorageKey::Logs).await?),
    };
    Ok(serde_json::to_string_pretty(&backup)?)
}

/// Validates a backup document completely before writing any aggregate.
pub async fn restore_backup(store: &dyn KeyValueStore, json: &str) -> Result<Value, StorageError> {
    let data: Value = serde_json::from_str(json)?;
    let field = |name: &str| data.get(name).filter(|v| !v.is_null()).cloned();

    let (Some(products), Some(users), Some(settings)) = (field("products"), field("users"), field("settings")) else {
        return Err(StorageError::InvalidBackup("Invalid backup file format".into()));
    };
    if !settings.is_object() {
        return Err(StorageError::InvalidBackup("settings must be an object".into()));
    }
    let orders = field("orders").unwrap_or_else(|| Value::Array(vec![]));
    let logs = field("logs");
    check_list::<Product>("products", &products)?;
    check_list::<User>("users", &users)?;
    check_list::<Order>("orders", &orders)?;
    if let Some(logs) = &logs {
        check_list::<SystemLogEntry>("logs", logs)?;
    }

    store.save(StorageKey::Products, &products).await?;
    store.save(StorageKey::Orders, &orders).await?;
    store.save(StorageKey::Users, &users).await?;
    store.save(StorageKey::Settings, &settings).await?;
    if let Some(logs) = logs {
        store.save(StorageKey::Logs, &logs).await?;
    }
    info!("backup restored");
    Ok(data)
}

fn check_list<T: DeserializeOwned>(name: &str, value: &Value) -> Result<(), StorageError> {
    Vec::<T>::deserialize(value).map(drop).map_err(|e| StorageError::InvalidBackup(format!("{name}: {e}")))
}

/// Drops every aggregate except the signed-in user.
pub async fn clear_database(store: &dyn KeyValueStore) -> Result<(), StorageError> {
    for key in StorageKey::ALL.into_iter().filter(|k| *k != StorageKey::CurrentUser) {
        store.remove(key).await?;
    }
    warn!("storefront database cleared");
    Ok(())
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration failed: {0}")]
    Migration(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Invalid backup: {0}")]
    InvalidBackup(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_round_trip() {
        let store = MemoryStore::new();
        assert!(store.load(StorageKey::Orders).await.unwrap().is_none());
        save_json(&store, StorageKey::Orders, &vec![1, 2, 3]).await.unwrap();
        let back: Option<Vec<u8>> = load_json(&store, StorageKey::Orders).await.unwrap();
        assert_eq!(back, Some(vec![1, 2, 3]));
        store.remove(StorageKey::Orders).await.unwrap();
        assert!(store.load(StorageKey::Orders).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_export_fills_missing_aggregates() {
        let store = MemoryStore::new();
        let exported = export_backup(&store, Utc::now()).await.unwrap();
        let value: Value = serde_json::from_str(&exported).unwrap();
        assert_eq!(value["version"], BACKUP_VERSION);
        assert_eq!(value["products"], json!([]));
        assert_eq!(value["settings"], json!({}));
    }

    #[tokio::test]
    async fn test_restore_requires_core_keys() {
        let store = MemoryStore::new();
        let err = restore_backup(&store, r#"{"products": [], "settings": {}}"#).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidBackup(_)));
        assert!(store.load(StorageKey::Products).await.unwrap().is_none());

        let err = restore_backup(&store, "not json").await.unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }

    #[tokio::test]
    async fn test_restore_rejects_malformed_products_before_writing() {
        let store = MemoryStore::new();
        let doc = json!({ "products": [{"id": 1}], "users": [], "settings": {} }).to_string();
        assert!(restore_backup(&store, &doc).await.is_err());
        assert!(store.load(StorageKey::Users).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_restore_rejects_malformed_orders_and_logs() {
        let store = MemoryStore::new();
        let doc = json!({ "products": [], "users": [], "settings": {}, "orders": [{"id": "ORD-1", "customerName": "x"}] }).to_string();
        let err = restore_backup(&store, &doc).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidBackup(ref m) if m.starts_with("orders")));
        assert!(store.load(StorageKey::Products).await.unwrap().is_none());

        let doc = json!({ "products": [], "users": [], "settings": {}, "logs": [{"id": "one"}] }).to_string();
        assert!(restore_backup(&store, &doc).await.is_err());
        assert!(store.load(StorageKey::Orders).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_restore_writes_aggregates() {
        let store = MemoryStore::new();
        let doc = json!({ "products": [], "users": [], "settings": {"storeName": "X"}, "logs": [] }).to_string();
        restore_backup(&store, &doc).await.unwrap();
        assert_eq!(store.load(StorageKey::Orders).await.unwrap(), Some(json!([])));
        assert_eq!(store.load(StorageKey::Settings).await.unwrap(), Some(json!({"storeName": "X"})));

        clear_database(&store).await.unwrap();
        assert!(store.load(StorageKey::Settings).await.unwrap().is_none());
    }
}
