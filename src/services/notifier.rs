//! Outbound SMS, WhatsApp and voice notifications.
//!
//! The bundled gateway only simulates delivery: it waits a little, reports
//! success and records the attempt in the rolling system log. A real provider
//! plugs in behind the same [`Notifier`] trait.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::services::storage::{load_json, save_json, KeyValueStore, StorageError, StorageKey};

/// Entries retained in the system log, newest first.
pub const MAX_LOG_ENTRIES: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Channel {
    Sms,
    Whatsapp,
    Call,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SystemLogEntry {
    pub id: i64,
    #[serde(rename = "type")]
    pub channel: Channel,
    pub target: String,
    pub status: String,
    pub timestamp: DateTime<Utc>,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_sms(&self, target: &str, message: &str) -> Result<(), NotifyError>;
    async fn send_whatsapp(&self, target: &str, message: &str) -> Result<(), NotifyError>;
    async fn initiate_voice_call(&self, target: &str, spoken_code: &str) -> Result<(), NotifyError>;
}

/// Simulated gateway delays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GatewayLatency {
    pub message: Duration,
    pub call: Duration,
}

impl Default for GatewayLatency {
    fn default() -> Self {
        Self { message: Duration::from_millis(1500), call: Duration::from_millis(2000) }
    }
}

impl GatewayLatency {
    pub fn none() -> Self { Self { message: Duration::ZERO, call: Duration::ZERO } }
}

pub struct SimulatedGateway {
    store: Arc<dyn KeyValueStore>,
    latency: GatewayLatency,
}

impl SimulatedGateway {
    pub fn new(store: Arc<dyn KeyValueStore>, latency: GatewayLatency) -> Self { Self { store, latency } }

    async fn record(&self, channel: Channel, target: &str, status: &str) {
        if let Err(e) = append_log(self.store.as_ref(), channel, target, status, Utc::now()).await {
            warn!(error = %e, ?channel, "failed to record gateway log");
        }
    }
}

#[async_trait]
impl Notifier for SimulatedGateway {
    async fn send_sms(&self, target: &str, message: &str) -> Result<(), NotifyError> {
        debug!(to = target, message, "simulated sms");
        tokio::time::sleep(self.latency.message).await;
        self.record(Channel::Sms, target, "SUCCESSFULLY TRANSMITTED").await;
        Ok(())
    }

    async fn send_whatsapp(&self, target: &str, message: &str) -> Result<(), NotifyError> {
        debug!(to = target, message, "simulated whatsapp");
        tokio::time::sleep(self.latency.message).await;
        self.record(Channel::Whatsapp, target, "DELIVERED TO NODE").await;
        Ok(())
    }

    async fn initiate_voice_call(&self, target: &str, spoken_code: &str) -> Result<(), NotifyError> {
        debug!(to = target, spoken_code, "simulated voice call");
        tokio::time::sleep(self.latency.call).await;
        self.record(Channel::Call, target, "LINE CONNECTED").await;
        Ok(())
    }
}

/// Prepends an entry and trims the log to [`MAX_LOG_ENTRIES`].
pub async fn append_log(store: &dyn KeyValueStore, channel: Channel, target: &str, status: &str, now: DateTime<Utc>) -> Result<(), StorageError> {
    let mut logs = read_logs(store).await?;
    logs.insert(0, SystemLogEntry {
        id: now.timestamp_millis(),
        channel,
        target: target.to_string(),
        status: status.to_string(),
        timestamp: now,
    });
    logs.truncate(MAX_LOG_ENTRIES);
    save_json(store, StorageKey::Logs, &logs).await
}

pub async fn read_logs(store: &dyn KeyValueStore) -> Result<Vec<SystemLogEntry>, StorageError> {
    Ok(load_json(store, StorageKey::Logs).await?.unwrap_or_default())
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    #[error("Gateway unreachable: {0}")]
    Unreachable(String),
    #[error("Message rejected by gateway: {0}")]
    Rejected(String),
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::services::storage::MemoryStore;
    use std::sync::Mutex;

    /// Records every call and optionally fails all of them.
    #[derive(Default)]
    pub(crate) struct RecordingNotifier {
        pub sent: Mutex<Vec<(Channel, String, String)>>,
        pub fail: bool,
    }

    impl RecordingNotifier {
        pub(crate) fn failing() -> Self { Self { fail: true, ..Default::default() } }

        pub(crate) fn sent(&self) -> Vec<(Channel, String, String)> { self.sent.lock().unwrap().clone() }

        fn push(&self, channel: Channel, target: &str, body: &str) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push((channel, target.into(), body.into()));
            if self.fail { Err(NotifyError::Unreachable("test".into())) } else { Ok(()) }
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send_sms(&self, target: &str, message: &str) -> Result<(), NotifyError> { self.push(Channel::Sms, target, message) }
        async fn send_whatsapp(&self, target: &str, message: &str) -> Result<(), NotifyError> { self.push(Channel::Whatsapp, target, message) }
        async fn initiate_voice_call(&self, target: &str, spoken_code: &str) -> Result<(), NotifyError> { self.push(Channel::Call, target, spoken_code) }
    }

    #[tokio::test]
    async fn test_gateway_logs_every_send() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let gateway = SimulatedGateway::new(store.clone(), GatewayLatency::none());
        gateway.send_sms("9876543210", "hello").await.unwrap();
        gateway.send_whatsapp("9876543210", "hello").await.unwrap();
        gateway.initiate_voice_call("9876543210", "1 2 3").await.unwrap();

        let logs = read_logs(store.as_ref()).await.unwrap();
        let channels: Vec<Channel> = logs.iter().map(|l| l.channel).collect();
        assert_eq!(channels, vec![Channel::Call, Channel::Whatsapp, Channel::Sms]);
        assert_eq!(logs[2].status, "SUCCESSFULLY TRANSMITTED");
    }

    #[tokio::test]
    async fn test_log_is_bounded() {
        let store = MemoryStore::new();
        for i in 0..(MAX_LOG_ENTRIES + 7) {
            append_log(&store, Channel::Sms, &i.to_string(), "OK", Utc::now()).await.unwrap();
        }
        let logs = read_logs(&store).await.unwrap();
        assert_eq!(logs.len(), MAX_LOG_ENTRIES);
        assert_eq!(logs[0].target, (MAX_LOG_ENTRIES + 6).to_string());
    }

    #[test]
    fn test_log_entry_shape() {
        let entry = SystemLogEntry { id: 1, channel: Channel::Whatsapp, target: "t".into(), status: "s".into(), timestamp: Utc::now() };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "WHATSAPP");
    }
}
