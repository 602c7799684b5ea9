//! Messages exchanged between clients and the offline worker.
//!
//! Wire form is JSON tagged by `type`, e.g. `{"type": "CACHE_URLS", "urls": [...]}`.

use serde::{Deserialize, Serialize};

/// Client -> worker commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerMessage {
    /// Activate a waiting worker version now
    SkipWaiting,
    /// Fetch and store these URLs in the dynamic cache
    CacheUrls { urls: Vec<String> },
    ClearCache,
    GetCacheSize,
}

/// Worker -> client reply to a single message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerReply {
    Ack,
    Cached { count: usize },
    CacheSize { size: usize },
}

/// Worker -> all clients notifications
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerEvent {
    SyncSuccess { id: u64, url: String },
    Activated { version: String },
    InstallFailed { reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_format() {
        let msg: WorkerMessage = serde_json::from_value(json!({
            "type": "CACHE_URLS",
            "urls": ["/dashboard/", "/api/dashboard-stats/"]
        }))
        .unwrap();
        assert_eq!(
            msg,
            WorkerMessage::CacheUrls {
                urls: vec!["/dashboard/".into(), "/api/dashboard-stats/".into()]
            }
        );

        let skip: WorkerMessage = serde_json::from_value(json!({"type": "SKIP_WAITING"})).unwrap();
        assert_eq!(skip, WorkerMessage::SkipWaiting);

        assert_eq!(
            serde_json::to_value(WorkerReply::CacheSize { size: 12 }).unwrap(),
            json!({"type": "CACHE_SIZE", "size": 12})
        );
        assert_eq!(
            serde_json::to_value(WorkerEvent::SyncSuccess { id: 3, url: "/api/budgets/".into() }).unwrap(),
            json!({"type": "SYNC_SUCCESS", "id": 3, "url": "/api/budgets/"})
        );
    }

    #[test]
    fn test_unknown_message_type_is_rejected() {
        assert!(serde_json::from_value::<WorkerMessage>(json!({"type": "REBOOT"})).is_err());
    }
}
