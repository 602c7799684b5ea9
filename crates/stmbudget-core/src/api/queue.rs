//! Durable backlog of mutating requests that failed while offline.
//!
//! The queue is a single JSON file (`offline_queue.json` in the cache
//! directory) holding the items and the next id. Ids keep increasing across
//! restarts. The main context enqueues; the offline worker drains.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::RequestOptions;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OfflineQueueItem {
    pub id: u64,
    pub url: String,
    pub options: RequestOptions,
    pub enqueued_at: DateTime<Utc>,
    /// Replay attempts so far
    #[serde(default)]
    pub attempts: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct QueueState {
    next_id: u64,
    items: Vec<OfflineQueueItem>,
}

pub struct OfflineQueue {
    path: Option<PathBuf>,
    state: Mutex<QueueState>,
}

impl OfflineQueue {
    /// A queue that lives only as long as the process
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Open (or create) a queue persisted at `path`
    pub fn open(path: PathBuf) -> Result<Self> {
        let state = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read offline queue: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse offline queue: {}", path.display()))?
        } else {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            QueueState::default()
        };

        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    /// Append a request and return its id
    pub fn enqueue(&self, url: &str, options: RequestOptions) -> u64 {
        let mut state = self.lock();
        state.next_id += 1;
        let id = state.next_id;
        state.items.push(OfflineQueueItem {
            id,
            url: url.to_string(),
            options,
            enqueued_at: Utc::now(),
            attempts: 0,
        });
        debug!(id, url, "Request queued for offline replay");
        self.persist(&state);
        id
    }

    /// Snapshot of all queued items, oldest first
    pub fn items(&self) -> Vec<OfflineQueueItem> {
        self.lock().items.clone()
    }

    pub fn remove(&self, id: u64) -> bool {
        let mut state = self.lock();
        let before = state.items.len();
        state.items.retain(|item| item.id != id);
        let removed = state.items.len() != before;
        if removed {
            self.persist(&state);
        }
        removed
    }

    pub fn record_attempt(&self, id: u64) {
        let mut state = self.lock();
        if let Some(item) = state.items.iter_mut().find(|item| item.id == id) {
            item.attempts += 1;
            self.persist(&state);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Write the queue to disk. Failures are logged; the in-memory copy stays authoritative.
    fn persist(&self, state: &QueueState) {
        let Some(ref path) = self.path else {
            return;
        };
        let result = serde_json::to_string_pretty(state)
            .map_err(anyhow::Error::from)
            .and_then(|contents| {
                let tmp = path.with_extension("json.tmp");
                std::fs::write(&tmp, contents)?;
                std::fs::rename(&tmp, path)?;
                Ok(())
            });
        if let Err(e) = result {
            warn!(error = %e, path = %path.display(), "Failed to persist offline queue");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Method;
    use tempfile::tempdir;

    #[test]
    fn test_enqueue_assigns_increasing_ids() {
        let queue = OfflineQueue::in_memory();
        let a = queue.enqueue("/api/budgets/create/", RequestOptions::new(Method::Post));
        let b = queue.enqueue("/api/budgets/7/", RequestOptions::new(Method::Delete));
        assert!(b > a);
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.items()[0].url, "/api/budgets/create/");
    }

    #[test]
    fn test_remove_and_attempts() {
        let queue = OfflineQueue::in_memory();
        let id = queue.enqueue("/api/forecasts/create/", RequestOptions::new(Method::Post));
        queue.record_attempt(id);
        assert_eq!(queue.items()[0].attempts, 1);
        assert!(queue.remove(id));
        assert!(!queue.remove(id));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("offline_queue.json");

        let first_id = {
            let queue = OfflineQueue::open(path.clone()).expect("open queue");
            queue.enqueue("/api/budgets/create/", RequestOptions::new(Method::Post))
        };

        let queue = OfflineQueue::open(path).expect("reopen queue");
        assert_eq!(queue.len(), 1);
        let next_id = queue.enqueue("/api/budgets/create/", RequestOptions::new(Method::Post));
        assert!(next_id > first_id);
    }
}
