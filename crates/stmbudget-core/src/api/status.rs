use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Shared online/offline flag.
///
/// Every clone observes the same state. Subscribers are woken only on an
/// actual transition, so each change is reported exactly once.
#[derive(Clone)]
pub struct NetworkStatus {
    tx: Arc<watch::Sender<bool>>,
}

impl NetworkStatus {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Record the current connectivity. Returns `true` if this was a transition.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!(online, "Connectivity changed");
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for NetworkStatus {
    fn default() -> Self {
        Self::new(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_reported_once() {
        let status = NetworkStatus::new(true);
        assert!(!status.set_online(true));
        assert!(status.set_online(false));
        assert!(!status.set_online(false));
        assert!(!status.is_online());
        assert!(status.set_online(true));
    }

    #[tokio::test]
    async fn test_subscriber_sees_change() {
        let status = NetworkStatus::new(true);
        let mut rx = status.subscribe();
        let clone = status.clone();
        clone.set_online(false);
        rx.changed().await.unwrap();
        assert!(!*rx.borrow_and_update());
    }
}
