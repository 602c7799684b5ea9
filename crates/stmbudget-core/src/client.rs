//! Composition root.
//!
//! `Client::init` builds the cache, offline queue, executor, data manager,
//! navigator and worker from a `Config`, and funnels everything they report
//! into one event channel that the application drains.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{Backoff, NetworkStatus, OfflineQueue, RequestExecutor, Transport};
use crate::auth::Session;
use crate::cache::{CacheStore, DiskStore};
use crate::config::Config;
use crate::data::{DataManager, DataManagerConfig};
use crate::router::{default_routes, ContentView, NavigationEvent, Navigator};
use crate::worker::{OfflineWorker, WorkerConfig, WorkerEvent, WorkerHandle, WorkerState};

/// Capacity of the client event channel
const CHANNEL_BUFFER_SIZE: usize = 100;

/// Records the worker version that was last active
const WORKER_VERSION_FILE: &str = "worker_version";

/// Durable cache directory under the cache dir
const RESPONSES_DIR: &str = "responses";

/// Offline queue file under the cache dir
const QUEUE_FILE: &str = "offline_queue.json";

/// Everything the application needs to react to, in one stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    Navigation(NavigationEvent),
    Connectivity { online: bool },
    Synced { id: u64, url: String },
    Error(String),
}

pub struct Client {
    config: Config,
    cache: Arc<CacheStore>,
    queue: Arc<OfflineQueue>,
    network: NetworkStatus,
    data: DataManager,
    navigator: Arc<Navigator>,
    worker: Arc<WorkerHandle>,
    /// Registered with the worker as a client of the previous version
    held_by_previous: bool,
    cache_dir: Option<PathBuf>,
    events_rx: mpsc::Receiver<ClientEvent>,
    forwarders: Vec<JoinHandle<()>>,
}

impl Client {
    /// Build a client using the configured cache directory
    pub fn init(
        config: Config,
        session: &Session,
        transport: Arc<dyn Transport>,
        view: Arc<dyn ContentView>,
    ) -> Result<Self> {
        let cache_dir = match config.cache_dir() {
            Ok(dir) => Some(dir),
            Err(e) => {
                warn!(error = %e, "No cache directory, running memory-only");
                None
            }
        };
        Self::init_with_dir(config, cache_dir.as_deref(), session, transport, view)
    }

    /// Build a client storing durable state under `cache_dir`
    /// (`None` keeps everything in memory)
    pub fn init_with_dir(
        config: Config,
        cache_dir: Option<&Path>,
        session: &Session,
        transport: Arc<dyn Transport>,
        view: Arc<dyn ContentView>,
    ) -> Result<Self> {
        let routes = default_routes()?;
        let cache = Arc::new(open_cache(&config, cache_dir));
        let queue = Arc::new(open_queue(cache_dir.map(|d| d.join(QUEUE_FILE))));
        let network = NetworkStatus::new(!config.offline_mode);

        let worker_config = WorkerConfig::from(&config);
        let worker = OfflineWorker::new(worker_config.clone(), transport, Arc::clone(&queue));
        let previous_version = cache_dir.and_then(read_worker_version);
        let held_by_previous = previous_version
            .as_deref()
            .is_some_and(|v| v != worker_config.version);
        if held_by_previous {
            // This client is still controlled by the version that served it last
            worker.add_client();
            info!(
                previous = ?previous_version,
                version = %worker_config.version,
                "New offline worker waits for the previous version's client"
            );
        }
        let worker_events = worker.subscribe();
        let worker = Arc::new(WorkerHandle::spawn(worker));

        let backoff = Backoff {
            base: Duration::from_millis(config.backoff_base_ms),
            cap: Duration::from_millis(config.backoff_cap_ms),
        };
        let page_transport = Arc::clone(&worker) as Arc<dyn Transport>;
        let executor = RequestExecutor::new(page_transport, network.clone())
            .with_queue(Arc::clone(&queue))
            .with_backoff(backoff);
        let data = DataManager::new(Arc::clone(&cache), executor, DataManagerConfig::from(&config));

        let navigator = Arc::new(
            Navigator::new(routes, data.clone(), view)
                .with_origin(worker_config.origin.clone())
                .with_role(session.role()),
        );

        let (tx, events_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let connectivity = network.subscribe();
        let reported = network.is_online();
        let forwarders = vec![
            tokio::spawn(forward_navigation(navigator.subscribe(), tx.clone())),
            tokio::spawn(forward_worker(worker_events, tx.clone())),
            tokio::spawn(watch_connectivity(connectivity, reported, Arc::clone(&worker), tx)),
        ];

        info!(
            online = network.is_online(),
            durable = cache.has_durable(),
            queued = queue.len(),
            role = ?session.role(),
            "Client initialized"
        );

        Ok(Self {
            config,
            cache,
            queue,
            network,
            data,
            navigator,
            worker,
            held_by_previous,
            cache_dir: cache_dir.map(Path::to_path_buf),
            events_rx,
            forwarders,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn queue(&self) -> &Arc<OfflineQueue> {
        &self.queue
    }

    pub fn network(&self) -> &NetworkStatus {
        &self.network
    }

    pub fn data(&self) -> &DataManager {
        &self.data
    }

    pub fn navigator(&self) -> &Arc<Navigator> {
        &self.navigator
    }

    pub fn worker(&self) -> &WorkerHandle {
        &self.worker
    }

    /// Flip connectivity. Going online triggers an offline-queue replay.
    pub fn set_online(&self, online: bool) -> bool {
        self.network.set_online(online)
    }

    /// Take every event reported since the last call without waiting
    pub fn drain_events(&mut self) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait for the next event
    pub async fn next_event(&mut self) -> Option<ClientEvent> {
        self.events_rx.recv().await
    }

    /// Stop background tasks and the worker, recording the worker version
    /// that ends up active
    pub async fn dispose(mut self) {
        for task in self.forwarders.drain(..) {
            task.abort();
        }
        if self.held_by_previous {
            if let Err(e) = self.worker.release_client().await {
                warn!(error = %e, "Failed to release worker client");
            }
        }
        if self.worker.state() == WorkerState::Activated {
            if let Some(dir) = &self.cache_dir {
                write_worker_version(dir, self.worker.version());
            }
        }
        self.worker.shutdown().await;
        info!(queued = self.queue.len(), "Client disposed");
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        for task in &self.forwarders {
            task.abort();
        }
    }
}

fn open_cache(config: &Config, cache_dir: Option<&Path>) -> CacheStore {
    let store = CacheStore::new(config.max_cache_entries);
    let Some(dir) = cache_dir.filter(|_| config.durable_cache) else {
        return store;
    };
    match DiskStore::new(dir.join(RESPONSES_DIR)) {
        Ok(disk) => store.with_durable(disk),
        Err(e) => {
            warn!(error = %e, "Durable cache unavailable, using memory only");
            store
        }
    }
}

fn open_queue(path: Option<PathBuf>) -> OfflineQueue {
    let Some(path) = path else {
        return OfflineQueue::in_memory();
    };
    match OfflineQueue::open(path) {
        Ok(queue) => queue,
        Err(e) => {
            warn!(error = %e, "Offline queue file unusable, queueing in memory");
            OfflineQueue::in_memory()
        }
    }
}

fn read_worker_version(dir: &Path) -> Option<String> {
    let raw = std::fs::read_to_string(dir.join(WORKER_VERSION_FILE)).ok()?;
    let version = raw.trim();
    (!version.is_empty()).then(|| version.to_string())
}

fn write_worker_version(dir: &Path, version: &str) {
    if let Err(e) = std::fs::write(dir.join(WORKER_VERSION_FILE), version) {
        warn!(error = %e, "Failed to record active worker version");
    }
}

async fn forward_navigation(
    mut events: broadcast::Receiver<NavigationEvent>,
    tx: mpsc::Sender<ClientEvent>,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if tx.send(ClientEvent::Navigation(event)).await.is_err() {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "Navigation event receiver lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

async fn forward_worker(mut events: broadcast::Receiver<WorkerEvent>, tx: mpsc::Sender<ClientEvent>) {
    loop {
        let event = match events.recv().await {
            Ok(WorkerEvent::SyncSuccess { id, url }) => ClientEvent::Synced { id, url },
            Ok(WorkerEvent::InstallFailed { reason }) => {
                ClientEvent::Error(format!("Offline worker install failed: {}", reason))
            }
            Ok(WorkerEvent::Activated { version }) => {
                debug!(version = %version, "Offline worker active");
                continue;
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "Worker event receiver lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };
        if tx.send(event).await.is_err() {
            break;
        }
    }
}

/// Report connectivity changes and replay the offline queue when back online.
///
/// `reported` is the state at subscription time; a change made before this
/// task first runs is still reported.
async fn watch_connectivity(
    mut changes: watch::Receiver<bool>,
    mut reported: bool,
    worker: Arc<WorkerHandle>,
    tx: mpsc::Sender<ClientEvent>,
) {
    let mut online = *changes.borrow_and_update();
    loop {
        if online != reported {
            reported = online;
            if tx.send(ClientEvent::Connectivity { online }).await.is_err() {
                break;
            }
        }
        if online && !worker.worker().queue().is_empty() {
            replay(&worker, &tx).await;
        }
        if changes.changed().await.is_err() {
            break;
        }
        online = *changes.borrow_and_update();
    }
}

async fn replay(worker: &WorkerHandle, tx: &mpsc::Sender<ClientEvent>) {
    match worker.sync().await {
        Ok(report) => debug!(replayed = report.replayed.len(), failed = report.failed.len(), "Sync finished"),
        Err(e) => {
            let _ = tx.send(ClientEvent::Error(format!("Sync failed: {}", e))).await;
        }
    }
}
