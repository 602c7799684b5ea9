//! The offline worker: lifecycle, fetch interception and queue replay.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::try_join_all;
use reqwest::Url;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::messages::{WorkerEvent, WorkerMessage, WorkerReply};
use super::storage::CacheStorage;
use super::strategy::{has_asset_extension, select_strategy, Strategy};
use crate::api::{executor, FetchError, Method, OfflineQueue, RequestOptions, Response, Transport};
use crate::config::Config;
use crate::data::url_path;

/// Cache name prefix; full names are `stmbudget-<kind>-<version>`
const CACHE_PREFIX: &str = "stmbudget";

/// Page served from the static cache when a navigation fails offline
const OFFLINE_PAGE: &str = "/offline/";

const EVENT_CAPACITY: usize = 64;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorkerError {
    #[error("Failed to pre-cache {url}: {source}")]
    Install { url: String, source: FetchError },

    #[error("Worker is {actual:?}, expected {expected:?}")]
    InvalidState {
        expected: WorkerState,
        actual: WorkerState,
    },

    #[error("Worker has stopped")]
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WorkerState {
    Parsed,
    Installing,
    Installed,
    Activating,
    Activated,
    /// Installation failed or a newer version replaced this one
    Redundant,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub version: String,
    /// Origin treated as same-origin; relative URLs always are
    pub origin: Option<Url>,
    pub static_manifest: Vec<String>,
    pub timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            version: "v1".to_string(),
            origin: None,
            static_manifest: Vec::new(),
            timeout: executor::DEFAULT_TIMEOUT,
        }
    }
}

impl From<&Config> for WorkerConfig {
    fn from(config: &Config) -> Self {
        Self {
            version: config.cache_version.clone(),
            origin: config.base_url.as_deref().and_then(|u| Url::parse(u).ok()),
            static_manifest: config.static_manifest.clone(),
            timeout: config.request_timeout(),
        }
    }
}

/// Outcome of one offline-queue replay
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub replayed: Vec<u64>,
    pub failed: Vec<u64>,
}

pub struct OfflineWorker {
    config: WorkerConfig,
    state: Mutex<WorkerState>,
    skip_waiting: AtomicBool,
    controlled_clients: AtomicUsize,
    caches: Arc<Mutex<CacheStorage>>,
    transport: Arc<dyn Transport>,
    queue: Arc<OfflineQueue>,
    events: broadcast::Sender<WorkerEvent>,
}

impl OfflineWorker {
    pub fn new(config: WorkerConfig, transport: Arc<dyn Transport>, queue: Arc<OfflineQueue>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            config,
            state: Mutex::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
            controlled_clients: AtomicUsize::new(0),
            caches: Arc::new(Mutex::new(CacheStorage::new())),
            transport,
            queue,
            events,
        }
    }

    pub fn version(&self) -> &str {
        &self.config.version
    }

    pub fn state(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: WorkerState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
        debug!(?state, version = %self.config.version, "Worker state changed");
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }

    pub fn queue(&self) -> &Arc<OfflineQueue> {
        &self.queue
    }

    pub fn cache_name(&self, kind: &str) -> String {
        format!("{}-{}-{}", CACHE_PREFIX, kind, self.config.version)
    }

    fn static_cache(&self) -> String {
        self.cache_name("static")
    }

    fn dynamic_cache(&self) -> String {
        self.cache_name("dynamic")
    }

    fn api_cache(&self) -> String {
        self.cache_name("api")
    }

    fn lock_caches(&self) -> std::sync::MutexGuard<'_, CacheStorage> {
        self.caches.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed storage, e.g. with caches left by an older version
    pub fn seed_cache(&self, cache: &str, url: &str, response: Response) {
        self.lock_caches().put(cache, url, response);
    }

    pub fn cache_names(&self) -> Vec<String> {
        self.lock_caches().names()
    }

    pub fn cache_size(&self) -> usize {
        self.lock_caches().entry_count()
    }

    pub fn cache_size_bytes(&self) -> usize {
        self.lock_caches().size_bytes()
    }

    pub fn add_client(&self) {
        self.controlled_clients.fetch_add(1, Ordering::AcqRel);
    }

    pub fn remove_client(&self) {
        let _ = self
            .controlled_clients
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// Pre-cache the static manifest. Any failure fails the whole install and
    /// leaves the worker redundant; nothing is stored in that case.
    pub async fn install(&self) -> Result<(), WorkerError> {
        self.set_state(WorkerState::Installing);
        info!(version = %self.config.version, assets = self.config.static_manifest.len(), "Installing offline worker");

        let fetches = self.config.static_manifest.iter().map(|url| async move {
            match send(&*self.transport, url, &RequestOptions::get(), self.config.timeout).await {
                Ok(response) if response.is_success() => Ok((url.clone(), response)),
                Ok(response) => Err(WorkerError::Install {
                    url: url.clone(),
                    source: FetchError::from_status(response.status, &response.body),
                }),
                Err(source) => Err(WorkerError::Install {
                    url: url.clone(),
                    source,
                }),
            }
        });

        match try_join_all(fetches).await {
            Ok(assets) => {
                let cache = self.static_cache();
                let mut caches = self.lock_caches();
                for (url, response) in assets {
                    caches.put(&cache, &url, response);
                }
                drop(caches);
                self.set_state(WorkerState::Installed);
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Offline worker install failed");
                self.set_state(WorkerState::Redundant);
                let _ = self.events.send(WorkerEvent::InstallFailed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// An installed worker waits while an older version still controls
    /// clients, unless told to skip waiting.
    pub fn is_waiting(&self) -> bool {
        self.state() == WorkerState::Installed
            && !self.skip_waiting.load(Ordering::Acquire)
            && self.controlled_clients.load(Ordering::Acquire) > 0
    }

    /// Take control and delete caches from other versions.
    /// Returns the number of caches deleted.
    pub fn activate(&self) -> Result<usize, WorkerError> {
        let actual = self.state();
        if actual != WorkerState::Installed {
            return Err(WorkerError::InvalidState {
                expected: WorkerState::Installed,
                actual,
            });
        }
        self.set_state(WorkerState::Activating);

        let keep = [self.static_cache(), self.dynamic_cache(), self.api_cache()];
        let deleted = {
            let mut caches = self.lock_caches();
            let stale: Vec<String> = caches
                .names()
                .into_iter()
                .filter(|name| !keep.contains(name))
                .collect();
            for name in &stale {
                caches.delete(name);
            }
            stale.len()
        };

        self.set_state(WorkerState::Activated);
        info!(version = %self.config.version, deleted, "Offline worker activated");
        let _ = self.events.send(WorkerEvent::Activated {
            version: self.config.version.clone(),
        });
        Ok(deleted)
    }

    fn is_same_origin(&self, url: &str) -> bool {
        match Url::parse(url) {
            Ok(absolute) => self
                .config
                .origin
                .as_ref()
                .is_some_and(|origin| origin.origin() == absolute.origin()),
            Err(_) => url.starts_with('/'),
        }
    }

    /// Answer a request the way the page would see it.
    ///
    /// Same-origin GETs go through the caching strategy for their path and
    /// never fail: when both network and cache miss, a synthetic 503 is
    /// returned. Everything else goes straight to the network.
    pub async fn fetch(&self, url: &str, options: &RequestOptions) -> Result<Response, FetchError> {
        if options.method != Method::Get || !self.is_same_origin(url) {
            return send(&*self.transport, url, options, self.config.timeout).await;
        }

        let path = url_path(url);
        let strategy = select_strategy(&path);
        debug!(url, ?strategy, "Worker fetch");

        let response = match strategy {
            Strategy::NetworkFirst => self.network_first(url, &path, options).await,
            Strategy::CacheFirst => self.cache_first(url, options).await,
            Strategy::StaleWhileRevalidate => self.stale_while_revalidate(url, options).await,
        };
        Ok(response.unwrap_or_else(|| self.offline_response(&path, options)))
    }

    async fn network_first(&self, url: &str, path: &str, options: &RequestOptions) -> Option<Response> {
        let cache = if path.starts_with("/api/") {
            self.api_cache()
        } else {
            self.dynamic_cache()
        };
        match send(&*self.transport, url, options, self.config.timeout).await {
            Ok(response) => {
                if response.is_success() {
                    self.lock_caches().put(&cache, url, response.clone());
                }
                Some(response)
            }
            Err(e) => {
                debug!(url, error = %e, "Network failed, trying cache");
                self.lock_caches().match_url(url).cloned()
            }
        }
    }

    async fn cache_first(&self, url: &str, options: &RequestOptions) -> Option<Response> {
        let cached = self.lock_caches().match_url(url).cloned();
        if cached.is_some() {
            return cached;
        }
        match send(&*self.transport, url, options, self.config.timeout).await {
            Ok(response) => {
                if response.is_success() {
                    self.lock_caches().put(&self.static_cache(), url, response.clone());
                }
                Some(response)
            }
            Err(_) => None,
        }
    }

    async fn stale_while_revalidate(&self, url: &str, options: &RequestOptions) -> Option<Response> {
        let cached = self.lock_caches().match_url(url).cloned();
        let cache = self.dynamic_cache();

        if let Some(cached) = cached {
            let transport = Arc::clone(&self.transport);
            let caches = Arc::clone(&self.caches);
            let (url, options, timeout) = (url.to_string(), options.clone(), self.config.timeout);
            tokio::spawn(async move {
                match send(&*transport, &url, &options, timeout).await {
                    Ok(response) if response.is_success() => {
                        caches
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .put(&cache, &url, response);
                        debug!(url = %url, "Revalidated cached response");
                    }
                    Ok(response) => debug!(url = %url, status = response.status, "Revalidation skipped"),
                    Err(e) => debug!(url = %url, error = %e, "Revalidation failed"),
                }
            });
            return Some(cached);
        }

        match send(&*self.transport, url, options, self.config.timeout).await {
            Ok(response) => {
                if response.is_success() {
                    self.lock_caches().put(&cache, url, response.clone());
                }
                Some(response)
            }
            Err(_) => None,
        }
    }

    /// Synthetic 503 for a request nothing could answer
    fn offline_response(&self, path: &str, options: &RequestOptions) -> Response {
        if path.starts_with("/api/") {
            return Response::json(
                503,
                &json!({
                    "error": "offline",
                    "message": "You are offline. The request will be retried when the connection returns."
                }),
            );
        }

        let wants_html = options
            .headers
            .get("accept")
            .is_some_and(|accept| accept.contains("text/html"));
        if wants_html || !has_asset_extension(path) {
            let page = self
                .lock_caches()
                .get(&self.static_cache(), OFFLINE_PAGE)
                .map(|r| r.body.clone());
            let body = page.unwrap_or_else(|| {
                "<!DOCTYPE html><html><head><title>Offline | STMBudget</title></head>\
                 <body><main class=\"offline\"><h1>You are offline</h1>\
                 <p>Check your connection and try again.</p></main></body></html>"
                    .to_string()
            });
            return Response::html(503, body);
        }

        Response::new(503, "Offline").with_header("content-type", "text/plain")
    }

    /// Replay every queued request. Successful items are removed and
    /// announced with `SyncSuccess`; failed items stay for the next sync.
    ///
    /// Delivery is at-least-once: a request that reached the server but whose
    /// reply was lost is sent again. Items are independent; no order holds
    /// across them.
    pub async fn sync(&self) -> SyncReport {
        let items = self.queue.items();
        let mut report = SyncReport::default();
        if items.is_empty() {
            return report;
        }
        info!(count = items.len(), "Replaying offline queue");

        for item in items {
            self.queue.record_attempt(item.id);
            match send(&*self.transport, &item.url, &item.options, self.config.timeout).await {
                Ok(response) if response.is_success() => {
                    self.queue.remove(item.id);
                    report.replayed.push(item.id);
                    let _ = self.events.send(WorkerEvent::SyncSuccess {
                        id: item.id,
                        url: item.url,
                    });
                }
                Ok(response) => {
                    warn!(id = item.id, url = %item.url, status = response.status, "Queued request rejected, keeping it");
                    report.failed.push(item.id);
                }
                Err(e) => {
                    warn!(id = item.id, url = %item.url, error = %e, "Queued request failed, keeping it");
                    report.failed.push(item.id);
                }
            }
        }
        report
    }

    pub async fn handle_message(&self, message: WorkerMessage) -> WorkerReply {
        match message {
            WorkerMessage::SkipWaiting => {
                self.skip_waiting.store(true, Ordering::Release);
                WorkerReply::Ack
            }
            WorkerMessage::CacheUrls { urls } => {
                let cache = self.dynamic_cache();
                let mut count = 0;
                for url in urls {
                    match send(&*self.transport, &url, &RequestOptions::get(), self.config.timeout).await {
                        Ok(response) if response.is_success() => {
                            self.lock_caches().put(&cache, &url, response);
                            count += 1;
                        }
                        Ok(response) => debug!(url = %url, status = response.status, "Not caching"),
                        Err(e) => debug!(url = %url, error = %e, "Failed to cache URL"),
                    }
                }
                WorkerReply::Cached { count }
            }
            WorkerMessage::ClearCache => {
                self.lock_caches().clear();
                info!("Worker caches cleared");
                WorkerReply::Ack
            }
            WorkerMessage::GetCacheSize => WorkerReply::CacheSize {
                size: self.cache_size(),
            },
        }
    }
}

/// One network attempt under a timeout
async fn send(
    transport: &dyn Transport,
    url: &str,
    options: &RequestOptions,
    timeout: Duration,
) -> Result<Response, FetchError> {
    match tokio::time::timeout(timeout, transport.send(url, options)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout {
            after_ms: timeout.as_millis() as u64,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransport;

    fn worker(transport: &Arc<ScriptedTransport>, manifest: &[&str]) -> OfflineWorker {
        let config = WorkerConfig {
            version: "v2".into(),
            origin: Url::parse("https://stm.example.com").ok(),
            static_manifest: manifest.iter().map(|s| s.to_string()).collect(),
            timeout: Duration::from_secs(1),
        };
        OfflineWorker::new(config, transport.clone(), Arc::new(OfflineQueue::in_memory()))
    }

    fn offline(transport: &ScriptedTransport, url: &str) {
        transport.push(url, Err(FetchError::Network("offline".into())));
    }

    #[tokio::test]
    async fn test_install_then_activate_removes_old_caches() {
        let transport = Arc::new(ScriptedTransport::new());
        let worker = worker(&transport, &["/", "/static/css/main.css"]);
        worker.seed_cache("stmbudget-static-v1", "/", Response::html(200, "old"));

        worker.install().await.unwrap();
        assert_eq!(worker.state(), WorkerState::Installed);
        assert_eq!(worker.activate().unwrap(), 1);
        assert_eq!(worker.state(), WorkerState::Activated);
        assert_eq!(worker.cache_names(), vec!["stmbudget-static-v2".to_string()]);
        assert_eq!(worker.cache_size(), 2);
    }

    #[tokio::test]
    async fn test_install_failure_is_all_or_nothing() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push("/static/js/app.js", Ok(Response::new(404, "missing")));
        let worker = worker(&transport, &["/", "/static/js/app.js"]);
        let mut events = worker.subscribe();

        let err = worker.install().await.unwrap_err();
        assert!(matches!(err, WorkerError::Install { ref url, .. } if url == "/static/js/app.js"));
        assert_eq!(worker.state(), WorkerState::Redundant);
        assert_eq!(worker.cache_size(), 0);
        assert!(matches!(events.recv().await.unwrap(), WorkerEvent::InstallFailed { .. }));
        assert!(worker.activate().is_err());
    }

    #[tokio::test]
    async fn test_waiting_until_skip_waiting() {
        let transport = Arc::new(ScriptedTransport::new());
        let worker = worker(&transport, &[]);
        worker.add_client();
        worker.install().await.unwrap();
        assert!(worker.is_waiting());

        assert_eq!(worker.handle_message(WorkerMessage::SkipWaiting).await, WorkerReply::Ack);
        assert!(!worker.is_waiting());
    }

    #[tokio::test]
    async fn test_network_first_falls_back_to_cache() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push("/api/dashboard-stats/", Ok(Response::json(200, &json!({"sales": 10}))));
        offline(&transport, "/api/dashboard-stats/");
        let worker = worker(&transport, &[]);

        let fresh = worker.fetch("/api/dashboard-stats/", &RequestOptions::get()).await.unwrap();
        let fallback = worker.fetch("/api/dashboard-stats/", &RequestOptions::get()).await.unwrap();
        assert_eq!(fresh, fallback);
        assert_eq!(transport.calls_to("/api/dashboard-stats/"), 2);
    }

    #[tokio::test]
    async fn test_cache_first_skips_network_on_hit() {
        let transport = Arc::new(ScriptedTransport::new());
        let worker = worker(&transport, &["/static/css/main.css"]);
        worker.install().await.unwrap();

        let response = worker.fetch("/static/css/main.css", &RequestOptions::get()).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(transport.calls_to("/static/css/main.css"), 1);
    }

    #[tokio::test]
    async fn test_stale_while_revalidate_serves_cache_and_refreshes() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push("/dashboard/", Ok(Response::html(200, "v1")));
        transport.push("/dashboard/", Ok(Response::html(200, "v2")));
        let worker = worker(&transport, &[]);

        let first = worker.fetch("/dashboard/", &RequestOptions::get()).await.unwrap();
        assert_eq!(first.body, "v1");
        let second = worker.fetch("/dashboard/", &RequestOptions::get()).await.unwrap();
        assert_eq!(second.body, "v1");

        for _ in 0..50 {
            if transport.calls_to("/dashboard/") == 2 && worker.lock_caches().match_url("/dashboard/").map(|r| r.body.as_str()) == Some("v2") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let third = worker.fetch("/dashboard/", &RequestOptions::get()).await.unwrap();
        assert_eq!(third.body, "v2");
    }

    #[tokio::test]
    async fn test_offline_responses_by_kind() {
        let transport = Arc::new(ScriptedTransport::new());
        for url in ["/api/budgets/", "/sales-budget/", "/media/chart.png"] {
            offline(&transport, url);
        }
        let worker = worker(&transport, &[]);

        let api = worker.fetch("/api/budgets/", &RequestOptions::get()).await.unwrap();
        assert_eq!(api.status, 503);
        assert_eq!(api.content_type(), Some("application/json"));

        let page = worker.fetch("/sales-budget/", &RequestOptions::get()).await.unwrap();
        assert_eq!(page.status, 503);
        assert!(page.body.contains("You are offline"));

        let asset = worker.fetch("/media/chart.png", &RequestOptions::get()).await.unwrap();
        assert_eq!(asset.status, 503);
        assert_eq!(asset.content_type(), Some("text/plain"));
    }

    #[tokio::test]
    async fn test_offline_navigation_uses_cached_offline_page() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push(OFFLINE_PAGE, Ok(Response::html(200, "<main>Offline mode</main>")));
        offline(&transport, "/reports/");
        let worker = worker(&transport, &[OFFLINE_PAGE]);
        worker.install().await.unwrap();

        let page = worker.fetch("/reports/", &RequestOptions::get()).await.unwrap();
        assert_eq!(page.status, 503);
        assert_eq!(page.body, "<main>Offline mode</main>");
    }

    #[tokio::test]
    async fn test_non_get_and_cross_origin_bypass() {
        let transport = Arc::new(ScriptedTransport::new());
        offline(&transport, "/api/budgets/");
        offline(&transport, "https://cdn.example.net/lib.js");
        let worker = worker(&transport, &[]);

        let post = worker.fetch("/api/budgets/", &RequestOptions::new(Method::Post)).await;
        assert!(matches!(post, Err(FetchError::Network(_))));
        let cross = worker.fetch("https://cdn.example.net/lib.js", &RequestOptions::get()).await;
        assert!(cross.is_err());
    }

    #[tokio::test]
    async fn test_sync_removes_replayed_and_keeps_failed() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push("/api/forecasts/", Ok(Response::new(502, "bad gateway")));
        let worker = worker(&transport, &[]);
        let mut events = worker.subscribe();

        let ok_id = worker.queue().enqueue("/api/budgets/", RequestOptions::new(Method::Post));
        let bad_id = worker.queue().enqueue("/api/forecasts/", RequestOptions::new(Method::Put));

        let report = worker.sync().await;
        assert_eq!(report.replayed, vec![ok_id]);
        assert_eq!(report.failed, vec![bad_id]);

        let remaining = worker.queue().items();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, bad_id);
        assert_eq!(remaining[0].attempts, 1);
        assert_eq!(
            events.recv().await.unwrap(),
            WorkerEvent::SyncSuccess {
                id: ok_id,
                url: "/api/budgets/".into()
            }
        );

        // Second pass replays the survivor
        let report = worker.sync().await;
        assert_eq!(report.replayed, vec![bad_id]);
        assert!(worker.queue().is_empty());
    }

    #[tokio::test]
    async fn test_messages() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push("/broken/", Ok(Response::new(500, "err")));
        let worker = worker(&transport, &[]);

        let reply = worker
            .handle_message(WorkerMessage::CacheUrls {
                urls: vec!["/dashboard/".into(), "/profile/".into(), "/broken/".into()],
            })
            .await;
        assert_eq!(reply, WorkerReply::Cached { count: 2 });
        assert_eq!(
            worker.handle_message(WorkerMessage::GetCacheSize).await,
            WorkerReply::CacheSize { size: 2 }
        );
        assert_eq!(worker.handle_message(WorkerMessage::ClearCache).await, WorkerReply::Ack);
        assert_eq!(worker.cache_size(), 0);
    }
}
