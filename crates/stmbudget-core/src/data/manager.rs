//! Data manager: cache lookup, request coalescing, background revalidation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use super::key::{cache_key, url_path};
use crate::api::{executor, FetchError, Method, Payload, RequestExecutor, RequestOptions};
use crate::cache::CacheStore;
use crate::config::Config;

// ============================================================================
// Constants
// ============================================================================

/// Default time-to-live for cached responses
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Cached entries older than this fraction of their TTL are revalidated in the background
const REFRESH_THRESHOLD: f64 = 0.7;

/// Default ceiling on concurrent background refreshes
const DEFAULT_MAX_BACKGROUND_REFRESHES: usize = 2;

/// Default per-group concurrency for batched requests
const DEFAULT_BATCH_CONCURRENCY: usize = 3;

type SharedFetch = Shared<BoxFuture<'static, Result<Payload, FetchError>>>;

#[derive(Debug, Clone)]
pub struct DataManagerConfig {
    pub ttl: Duration,
    pub retries: u32,
    pub timeout: Duration,
    pub max_background_refreshes: usize,
    pub batch_concurrency: usize,
}

impl Default for DataManagerConfig {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            retries: executor::DEFAULT_RETRIES,
            timeout: executor::DEFAULT_TIMEOUT,
            max_background_refreshes: DEFAULT_MAX_BACKGROUND_REFRESHES,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
        }
    }
}

impl From<&Config> for DataManagerConfig {
    fn from(config: &Config) -> Self {
        Self {
            ttl: config.cache_ttl(),
            retries: config.max_retries,
            timeout: config.request_timeout(),
            max_background_refreshes: config.max_background_refreshes,
            batch_concurrency: config.batch_concurrency.max(1),
        }
    }
}

/// Per-call options for `DataManager::fetch_data`
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub request: RequestOptions,
    /// Read and write the cache. Only GET requests are ever cached.
    pub use_cache: bool,
    /// Skip the cache read and go to the network
    pub force_refresh: bool,
    /// Override the configured TTL for this entry
    pub ttl: Option<Duration>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            request: RequestOptions::get(),
            use_cache: true,
            force_refresh: false,
            ttl: None,
        }
    }
}

impl FetchOptions {
    pub fn request(request: RequestOptions) -> Self {
        Self {
            request,
            ..Self::default()
        }
    }

    pub fn no_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }
}

/// Orchestrates cache lookups, network fetches and cache writes.
/// Clone is cheap - all state is behind one Arc.
#[derive(Clone)]
pub struct DataManager {
    pub(super) inner: Arc<Inner>,
}

pub(super) struct Inner {
    pub(super) cache: Arc<CacheStore>,
    executor: RequestExecutor,
    inflight: Mutex<HashMap<String, SharedFetch>>,
    refresh_slots: Arc<Semaphore>,
    pub(super) config: DataManagerConfig,
}

/// Removes an in-flight registration when the request task settles
struct InFlightGuard {
    inner: Arc<Inner>,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.inner.lock_inflight().remove(&self.key);
    }
}

impl Inner {
    fn lock_inflight(&self) -> std::sync::MutexGuard<'_, HashMap<String, SharedFetch>> {
        self.inflight.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl DataManager {
    pub fn new(cache: Arc<CacheStore>, executor: RequestExecutor, config: DataManagerConfig) -> Self {
        let refresh_slots = Arc::new(Semaphore::new(config.max_background_refreshes));
        Self {
            inner: Arc::new(Inner {
                cache,
                executor,
                inflight: Mutex::new(HashMap::new()),
                refresh_slots,
                config,
            }),
        }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.inner.cache
    }

    pub fn executor(&self) -> &RequestExecutor {
        &self.inner.executor
    }

    /// Number of distinct requests currently on the wire
    pub fn in_flight(&self) -> usize {
        self.inner.lock_inflight().len()
    }

    /// Fetch a URL through the cache.
    ///
    /// Concurrent calls for the same request share one network call. A cache
    /// hit older than 70% of its TTL is returned immediately and refreshed in
    /// the background when a refresh slot is free.
    pub async fn fetch_data(&self, url: &str, options: FetchOptions) -> Result<Payload, FetchError> {
        let key = cache_key(url, &options.request);

        let pending = self.inner.lock_inflight().get(&key).cloned();
        if let Some(pending) = pending {
            debug!(key = %key, "Joining in-flight request");
            return pending.await;
        }

        let cacheable = options.use_cache && options.request.method == Method::Get;
        if cacheable && !options.force_refresh {
            if let Some(entry) = self.inner.cache.entry(&key) {
                debug!(key = %key, age = %entry.age_display(), "Cache hit");
                if entry.age_fraction() > REFRESH_THRESHOLD {
                    self.schedule_refresh(&key, url, &options);
                }
                return Ok(entry.value);
            }
        }

        self.start_request(key, url, options).await
    }

    /// Register (or join) the in-flight request for `key`
    fn start_request(&self, key: String, url: &str, options: FetchOptions) -> SharedFetch {
        let mut inflight = self.inner.lock_inflight();
        if let Some(existing) = inflight.get(&key) {
            return existing.clone();
        }

        let inner = Arc::clone(&self.inner);
        let url = url.to_string();
        let task_key = key.clone();
        // The request runs on its own task so it settles, and its in-flight
        // entry is removed, even when every caller has gone away.
        let task = tokio::spawn(async move {
            let _guard = InFlightGuard {
                inner: Arc::clone(&inner),
                key: task_key.clone(),
            };
            let response = inner
                .executor
                .execute(&url, &options.request, inner.config.retries, inner.config.timeout)
                .await?;
            let payload = Payload::from_response(&response)?;

            if options.request.method == Method::Get {
                if options.use_cache {
                    let ttl = options.ttl.unwrap_or(inner.config.ttl);
                    inner.cache.set(&task_key, payload.clone(), ttl);
                }
            } else if options.request.method.is_mutating() {
                inner.cache.invalidate(&url_path(&url));
            }
            Ok(payload)
        });
        let fetch = async move {
            task.await.unwrap_or_else(|e| {
                warn!(error = %e, "Request task ended abnormally");
                Err(FetchError::Aborted)
            })
        }
        .boxed()
        .shared();

        inflight.insert(key, fetch.clone());
        fetch
    }

    fn schedule_refresh(&self, key: &str, url: &str, options: &FetchOptions) {
        let permit = match Arc::clone(&self.inner.refresh_slots).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                debug!(key, "Background refresh limit reached, skipping");
                return;
            }
        };

        let fetch = self.start_request(key.to_string(), url, options.clone());
        let key = key.to_string();
        tokio::spawn(async move {
            let _permit = permit;
            match fetch.await {
                Ok(_) => debug!(key = %key, "Background refresh complete"),
                Err(e) => debug!(key = %key, error = %e, "Background refresh failed"),
            }
        });
    }

    /// Warm the cache for `urls` in the background. Failures are logged and dropped.
    pub fn prefetch(&self, urls: Vec<String>) {
        if urls.is_empty() {
            return;
        }
        let manager = self.clone();
        tokio::spawn(async move {
            let count = urls.len();
            let requests = urls
                .into_iter()
                .map(|url| super::BatchRequest::new(url).priority(super::Priority::Low))
                .collect();
            let results = manager.fetch_batch(requests).await;
            let failed = results.iter().filter(|r| r.is_err()).count();
            debug!(count, failed, "Prefetch complete");
        });
    }

    pub fn invalidate(&self, pattern: &str) -> usize {
        self.inner.cache.invalidate(pattern)
    }

    pub fn clear_cache(&self) {
        info!("Clearing response cache");
        self.inner.cache.clear();
    }
}
