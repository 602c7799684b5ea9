//! Request execution with timeout, retry/backoff and offline queueing.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{FetchError, NetworkStatus, OfflineQueue, RequestOptions, Response, Transport};

// ============================================================================
// Constants
// ============================================================================

/// Default per-attempt timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(10_000);

/// Default number of retries after the first attempt
pub const DEFAULT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Upper bound on a single backoff delay in milliseconds
const MAX_BACKOFF_MS: u64 = 10_000;

/// Exponential backoff: `min(base * 2^attempt, cap)`, attempt counted from 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub cap: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(INITIAL_BACKOFF_MS),
            cap: Duration::from_millis(MAX_BACKOFF_MS),
        }
    }
}

impl Backoff {
    pub fn delay(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.cap, |delay| delay.min(self.cap))
    }
}

/// Wraps a `Transport` with timeout, retry and offline queueing.
///
/// Successful responses are returned untouched; caching is the data
/// manager's job.
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn Transport>,
    network: NetworkStatus,
    queue: Option<Arc<OfflineQueue>>,
    backoff: Backoff,
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn Transport>, network: NetworkStatus) -> Self {
        Self {
            transport,
            network,
            queue: None,
            backoff: Backoff::default(),
        }
    }

    pub fn with_queue(mut self, queue: Arc<OfflineQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn network(&self) -> &NetworkStatus {
        &self.network
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    /// Execute a request, retrying transient failures up to `retries` more times.
    ///
    /// Non-retryable failures (timeout, abort, 4xx) return immediately. When
    /// retries are exhausted while offline, a mutating request is queued and
    /// the caller gets `FetchError::Queued`.
    pub async fn execute(
        &self,
        url: &str,
        options: &RequestOptions,
        retries: u32,
        timeout: Duration,
    ) -> Result<Response, FetchError> {
        let mut attempt = 0;

        loop {
            let error = match self.attempt(url, options, timeout).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            if !error.is_retryable() {
                debug!(url, error = %error, "Request failed, not retryable");
                return Err(error);
            }

            if attempt >= retries {
                return Err(self.exhausted(url, options, error));
            }

            let delay = self.backoff.delay(attempt);
            warn!(
                url,
                retry = attempt + 1,
                backoff_ms = delay.as_millis() as u64,
                error = %error,
                "Request failed, backing off"
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn attempt(
        &self,
        url: &str,
        options: &RequestOptions,
        timeout: Duration,
    ) -> Result<Response, FetchError> {
        match tokio::time::timeout(timeout, self.transport.send(url, options)).await {
            Err(_) => Err(FetchError::Timeout {
                after_ms: timeout.as_millis() as u64,
            }),
            Ok(Err(e)) => Err(e),
            Ok(Ok(response)) if response.is_success() => Ok(response),
            Ok(Ok(response)) => Err(FetchError::from_status(response.status, &response.body)),
        }
    }

    fn exhausted(&self, url: &str, options: &RequestOptions, error: FetchError) -> FetchError {
        if self.network.is_online() || !options.method.is_mutating() {
            return error;
        }
        match self.queue {
            Some(ref queue) => {
                let id = queue.enqueue(url, options.clone());
                info!(id, url, error = %error, "Offline - request queued for replay");
                FetchError::Queued { id }
            }
            None => error,
        }
    }
}
