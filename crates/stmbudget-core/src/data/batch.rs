//! Batched fetches grouped by priority and origin.

use std::collections::BTreeMap;

use futures::stream::{self, StreamExt};
use tracing::debug;

use super::key::url_origin;
use super::manager::{DataManager, FetchOptions};
use crate::api::{FetchError, Payload};

/// Scheduling priority for a batched request. Groups run High first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub url: String,
    pub options: FetchOptions,
    pub priority: Priority,
}

impl BatchRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            options: FetchOptions::default(),
            priority: Priority::default(),
        }
    }

    pub fn options(mut self, options: FetchOptions) -> Self {
        self.options = options;
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }
}

impl DataManager {
    /// Fetch many URLs. Requests are grouped by (priority, origin); groups run
    /// one after another and requests inside a group run with bounded
    /// concurrency. Results come back in input order.
    pub async fn fetch_batch(
        &self,
        requests: Vec<BatchRequest>,
    ) -> Vec<Result<Payload, FetchError>> {
        let total = requests.len();
        let concurrency = self.inner.config.batch_concurrency.max(1);

        let mut groups: BTreeMap<(Priority, String), Vec<(usize, BatchRequest)>> = BTreeMap::new();
        for (index, request) in requests.into_iter().enumerate() {
            let group = (request.priority, url_origin(&request.url));
            groups.entry(group).or_default().push((index, request));
        }

        let mut results: Vec<Option<Result<Payload, FetchError>>> = vec![None; total];
        for ((priority, origin), members) in groups {
            debug!(?priority, origin = %origin, count = members.len(), "Running batch group");
            let finished: Vec<(usize, Result<Payload, FetchError>)> = stream::iter(members)
                .map(|(index, request)| async move {
                    (index, self.fetch_data(&request.url, request.options).await)
                })
                .buffer_unordered(concurrency)
                .collect()
                .await;
            for (index, result) in finished {
                results[index] = Some(result);
            }
        }

        results
            .into_iter()
            .map(|r| r.unwrap_or(Err(FetchError::Aborted)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{NetworkStatus, RequestExecutor, Response};
    use crate::cache::CacheStore;
    use crate::data::DataManagerConfig;
    use crate::testing::ScriptedTransport;
    use std::sync::Arc;
    use std::time::Duration;

    fn manager(transport: &Arc<ScriptedTransport>, concurrency: usize) -> DataManager {
        let executor = RequestExecutor::new(transport.clone(), NetworkStatus::new(true));
        DataManager::new(
            Arc::new(CacheStore::new(50)),
            executor,
            DataManagerConfig {
                batch_concurrency: concurrency,
                ..DataManagerConfig::default()
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_results_keep_input_order() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push("/api/b/", Ok(Response::new(500, "boom")));
        transport.push("/api/b/", Ok(Response::new(500, "boom")));
        transport.push("/api/b/", Ok(Response::new(400, "bad")));
        let manager = manager(&transport, 3);

        let results = manager
            .fetch_batch(vec![
                BatchRequest::new("/api/a/").priority(Priority::Low),
                BatchRequest::new("/api/b/"),
                BatchRequest::new("/api/c/").priority(Priority::High),
            ])
            .await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().as_html(), Some("<main>/api/a/</main>"));
        assert_eq!(results[1].as_ref().unwrap_err().status(), Some(400));
        assert_eq!(results[2].as_ref().unwrap().as_html(), Some("<main>/api/c/</main>"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_high_priority_group_runs_first() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.set_delay(Duration::from_millis(10));
        let manager = manager(&transport, 3);

        manager
            .fetch_batch(vec![
                BatchRequest::new("/low").priority(Priority::Low),
                BatchRequest::new("/normal"),
                BatchRequest::new("/high").priority(Priority::High),
            ])
            .await;

        let high = transport.call_times("/high")[0];
        let normal = transport.call_times("/normal")[0];
        let low = transport.call_times("/low")[0];
        assert!(high < normal);
        assert!(normal < low);
    }

    #[tokio::test(start_paused = true)]
    async fn test_group_concurrency_is_bounded() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.set_delay(Duration::from_millis(100));
        let manager = manager(&transport, 2);

        let start = tokio::time::Instant::now();
        let requests = (0..4).map(|i| BatchRequest::new(format!("/r{}", i))).collect();
        let results = manager.fetch_batch(requests).await;

        assert!(results.iter().all(|r| r.is_ok()));
        // Four requests, two at a time, 100ms each
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert!(start.elapsed() < Duration::from_millis(300));
    }
}
