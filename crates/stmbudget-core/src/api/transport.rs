use async_trait::async_trait;

use super::{FetchError, RequestOptions, Response};

/// A single network round trip.
///
/// Implementations return `Ok` for any HTTP status that came back from the
/// server; classifying statuses into errors is the executor's job. `Err` is
/// reserved for failures where no response exists (connection refused, DNS,
/// malformed URL).
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, url: &str, options: &RequestOptions) -> Result<Response, FetchError>;
}
