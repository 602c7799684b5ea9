//! HTTP transport for the STMBudget backend.
//!
//! This module provides the `HttpTransport` struct that sends requests to the
//! same-origin endpoints with the headers the backend expects.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client, Url};
use tracing::{debug, warn};

use super::{FetchError, Method, RequestOptions, Response, Transport};

// ============================================================================
// Constants
// ============================================================================

/// Header the backend uses to recognise fragment (AJAX) requests
const REQUESTED_WITH_HEADER: &str = "x-requested-with";
const REQUESTED_WITH_VALUE: &str = "XMLHttpRequest";

/// Header carrying the Django CSRF token on every request
const CSRF_HEADER: &str = "x-csrftoken";

/// HTTP transport backed by reqwest.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Option<Url>,
    csrf_token: Option<Arc<String>>,
}

impl HttpTransport {
    /// Create a new transport. Relative request URLs are resolved against
    /// `base_url`; without one only absolute URLs can be sent.
    ///
    /// No client-level timeout is set: the executor owns the timeout.
    pub fn new(base_url: Option<&str>) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("Failed to build HTTP client")?;

        let base_url = base_url
            .map(|raw| Url::parse(raw).with_context(|| format!("Invalid base URL: {}", raw)))
            .transpose()?;

        Ok(Self {
            client,
            base_url,
            csrf_token: None,
        })
    }

    /// Create a new transport with the given CSRF token, sharing the connection pool.
    pub fn with_csrf_token(&self, token: impl Into<Arc<String>>) -> Self {
        Self {
            client: self.client.clone(), // Cheap clone, shares connection pool
            base_url: self.base_url.clone(),
            csrf_token: Some(token.into()),
        }
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Resolve a request URL against the base URL
    pub fn resolve(&self, url: &str) -> Result<Url, FetchError> {
        if let Ok(absolute) = Url::parse(url) {
            return Ok(absolute);
        }
        match self.base_url {
            Some(ref base) => base
                .join(url)
                .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", url, e))),
            None => Err(FetchError::InvalidUrl(format!(
                "{}: relative URL without a configured base URL",
                url
            ))),
        }
    }

    fn headers(&self, options: &RequestOptions) -> header::HeaderMap {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            REQUESTED_WITH_HEADER,
            header::HeaderValue::from_static(REQUESTED_WITH_VALUE),
        );
        if let Some(ref token) = self.csrf_token {
            match header::HeaderValue::from_str(token) {
                Ok(value) => {
                    headers.insert(CSRF_HEADER, value);
                }
                Err(e) => warn!(error = %e, "CSRF token is not a valid header value"),
            }
        }

        for (name, value) in &options.headers {
            let parsed = (
                header::HeaderName::from_bytes(name.as_bytes()),
                header::HeaderValue::from_str(value),
            );
            match parsed {
                (Ok(name), Ok(value)) => {
                    headers.insert(name, value);
                }
                _ => warn!(header = %name, "Skipping invalid request header"),
            }
        }
        headers
    }

    fn method(method: Method) -> reqwest::Method {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, url: &str, options: &RequestOptions) -> Result<Response, FetchError> {
        let resolved = self.resolve(url)?;
        debug!(method = options.method.as_str(), url = %resolved, "Sending request");

        let mut request = self
            .client
            .request(Self::method(options.method), resolved)
            .headers(self.headers(options));
        if let Some(ref body) = options.body {
            request = request.json(body);
        }

        let response = request.send().await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Network(format!("Failed to read response body: {}", e)))?;

        Ok(Response {
            status,
            headers,
            body,
        })
    }
}
