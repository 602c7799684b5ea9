use crate::api::RequestOptions;

/// Deterministic cache key for a request.
///
/// Built from the method, URL, serialized body and serialized headers. Header
/// and JSON object keys are ordered maps, so equal requests always produce the
/// same key.
pub fn cache_key(url: &str, options: &RequestOptions) -> String {
    let body = options
        .body
        .as_ref()
        .map(|b| b.to_string())
        .unwrap_or_default();
    let headers = options
        .headers
        .iter()
        .map(|(name, value)| format!("{}={}", name, value))
        .collect::<Vec<_>>()
        .join("&");
    format!("{} {}|{}|{}", options.method.as_str(), url, body, headers)
}

/// Path portion of a URL, used to invalidate cached reads after a mutation
pub fn url_path(url: &str) -> String {
    let path = match reqwest::Url::parse(url) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => url.to_string(),
    };
    path.split(['?', '#']).next().unwrap_or_default().to_string()
}

/// Origin used to group batched requests. Relative URLs share one group.
pub fn url_origin(url: &str) -> String {
    match reqwest::Url::parse(url) {
        Ok(parsed) => parsed.origin().ascii_serialization(),
        Err(_) => "same-origin".to_string(),
    }
}
