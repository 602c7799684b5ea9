//! Request and response types shared by the executor, data manager and worker.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::FetchError;

/// HTTP methods the client issues.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    #[default]
    Get,
    Head,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    /// Methods that change server state. Only these are queued while offline.
    pub fn is_mutating(&self) -> bool {
        matches!(
            self,
            Method::Post | Method::Put | Method::Patch | Method::Delete
        )
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Some(Method::Get),
            "HEAD" => Some(Method::Head),
            "POST" => Some(Method::Post),
            "PUT" => Some(Method::Put),
            "PATCH" => Some(Method::Patch),
            "DELETE" => Some(Method::Delete),
            _ => None,
        }
    }
}

/// Everything about a request except its URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestOptions {
    #[serde(default)]
    pub method: Method,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// A fully-read HTTP response. Header names are stored lowercased.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: u16,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

impl Response {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: body.into(),
        }
    }

    pub fn json(status: u16, value: &Value) -> Self {
        Self::new(status, value.to_string()).with_header("content-type", "application/json")
    }

    pub fn html(status: u16, body: impl Into<String>) -> Self {
        Self::new(status, body).with_header("content-type", "text/html; charset=utf-8")
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type").map(String::as_str)
    }
}

/// A response body classified by content type. This is what gets cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "content", rename_all = "lowercase")]
pub enum Payload {
    Json(Value),
    Html(String),
    Text(String),
}

impl Payload {
    pub fn from_response(response: &Response) -> Result<Self, FetchError> {
        let content_type = response.content_type().unwrap_or_default().to_ascii_lowercase();

        if content_type.contains("json") {
            return serde_json::from_str(&response.body)
                .map(Payload::Json)
                .map_err(|e| FetchError::InvalidResponse(format!("Malformed JSON body: {}", e)));
        }
        if content_type.contains("html") {
            return Ok(Payload::Html(response.body.clone()));
        }

        // Untyped bodies that parse as JSON objects/arrays are treated as JSON
        let trimmed = response.body.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(value) = serde_json::from_str(&response.body) {
                return Ok(Payload::Json(value));
            }
        }
        Ok(Payload::Text(response.body.clone()))
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_html(&self) -> Option<&str> {
        match self {
            Payload::Html(s) => Some(s),
            _ => None,
        }
    }

    /// Approximate size in bytes, used for status display
    pub fn size_bytes(&self) -> usize {
        match self {
            Payload::Json(v) => v.to_string().len(),
            Payload::Html(s) | Payload::Text(s) => s.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payload_by_content_type() {
        let resp = Response::json(200, &json!({"count": 4}));
        assert_eq!(
            Payload::from_response(&resp).unwrap(),
            Payload::Json(json!({"count": 4}))
        );

        let resp = Response::html(200, "<div>budget</div>");
        assert_eq!(
            Payload::from_response(&resp).unwrap().as_html(),
            Some("<div>budget</div>")
        );
    }

    #[test]
    fn test_payload_sniffs_untyped_json() {
        let resp = Response::new(200, "[1, 2]");
        assert!(Payload::from_response(&resp).unwrap().as_json().is_some());

        let resp = Response::new(200, "plain words");
        assert_eq!(
            Payload::from_response(&resp).unwrap(),
            Payload::Text("plain words".into())
        );
    }

    #[test]
    fn test_malformed_json_is_invalid_response() {
        let resp = Response::new(200, "{oops").with_header("Content-Type", "application/json");
        assert!(matches!(
            Payload::from_response(&resp),
            Err(FetchError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_method_mutating() {
        assert!(!Method::Get.is_mutating());
        assert!(Method::Post.is_mutating());
        assert!(Method::Delete.is_mutating());
        assert_eq!(Method::parse("patch"), Some(Method::Patch));
        assert_eq!(Method::parse("TRACE"), None);
    }
}
