//! Seams between the navigator and whatever renders pages.

use async_trait::async_trait;
use serde_json::Value;

use super::error::NavigationError;
use super::route::{RouteDescriptor, RouteParams};
use crate::api::Payload;
use crate::auth::Role;

/// Page transition phase around a content swap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Exit,
    Enter,
}

/// The surface a navigator renders into
#[async_trait]
pub trait ContentView: Send + Sync {
    /// Run a page transition; resolves when it has finished
    async fn transition(&self, transition: Transition);

    fn replace_content(&self, html: &str);

    fn scroll_offset(&self) -> f64;

    fn set_scroll_offset(&self, offset: f64);

    fn set_title(&self, title: &str);

    fn set_meta_description(&self, description: &str);

    /// Give up on in-place navigation and load `path` as a whole document
    fn full_page_load(&self, path: &str);
}

/// Renderable content extracted from a fetched payload
#[derive(Debug, Clone, PartialEq)]
pub struct PageFragment {
    pub html: String,
    pub title: Option<String>,
    pub description: Option<String>,
}

impl PageFragment {
    /// HTML payloads render as-is. JSON payloads with an `html` field render
    /// that field (and may carry `title`/`description`); other JSON is
    /// pretty-printed.
    pub fn from_payload(payload: &Payload) -> Self {
        match payload {
            Payload::Html(html) | Payload::Text(html) => Self {
                html: html.clone(),
                title: None,
                description: None,
            },
            Payload::Json(value) => {
                let field = |name: &str| value.get(name).and_then(Value::as_str).map(str::to_string);
                match field("html") {
                    Some(html) => Self {
                        html,
                        title: field("title"),
                        description: field("description"),
                    },
                    None => Self {
                        html: serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string()),
                        title: None,
                        description: None,
                    },
                }
            }
        }
    }
}

/// Renders failed navigations. The defaults write a small error page.
pub trait NavigationHandlers: Send + Sync {
    fn on_not_found(&self, view: &dyn ContentView, path: &str) {
        view.replace_content(&format!(
            "<section class=\"error-page\"><h1>Page not found</h1><p>{}</p></section>",
            path
        ));
        view.set_title("Page not found | STMBudget");
    }

    fn on_unauthorized(&self, view: &dyn ContentView, path: &str, _role: Option<Role>) {
        view.replace_content(&format!(
            "<section class=\"error-page\"><h1>Access denied</h1><p>You do not have access to {}</p></section>",
            path
        ));
        view.set_title("Access denied | STMBudget");
    }

    fn on_error(&self, view: &dyn ContentView, error: &NavigationError) {
        view.replace_content(&format!(
            "<section class=\"error-page\"><h1>Something went wrong</h1><p>{}</p></section>",
            error
        ));
        view.set_title("Error | STMBudget");
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultHandlers;

impl NavigationHandlers for DefaultHandlers {}

/// What a middleware sees before content is fetched
#[derive(Debug)]
pub struct NavigationContext<'a> {
    pub path: &'a str,
    pub params: &'a RouteParams,
    pub route: &'a RouteDescriptor,
    pub role: Option<Role>,
    pub from: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiddlewareDecision {
    Continue,
    Reject(String),
}

/// Runs in registration order before every navigation fetch.
/// A rejection aborts the navigation without touching content or history.
#[async_trait]
pub trait NavigationMiddleware: Send + Sync {
    async fn before(&self, ctx: &NavigationContext<'_>) -> MiddlewareDecision;
}
