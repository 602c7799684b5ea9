//! The navigator: resolves a path, fetches its content and swaps it in.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use reqwest::Url;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::error::NavigationError;
use super::history::History;
use super::links::{link_disposition, Link, LinkDisposition};
use super::route::{normalize_path, RouteParams, RouteTable};
use super::view::{
    ContentView, DefaultHandlers, MiddlewareDecision, NavigationContext, NavigationHandlers,
    NavigationMiddleware, PageFragment, Transition,
};
use crate::api::{FetchError, Method, Payload, RequestOptions};
use crate::auth::Role;
use crate::data::{DataManager, FetchOptions};

/// Suffix appended to every page title
const TITLE_SUFFIX: &str = "STMBudget";

/// Broadcast buffer for navigation events
const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationEvent {
    Started { path: String },
    Completed { path: String, title: String },
    Failed { path: String, reason: String },
}

/// Snapshot of the navigator's state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NavigationState {
    pub current_path: Option<String>,
    pub current_params: RouteParams,
    pub is_navigating: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HistoryMode {
    Push,
    Replay,
    Back,
    Forward,
}

#[derive(Default)]
struct RouterState {
    current_path: Option<String>,
    current_params: RouteParams,
    history: History,
    /// Last scroll offset per path
    scroll: HashMap<String, f64>,
}

/// Clears the navigating flag however the navigation ends
struct NavigatingGuard<'a>(&'a AtomicBool);

impl<'a> NavigatingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for NavigatingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct Navigator {
    routes: RouteTable,
    data: DataManager,
    view: Arc<dyn ContentView>,
    handlers: Arc<dyn NavigationHandlers>,
    middlewares: Vec<Arc<dyn NavigationMiddleware>>,
    origin: Option<Url>,
    role: RwLock<Option<Role>>,
    navigating: AtomicBool,
    state: Mutex<RouterState>,
    events: broadcast::Sender<NavigationEvent>,
}

impl Navigator {
    pub fn new(routes: RouteTable, data: DataManager, view: Arc<dyn ContentView>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            routes,
            data,
            view,
            handlers: Arc::new(DefaultHandlers),
            middlewares: Vec::new(),
            origin: None,
            role: RwLock::new(None),
            navigating: AtomicBool::new(false),
            state: Mutex::new(RouterState::default()),
            events,
        }
    }

    pub fn with_handlers(mut self, handlers: Arc<dyn NavigationHandlers>) -> Self {
        self.handlers = handlers;
        self
    }

    pub fn with_middleware(mut self, middleware: Arc<dyn NavigationMiddleware>) -> Self {
        self.middlewares.push(middleware);
        self
    }

    pub fn with_origin(mut self, origin: Option<Url>) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_role(self, role: Option<Role>) -> Self {
        self.set_role(role);
        self
    }

    pub fn set_role(&self, role: Option<Role>) {
        *self.role.write().unwrap_or_else(|e| e.into_inner()) = role;
    }

    pub fn role(&self) -> Option<Role> {
        *self.role.read().unwrap_or_else(|e| e.into_inner())
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NavigationEvent> {
        self.events.subscribe()
    }

    pub fn is_navigating(&self) -> bool {
        self.navigating.load(Ordering::Acquire)
    }

    pub fn state(&self) -> NavigationState {
        let state = self.lock_state();
        NavigationState {
            current_path: state.current_path.clone(),
            current_params: state.current_params.clone(),
            is_navigating: self.is_navigating(),
        }
    }

    pub fn history(&self) -> History {
        self.lock_state().history.clone()
    }

    /// Navigate to `path`. Returns `true` when the new content is shown.
    ///
    /// Only one navigation runs at a time; a call made while another is in
    /// progress returns `false` immediately.
    pub async fn navigate(&self, path: &str, add_to_history: bool) -> bool {
        let mode = if add_to_history {
            HistoryMode::Push
        } else {
            HistoryMode::Replay
        };
        self.run(path, mode).await
    }

    pub async fn back(&self) -> bool {
        let target = self.lock_state().history.peek_back().map(str::to_string);
        match target {
            Some(path) => self.run(&path, HistoryMode::Back).await,
            None => false,
        }
    }

    pub async fn forward(&self) -> bool {
        let target = self.lock_state().history.peek_forward().map(str::to_string);
        match target {
            Some(path) => self.run(&path, HistoryMode::Forward).await,
            None => false,
        }
    }

    /// Handle a link click: intercepted links navigate in place.
    /// Returns `false` when the link should be left to the platform.
    pub async fn follow_link(&self, link: &Link<'_>) -> bool {
        match link_disposition(link, self.origin.as_ref()) {
            LinkDisposition::Intercept(path) => self.navigate(&path, true).await,
            LinkDisposition::Native => false,
        }
    }

    async fn run(&self, raw_path: &str, mode: HistoryMode) -> bool {
        let Some(_guard) = NavigatingGuard::acquire(&self.navigating) else {
            debug!(path = raw_path, "Navigation already in progress, ignoring");
            let _ = self.events.send(NavigationEvent::Failed {
                path: raw_path.to_string(),
                reason: NavigationError::Busy.to_string(),
            });
            return false;
        };

        let mut path = normalize_path(raw_path);
        let _ = self.events.send(NavigationEvent::Started { path: path.clone() });

        let mut matched = self.routes.resolve(&path);
        if let Some(target) = matched.as_ref().and_then(|m| m.route.redirect.clone()) {
            debug!(from = %path, to = %target, "Following route redirect");
            path = target;
            matched = self.routes.resolve(&path);
        }

        let Some(matched) = matched else {
            self.handlers.on_not_found(self.view.as_ref(), &path);
            self.fail(NavigationError::NotFound { path });
            return false;
        };

        let role = self.role();
        if !matched.route.allows(role) {
            self.handlers.on_unauthorized(self.view.as_ref(), &path, role);
            self.fail(NavigationError::Unauthorized { path, role });
            return false;
        }

        let from = self.lock_state().current_path.clone();
        let ctx = NavigationContext {
            path: &path,
            params: &matched.params,
            route: matched.route,
            role,
            from: from.as_deref(),
        };
        for middleware in &self.middlewares {
            if let MiddlewareDecision::Reject(reason) = middleware.before(&ctx).await {
                self.fail(NavigationError::Rejected {
                    path: path.clone(),
                    reason,
                });
                return false;
            }
        }

        let options = FetchOptions {
            use_cache: matched.route.cacheable,
            ..FetchOptions::default()
        };
        let payload = match self.data.fetch_data(&path, options).await {
            Ok(payload) => payload,
            Err(e) if e.is_retryable() => {
                warn!(path = %path, error = %e, "Navigation fetch failed, falling back to full page load");
                self.view.full_page_load(&path);
                self.fail(NavigationError::Fetch { path, source: e });
                return false;
            }
            Err(e) => {
                let error = NavigationError::Fetch { path, source: e };
                self.handlers.on_error(self.view.as_ref(), &error);
                self.fail(error);
                return false;
            }
        };

        let fragment = PageFragment::from_payload(&payload);
        let title = fragment
            .title
            .clone()
            .unwrap_or_else(|| matched.route.display_title().to_string());
        let description = fragment.description.clone().or_else(|| matched.route.description.clone());
        self.render(&path, &fragment, mode).await;

        {
            let mut state = self.lock_state();
            match mode {
                HistoryMode::Push => state.history.push(&path),
                HistoryMode::Back => {
                    state.history.go_back();
                }
                HistoryMode::Forward => {
                    state.history.go_forward();
                }
                HistoryMode::Replay => {}
            }
            state.current_path = Some(path.clone());
            state.current_params = matched.params.clone();
        }

        let full_title = format!("{} | {}", title, TITLE_SUFFIX);
        self.view.set_title(&full_title);
        if let Some(description) = description {
            self.view.set_meta_description(&description);
        }

        info!(path = %path, route = %matched.route.name, "Navigation complete");
        let _ = self.events.send(NavigationEvent::Completed {
            path,
            title: full_title,
        });
        true
    }

    /// Swap content with transitions and restore scroll
    async fn render(&self, path: &str, fragment: &PageFragment, mode: HistoryMode) {
        let leaving = self.lock_state().current_path.clone();
        if let Some(leaving) = leaving {
            let offset = self.view.scroll_offset();
            self.lock_state().scroll.insert(leaving, offset);
        }

        self.view.transition(Transition::Exit).await;
        self.view.replace_content(&fragment.html);
        self.view.transition(Transition::Enter).await;

        let offset = match mode {
            HistoryMode::Push => 0.0,
            _ => self.lock_state().scroll.get(path).copied().unwrap_or(0.0),
        };
        self.view.set_scroll_offset(offset);
    }

    /// Submit a form through the data manager.
    ///
    /// GET forms navigate to the action with the fields as the query string.
    /// Other methods send the fields as JSON; a JSON `redirect` in the reply
    /// navigates there, any other reply is rendered in place.
    pub async fn submit_form(&self, action: &str, method: Method, fields: Value) -> bool {
        let action = normalize_path(action);
        if method == Method::Get {
            return self.navigate(&with_query(&action, &fields), true).await;
        }

        let redirect = {
            let Some(_guard) = NavigatingGuard::acquire(&self.navigating) else {
                debug!(action = %action, "Navigation in progress, form submission ignored");
                return false;
            };

            let options = FetchOptions::request(RequestOptions::new(method).with_json(fields)).no_cache();
            match self.data.fetch_data(&action, options).await {
                Ok(Payload::Json(reply)) if reply.get("redirect").is_some_and(Value::is_string) => {
                    reply["redirect"].as_str().map(str::to_string)
                }
                Ok(payload) => {
                    let fragment = PageFragment::from_payload(&payload);
                    self.render(&action, &fragment, HistoryMode::Push).await;
                    {
                        let mut state = self.lock_state();
                        state.history.push(&action);
                        state.current_path = Some(action.clone());
                        state.current_params = RouteParams::new();
                    }
                    let title = format!("{} | {}", fragment.title.as_deref().unwrap_or("Submitted"), TITLE_SUFFIX);
                    self.view.set_title(&title);
                    let _ = self.events.send(NavigationEvent::Completed {
                        path: action,
                        title,
                    });
                    return true;
                }
                Err(FetchError::Queued { id }) => {
                    info!(action = %action, id, "Form submission queued for sync");
                    self.fail(NavigationError::Fetch {
                        path: action,
                        source: FetchError::Queued { id },
                    });
                    return false;
                }
                Err(e) => {
                    let error = NavigationError::Fetch {
                        path: action,
                        source: e,
                    };
                    self.handlers.on_error(self.view.as_ref(), &error);
                    self.fail(error);
                    return false;
                }
            }
        };

        match redirect {
            Some(target) => self.navigate(&target, true).await,
            None => false,
        }
    }

    fn fail(&self, error: NavigationError) {
        debug!(error = %error, "Navigation failed");
        let _ = self.events.send(NavigationEvent::Failed {
            path: error.path().unwrap_or_default().to_string(),
            reason: error.to_string(),
        });
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, RouterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Append form fields to a path as a query string
fn with_query(action: &str, fields: &Value) -> String {
    let Some(object) = fields.as_object().filter(|o| !o.is_empty()) else {
        return action.to_string();
    };
    let Ok(mut url) = Url::parse("http://localhost").and_then(|base| base.join(action)) else {
        return action.to_string();
    };
    {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in object {
            match value {
                Value::String(s) => pairs.append_pair(name, s),
                other => pairs.append_pair(name, &other.to_string()),
            };
        }
    }
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}
