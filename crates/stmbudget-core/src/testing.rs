//! Fakes shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::api::{FetchError, Method, RequestOptions, Response, Transport};
use crate::router::{ContentView, Transition};

/// Transport that replays scripted results per URL.
///
/// URLs without a script (or whose script ran out) answer 200 with a small
/// HTML fragment naming the URL.
#[derive(Default)]
pub(crate) struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Result<Response, FetchError>>>>,
    calls: Mutex<Vec<(String, Method, Instant)>>,
    delay: Mutex<Duration>,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&self, url: &str, result: Result<Response, FetchError>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(result);
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    pub(crate) fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|(u, _, _)| u == url).count()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn call_times(&self, url: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _, _)| u == url)
            .map(|(_, _, t)| *t)
            .collect()
    }

    pub(crate) fn methods_for(&self, url: &str) -> Vec<Method> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _, _)| u == url)
            .map(|(_, m, _)| *m)
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, url: &str, options: &RequestOptions) -> Result<Response, FetchError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), options.method, Instant::now()));

        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front);
        scripted.unwrap_or_else(|| Ok(Response::html(200, format!("<main>{}</main>", url))))
    }
}

/// View that records every operation the navigator performs on it.
#[derive(Default)]
pub(crate) struct RecordingView {
    pub(crate) ops: Mutex<Vec<String>>,
    pub(crate) content: Mutex<String>,
    pub(crate) title: Mutex<String>,
    pub(crate) scroll: Mutex<f64>,
}

impl RecordingView {
    pub(crate) fn ops(&self) -> Vec<String> {
        self.ops.lock().unwrap().clone()
    }

    pub(crate) fn content(&self) -> String {
        self.content.lock().unwrap().clone()
    }

    pub(crate) fn title(&self) -> String {
        self.title.lock().unwrap().clone()
    }
}

#[async_trait]
impl ContentView for RecordingView {
    async fn transition(&self, transition: Transition) {
        self.ops.lock().unwrap().push(format!("{:?}", transition));
    }

    fn replace_content(&self, html: &str) {
        self.ops.lock().unwrap().push("replace".into());
        *self.content.lock().unwrap() = html.to_string();
    }

    fn scroll_offset(&self) -> f64 {
        *self.scroll.lock().unwrap()
    }

    fn set_scroll_offset(&self, offset: f64) {
        *self.scroll.lock().unwrap() = offset;
    }

    fn set_title(&self, title: &str) {
        *self.title.lock().unwrap() = title.to_string();
    }

    fn set_meta_description(&self, _description: &str) {}

    fn full_page_load(&self, path: &str) {
        self.ops.lock().unwrap().push(format!("full_page_load {}", path));
    }
}
