use std::sync::Mutex;

use async_trait::async_trait;
use stmbudget_core::router::Transition;
use stmbudget_core::ContentView;
use tracing::debug;

/// Keeps the last rendered page so the CLI can print it
#[derive(Default)]
pub struct TerminalView {
    content: Mutex<String>,
    title: Mutex<String>,
    scroll: Mutex<f64>,
}

impl TerminalView {
    pub fn content(&self) -> String {
        self.content.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn title(&self) -> String {
        self.title.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ContentView for TerminalView {
    async fn transition(&self, transition: Transition) {
        debug!(?transition, "Page transition");
    }

    fn replace_content(&self, html: &str) {
        *self.content.lock().unwrap_or_else(|e| e.into_inner()) = html.to_string();
    }

    fn scroll_offset(&self) -> f64 {
        *self.scroll.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_scroll_offset(&self, offset: f64) {
        *self.scroll.lock().unwrap_or_else(|e| e.into_inner()) = offset;
    }

    fn set_title(&self, title: &str) {
        *self.title.lock().unwrap_or_else(|e| e.into_inner()) = title.to_string();
    }

    fn set_meta_description(&self, description: &str) {
        debug!(description, "Meta description");
    }

    fn full_page_load(&self, path: &str) {
        eprintln!("Could not load {} in place; open it in a browser instead.", path);
    }
}
