/// In-memory session history: a list of paths and a cursor.
///
/// Pushing drops any forward entries, like a browser.
#[derive(Debug, Clone, Default)]
pub struct History {
    entries: Vec<String>,
    index: Option<usize>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, path: &str) {
        let next = self.index.map_or(0, |i| i + 1);
        self.entries.truncate(next);
        self.entries.push(path.to_string());
        self.index = Some(next);
    }

    pub fn current(&self) -> Option<&str> {
        self.index.map(|i| self.entries[i].as_str())
    }

    pub fn peek_back(&self) -> Option<&str> {
        let i = self.index?.checked_sub(1)?;
        Some(self.entries[i].as_str())
    }

    pub fn peek_forward(&self) -> Option<&str> {
        let i = self.index? + 1;
        self.entries.get(i).map(String::as_str)
    }

    pub fn go_back(&mut self) -> Option<&str> {
        let i = self.index?.checked_sub(1)?;
        self.index = Some(i);
        Some(self.entries[i].as_str())
    }

    pub fn go_forward(&mut self) -> Option<&str> {
        let i = self.index? + 1;
        if i >= self.entries.len() {
            return None;
        }
        self.index = Some(i);
        Some(self.entries[i].as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_back_forward() {
        let mut history = History::new();
        assert_eq!(history.peek_back(), None);

        history.push("/a");
        history.push("/b");
        history.push("/c");
        assert_eq!(history.current(), Some("/c"));

        assert_eq!(history.go_back(), Some("/b"));
        assert_eq!(history.go_back(), Some("/a"));
        assert_eq!(history.go_back(), None);
        assert_eq!(history.current(), Some("/a"));

        assert_eq!(history.peek_forward(), Some("/b"));
        assert_eq!(history.go_forward(), Some("/b"));
    }

    #[test]
    fn test_push_truncates_forward_entries() {
        let mut history = History::new();
        history.push("/a");
        history.push("/b");
        history.go_back();
        history.push("/c");
        assert_eq!(history.entries(), ["/a", "/c"]);
        assert_eq!(history.peek_forward(), None);
    }
}
