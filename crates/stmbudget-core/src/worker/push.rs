use serde::{Deserialize, Serialize};
use serde_json::Value;

const DEFAULT_TITLE: &str = "STMBudget";
const DEFAULT_BODY: &str = "You have a new notification";
const DEFAULT_TAG: &str = "stmbudget-notification";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// A push message ready to display
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushNotification {
    pub title: String,
    pub body: String,
    pub data: Value,
    pub actions: Vec<NotificationAction>,
    pub tag: String,
}

impl Default for PushNotification {
    fn default() -> Self {
        Self {
            title: DEFAULT_TITLE.to_string(),
            body: DEFAULT_BODY.to_string(),
            data: Value::Null,
            actions: Vec::new(),
            tag: DEFAULT_TAG.to_string(),
        }
    }
}

impl PushNotification {
    /// Parse a push payload. Missing fields take defaults; a payload that is
    /// not a JSON object becomes the notification body.
    pub fn parse(payload: Option<&str>) -> Self {
        let Some(text) = payload.map(str::trim).filter(|t| !t.is_empty()) else {
            return Self::default();
        };
        match serde_json::from_str::<Value>(text) {
            Ok(value @ Value::Object(_)) => serde_json::from_value(value).unwrap_or_default(),
            _ => Self {
                body: text.to_string(),
                ..Self::default()
            },
        }
    }

    /// URL to open when the notification is clicked
    pub fn target_url(&self) -> &str {
        self.data
            .get("url")
            .and_then(Value::as_str)
            .unwrap_or("/dashboard/")
    }
}
