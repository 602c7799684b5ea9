use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::Payload;

/// A cached payload with its creation time and time-to-live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: Payload,
    pub created_at: DateTime<Utc>,
    pub ttl_ms: u64,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, value: Payload, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            value,
            created_at: Utc::now(),
            ttl_ms: ttl.as_millis() as u64,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn age_at(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.created_at
    }

    /// An entry is valid while `now - created_at < ttl`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.age_at(now).num_milliseconds() < self.ttl_ms as i64
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Age as a fraction of the TTL. A zero TTL counts as fully aged.
    pub fn age_fraction(&self) -> f64 {
        if self.ttl_ms == 0 {
            return 1.0;
        }
        let age_ms = self.age_at(Utc::now()).num_milliseconds().max(0) as f64;
        age_ms / self.ttl_ms as f64
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_at(Utc::now()).num_minutes();
        if minutes < 1 {
            // Includes negative ages from clock skew
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}
