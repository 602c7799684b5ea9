use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

/// Session lifetime in hours.
/// Matches the backend's session cookie age.
const SESSION_EXPIRY_HOURS: i64 = 12;

/// STMBudget user roles. Route access is keyed off these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Manager,
    Salesman,
    SupplyChain,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Manager => "manager",
            Role::Salesman => "salesman",
            Role::SupplyChain => "supply_chain",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "manager" => Some(Role::Manager),
            "salesman" => Some(Role::Salesman),
            "supply_chain" | "supply-chain" => Some(Role::SupplyChain),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionData {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
    pub csrf_token: String,
    pub created_at: DateTime<Utc>,
}

impl SessionData {
    pub fn is_expired(&self) -> bool {
        let expiry = self.created_at + Duration::hours(SESSION_EXPIRY_HOURS);
        Utc::now() > expiry
    }
}

pub struct Session {
    cache_dir: PathBuf,
    pub data: Option<SessionData>,
}

impl Session {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            data: None,
        }
    }

    /// Load session from disk. Expired sessions are ignored.
    pub fn load(&mut self) -> Result<bool> {
        let path = self.session_path();
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .context("Failed to read session file")?;
            let data: SessionData = serde_json::from_str(&contents)
                .context("Failed to parse session file")?;

            if !data.is_expired() {
                self.data = Some(data);
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Save session to disk
    pub fn save(&self) -> Result<()> {
        if let Some(ref data) = self.data {
            let path = self.session_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let contents = serde_json::to_string_pretty(data)?;
            std::fs::write(path, contents)?;
        }
        Ok(())
    }

    /// Clear session data
    pub fn clear(&mut self) -> Result<()> {
        self.data = None;
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn update(&mut self, data: SessionData) {
        self.data = Some(data);
    }

    pub fn role(&self) -> Option<Role> {
        self.valid().map(|d| d.role)
    }

    pub fn csrf_token(&self) -> Option<&str> {
        self.valid().map(|d| d.csrf_token.as_str())
    }

    /// Check if session is valid (exists and not expired)
    pub fn is_valid(&self) -> bool {
        self.valid().is_some()
    }

    fn valid(&self) -> Option<&SessionData> {
        self.data.as_ref().filter(|d| !d.is_expired())
    }

    fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn data(role: Role) -> SessionData {
        SessionData {
            user_id: 7,
            username: "demo_user".into(),
            role,
            csrf_token: "csrf-abc".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_role_round_trip_names() {
        assert_eq!(Role::parse("supply_chain"), Some(Role::SupplyChain));
        assert_eq!(Role::parse(" Manager "), Some(Role::Manager));
        assert_eq!(Role::parse("auditor"), None);
        assert_eq!(
            serde_json::to_string(&Role::SupplyChain).unwrap(),
            "\"supply_chain\""
        );
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().expect("tempdir");
        let mut session = Session::new(dir.path().to_path_buf());
        session.update(data(Role::Salesman));
        session.save().unwrap();

        let mut loaded = Session::new(dir.path().to_path_buf());
        assert!(loaded.load().unwrap());
        assert_eq!(loaded.role(), Some(Role::Salesman));
        assert_eq!(loaded.csrf_token(), Some("csrf-abc"));

        loaded.clear().unwrap();
        assert!(!loaded.is_valid());
        assert!(!Session::new(dir.path().to_path_buf()).load().unwrap());
    }

    #[test]
    fn test_expired_session_has_no_role() {
        let mut old = data(Role::Admin);
        old.created_at = Utc::now() - Duration::hours(SESSION_EXPIRY_HOURS + 1);
        assert!(old.is_expired());

        let mut session = Session::new(PathBuf::from("."));
        session.update(old);
        assert_eq!(session.role(), None);
    }
}
