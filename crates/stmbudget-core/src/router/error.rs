use thiserror::Error;

use crate::api::FetchError;
use crate::auth::Role;

/// Problems registering a route
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("Invalid route pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Route pattern '{pattern}' has the same shape as '{existing}'")]
    Ambiguous { pattern: String, existing: String },
}

/// Why a navigation did not complete. Delivered to `NavigationHandlers`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NavigationError {
    #[error("No route matches {path}")]
    NotFound { path: String },

    #[error("Role {role:?} may not open {path}")]
    Unauthorized { path: String, role: Option<Role> },

    #[error("Navigation to {path} rejected: {reason}")]
    Rejected { path: String, reason: String },

    #[error("Failed to load {path}: {source}")]
    Fetch { path: String, source: FetchError },

    #[error("A navigation is already in progress")]
    Busy,
}

impl NavigationError {
    pub fn path(&self) -> Option<&str> {
        match self {
            NavigationError::NotFound { path }
            | NavigationError::Unauthorized { path, .. }
            | NavigationError::Rejected { path, .. }
            | NavigationError::Fetch { path, .. } => Some(path),
            NavigationError::Busy => None,
        }
    }
}
