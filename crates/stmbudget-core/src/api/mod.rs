//! Network layer for the STMBudget backend.
//!
//! This module provides the `HttpTransport` that talks to the same-origin
//! Django/hosted endpoints, the `RequestExecutor` that wraps every call in a
//! timeout with exponential backoff, and the `OfflineQueue` where mutating
//! requests land when the client is offline.
//!
//! Requests carry the CSRF token header and the `X-Requested-With` marker the
//! backend uses to tell fragment requests apart from full page loads.

pub mod client;
pub mod error;
pub mod executor;
pub mod queue;
pub mod request;
pub mod status;
pub mod transport;

pub use client::HttpTransport;
pub use error::FetchError;
pub use executor::{Backoff, RequestExecutor};
pub use queue::{OfflineQueue, OfflineQueueItem};
pub use request::{Method, Payload, RequestOptions, Response};
pub use status::NetworkStatus;
pub use transport::Transport;
