//! STMBudget client data layer.
//!
//! This crate provides the pieces that sit between the STMBudget screens and
//! the hosted backend:
//!
//! - `cache`: two-layer response cache (memory + optional JSON files on disk)
//! - `api`: HTTP transport, request executor with timeout/retry/backoff, and
//!   the durable offline queue for mutations issued while offline
//! - `data`: the `DataManager` that coalesces, caches and revalidates fetches
//! - `router`: route table, history and the `Navigator` that swaps page content
//! - `worker`: the offline/sync worker with its own lifecycle and message protocol
//! - `client`: the composition root that wires everything together
//!
//! Configuration and the saved session live in `config` and `auth`.

pub mod api;
pub mod auth;
pub mod cache;
pub mod client;
pub mod config;
pub mod data;
pub mod router;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{FetchError, Method, Payload, RequestExecutor, RequestOptions, Response, Transport};
pub use auth::{Role, Session, SessionData};
pub use cache::CacheStore;
pub use client::{Client, ClientEvent};
pub use config::Config;
pub use data::{DataManager, FetchOptions};
pub use router::{ContentView, Navigator, RouteDescriptor, RouteTable};
pub use worker::{OfflineWorker, WorkerHandle, WorkerMessage};
