//! Offline/sync worker.
//!
//! A separate task with its own lifecycle (install, activate) and caches. It
//! answers same-origin GETs with a per-path caching strategy, falls back to
//! synthetic offline responses, and replays the offline queue on `sync`.
//! Clients talk to it only through `WorkerHandle`.

pub mod handle;
pub mod messages;
pub mod push;
pub mod service;
pub mod storage;
pub mod strategy;

pub use handle::WorkerHandle;
pub use messages::{WorkerEvent, WorkerMessage, WorkerReply};
pub use push::{NotificationAction, PushNotification};
pub use service::{OfflineWorker, SyncReport, WorkerConfig, WorkerError, WorkerState};
pub use storage::CacheStorage;
pub use strategy::{select_strategy, Strategy};
