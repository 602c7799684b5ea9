//! Data access for screens: cached, coalesced and batched fetches.

pub mod batch;
pub mod key;
pub mod manager;

pub use batch::{BatchRequest, Priority};
pub use key::{cache_key, url_origin, url_path};
pub use manager::{DataManager, DataManagerConfig, FetchOptions, DEFAULT_TTL};
