/// How the worker answers a same-origin GET
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Try the network, fall back to cache
    NetworkFirst,
    /// Serve from cache, go to the network on a miss
    CacheFirst,
    /// Serve from cache and refresh it in the background
    StaleWhileRevalidate,
}

const NETWORK_FIRST_PREFIXES: &[&str] = &["/api/", "/admin/"];

const ASSET_EXTENSIONS: &[&str] = &[
    "css", "js", "mjs", "png", "jpg", "jpeg", "gif", "svg", "ico", "webp", "woff", "woff2", "ttf",
    "eot", "map",
];

pub fn select_strategy(path: &str) -> Strategy {
    if NETWORK_FIRST_PREFIXES.iter().any(|p| path.starts_with(p)) {
        Strategy::NetworkFirst
    } else if path.starts_with("/static/") || has_asset_extension(path) {
        Strategy::CacheFirst
    } else {
        Strategy::StaleWhileRevalidate
    }
}

pub fn has_asset_extension(path: &str) -> bool {
    let last = path.rsplit('/').next().unwrap_or_default();
    match last.rsplit_once('.') {
        Some((_, ext)) => ASSET_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => false,
    }
}
