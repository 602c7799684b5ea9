//! Client-side navigation.
//!
//! A `RouteTable` maps paths to screens with role restrictions. The
//! `Navigator` resolves a path, runs middlewares, fetches the fragment through
//! the `DataManager` and swaps it into a `ContentView`, keeping an in-memory
//! history with per-path scroll positions.

pub mod catalog;
pub mod error;
pub mod history;
pub mod links;
pub mod navigator;
pub mod route;
pub mod view;

pub use catalog::{breadcrumbs, default_routes, menu_items};
pub use error::{NavigationError, RouteError};
pub use history::History;
pub use links::{link_disposition, Link, LinkDisposition};
pub use navigator::{NavigationEvent, NavigationState, Navigator};
pub use route::{
    normalize_path, Breadcrumb, MenuItem, RouteDescriptor, RouteMatch, RouteParams, RoutePattern,
    RouteTable,
};
pub use view::{
    ContentView, DefaultHandlers, MiddlewareDecision, NavigationContext, NavigationHandlers,
    NavigationMiddleware, PageFragment, Transition,
};
