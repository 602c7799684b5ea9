//! Session state handed over by the hosted auth provider.
//!
//! Login itself happens elsewhere; this module only persists what the client
//! needs afterwards: the user's role (for route access) and the CSRF token
//! (sent on every request). Sessions are stored in the cache directory and
//! expire after 12 hours.

pub mod session;

pub use session::{Role, Session, SessionData};
