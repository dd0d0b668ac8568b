//! Session Bridge
//!
//! Resolves the session carried in cookies at the boundary of every request
//! and owns the `sb-` cookie namespace: reading, refreshing, writing and
//! clearing auth cookies all happen here and nowhere else.

pub mod bridge;
pub mod cookies;
pub mod middleware;
pub mod pkce;

pub use bridge::{ResolvedSession, SessionBridge};
pub use cookies::{CookieJar, SetCookie};
pub use middleware::{session_middleware, CurrentSession, RequireSession};
