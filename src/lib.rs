//! Listing Tracker Library
//!
//! Signed-in users register property listing URLs and follow their status.
//! This module exports the core types and functions for testing and reuse.

pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod routes;
pub mod session;
pub mod store;
pub mod tracking;
pub mod views;

pub use config::Config;
pub use error::{AppError, Result};
pub use routes::router;
pub use session::SessionBridge;
pub use store::{MemoryStore, SessionStore, SupabaseStore};

use std::sync::Arc;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SessionStore>,
    pub bridge: SessionBridge,
    pub config: Config,
}

impl AppState {
    /// Create a new AppState over the given store and configuration
    pub fn new(store: Arc<dyn SessionStore>, config: Config) -> Self {
        let bridge = SessionBridge::new(store.clone(), &config);
        Self {
            store,
            bridge,
            config,
        }
    }
}
