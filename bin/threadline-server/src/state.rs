//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use crate::config::Config;
use crate::entities::SqliteStore;
use crate::registry::ThreadRegistry;
use crate::session::SessionController;

/// State shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Persistent checkpoint store.
    pub store: Arc<SqliteStore>,
    /// Listed threads and their titles.
    pub registry: Arc<ThreadRegistry>,
    /// The single active session.
    pub session: Arc<SessionController>,
}
