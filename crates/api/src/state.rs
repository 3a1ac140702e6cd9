use std::sync::Arc;

use keepdate_notify::{Dispatcher, Reconciler};

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone: everything is behind an `Arc` or is a pool handle.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: keepdate_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Keeps the pending queue in step with event and preference edits.
    pub reconciler: Arc<Reconciler>,
    /// Drives due reminders; also used for on-demand processing.
    pub dispatcher: Arc<Dispatcher>,
}
