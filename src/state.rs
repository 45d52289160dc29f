use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::services::ai::LlmProvider;
use crate::services::backend::BackendApi;
use crate::services::sessions::SessionLocks;

pub struct AppState {
    pub db: Arc<Mutex<Connection>>,
    pub config: AppConfig,
    pub llm: Box<dyn LlmProvider>,
    pub backend: Box<dyn BackendApi>,
    pub sessions: SessionLocks,
}

impl AppState {
    /// Locks the connection. A poisoned lock is recovered; the connection
    /// itself stays usable after a panicked holder.
    pub fn db(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(|e| e.into_inner())
    }
}
