//! Shared application state for the supervisor server.

use std::sync::Arc;

use nautilus::io::config::NautilusConfig;
use nautilus::supervisor::Supervisor;

/// Shared state accessible from all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<Supervisor>,
}

impl AppState {
    pub fn new(config: NautilusConfig) -> Self {
        Self {
            supervisor: Arc::new(Supervisor::new(config)),
        }
    }

    pub fn config(&self) -> &NautilusConfig {
        self.supervisor.config()
    }
}
