use launchpad_core::Platform;
use std::sync::Arc;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub platform: Arc<Platform>,
}

impl AppState {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform: Arc::new(platform),
        }
    }
}
