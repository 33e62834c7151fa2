use std::sync::Arc;

use crate::config::InferenceConfiguration;
use crate::logs::LogFileManager;

/// Shared state of one serving unit deployment
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<InferenceConfiguration>,
    pub logs: LogFileManager,
}

impl AppState {
    pub fn new(config: InferenceConfiguration, logs: LogFileManager) -> Self {
        Self {
            config: Arc::new(config),
            logs,
        }
    }

    pub fn logging_endpoints_enabled(&self) -> bool {
        self.config.creates_logging_endpoints()
    }
}
