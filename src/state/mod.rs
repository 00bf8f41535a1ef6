use std::sync::Arc;

use crate::config::ServerConfig;
use crate::core::providers::ProviderFactory;

/// Application state that can be shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: ServerConfig,
    /// Builds the provider collaborators for each new voice session
    pub factory: Arc<dyn ProviderFactory>,
}

impl AppState {
    pub fn new(config: ServerConfig, factory: Arc<dyn ProviderFactory>) -> Arc<Self> {
        Arc::new(Self { config, factory })
    }
}
