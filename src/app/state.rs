//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::game::{EventProcessor, Registry};
use crate::store::NameProvider;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub processor: Arc<EventProcessor>,
}

impl AppState {
    pub fn new(config: Config, names: NameProvider) -> Self {
        let config = Arc::new(config);

        // One registry backs both the reliable and the transform channel
        let registry = Arc::new(Registry::new(config.room_codes.clone()));
        let processor = Arc::new(EventProcessor::new(registry, Arc::new(names)));

        Self { config, processor }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        self.processor.registry()
    }
}
