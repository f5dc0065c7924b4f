//! Application state.

use std::sync::Arc;
use std::time::Instant;
use tether_core::gateway::Gateway;
use tether_core::{Dispatcher, LifecycleContext, LifecycleManager, MappingStore};

use crate::config::Config;
use crate::services::SweeperService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: Arc<Config>,
    /// Mapping store
    pub store: Arc<dyn MappingStore>,
    /// Lifecycle state machine
    pub manager: Arc<LifecycleManager>,
    /// Notification dispatcher
    pub dispatcher: Dispatcher,
    /// Background reconciliation
    pub sweeper: Arc<SweeperService>,
    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: Config,
        store: Arc<dyn MappingStore>,
        gateway: Arc<dyn Gateway>,
    ) -> Arc<Self> {
        let ctx = LifecycleContext::new(Arc::clone(&store), gateway, config.lifecycle.clone());
        let manager = Arc::new(LifecycleManager::new(ctx));
        Arc::new(Self {
            config: Arc::new(config),
            store,
            dispatcher: Dispatcher::new(Arc::clone(&manager)),
            sweeper: Arc::new(SweeperService::new(Arc::clone(&manager))),
            manager,
            start_time: Instant::now(),
        })
    }
}
