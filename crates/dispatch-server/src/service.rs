//! DispatchService: the transport's connection handler.
//!
//! Owns the shared registry and configuration and hands each accepted
//! connection its own [`Dispatcher`].

use std::sync::Arc;

use dispatch_transport::{ConnectionHandler, Session};
use tracing::debug;

use crate::config::DispatchConfig;
use crate::dispatcher::Dispatcher;
use crate::registry::DispatchRegistry;

pub struct DispatchService {
    registry: Arc<DispatchRegistry>,
    config: Arc<DispatchConfig>,
}

impl DispatchService {
    pub fn new(config: DispatchConfig) -> Self {
        Self::with_registry(Arc::new(DispatchRegistry::new()), config)
    }

    /// Build a service over an existing registry.
    pub fn with_registry(registry: Arc<DispatchRegistry>, config: DispatchConfig) -> Self {
        Self {
            registry,
            config: Arc::new(config),
        }
    }

    pub fn registry(&self) -> &Arc<DispatchRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }
}

impl Default for DispatchService {
    fn default() -> Self {
        Self::new(DispatchConfig::default())
    }
}

impl ConnectionHandler for DispatchService {
    type Dispatch = Dispatcher;

    fn open(&self, session: Arc<Session>) -> Dispatcher {
        debug!("Opening dispatcher for {}", session.id());
        Dispatcher::new(self.registry.clone(), session, self.config.clone())
    }
}
