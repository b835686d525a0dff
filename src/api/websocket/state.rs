//! Gateway application state

use std::sync::Arc;

use super::hub::ConnectionHub;
use super::router::BroadcastRouter;
use crate::api::auth::HandshakeVerifier;
use crate::config::ServerConfig;
use crate::registry::SessionRegistry;

/// Shared state for gateway connections
pub struct AppState {
    /// Fan-out of client events
    pub router: BroadcastRouter,

    /// Handshake credential checks
    pub verifier: HandshakeVerifier,

    pub config: ServerConfig,
}

impl AppState {
    /// Build state around an explicitly owned registry
    pub fn new(registry: Arc<SessionRegistry>, config: ServerConfig) -> Self {
        let verifier = HandshakeVerifier::from_secret(config.jwt_secret.as_deref());
        Self {
            router: BroadcastRouter::new(registry, Arc::new(ConnectionHub::new())),
            verifier,
            config,
        }
    }

    /// Fresh registry, default configuration
    pub fn with_defaults() -> Self {
        Self::new(Arc::new(SessionRegistry::new()), ServerConfig::default())
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.router.registry()
    }
}
