//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::Config;
use crate::gateway::Gateways;
use crate::services::checkout::CheckoutService;
use crate::services::reconcile::Reconciler;
use crate::store::CommerceStore;

/// Application state shared across all handlers.
///
/// Cheaply cloneable via `Arc`; provides access to the store, the gateway
/// clients, and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    store: Arc<dyn CommerceStore>,
    gateways: Gateways,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(config: Config, store: Arc<dyn CommerceStore>, gateways: Gateways) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                config,
                store,
                gateways,
            }),
        }
    }

    /// Get a reference to the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get a reference to the commerce store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn CommerceStore> {
        &self.inner.store
    }

    /// Get a reference to the gateway clients.
    #[must_use]
    pub fn gateways(&self) -> &Gateways {
        &self.inner.gateways
    }

    /// Build a checkout service over this state's store and gateways.
    #[must_use]
    pub fn checkout(&self) -> CheckoutService {
        CheckoutService::new(Arc::clone(&self.inner.store), self.inner.gateways.clone())
    }

    /// Build a reconciliation engine over this state's store and gateways.
    #[must_use]
    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(Arc::clone(&self.inner.store), self.inner.gateways.clone())
    }
}
