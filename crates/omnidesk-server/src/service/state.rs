//! Application state and dependency injection.

use std::sync::Arc;

use omnidesk_core::{MemoryStore, SecurityConfig, SecurityGateway, SecurityStore};
use omnidesk_nats::{NatsClient, NatsConfig, NatsSecurityStore};

/// Application state.
///
/// Used for the [`State`] extraction (dependency injection).
///
/// [`State`]: axum::extract::State
#[must_use = "state does nothing unless you use it"]
#[derive(Clone)]
pub struct ServiceState {
    gateway: Arc<SecurityGateway>,
}

impl ServiceState {
    /// Builds state over a custom store backend.
    pub fn with_store(config: SecurityConfig, store: Arc<dyn SecurityStore>) -> Self {
        Self {
            gateway: Arc::new(SecurityGateway::new(config, store)),
        }
    }

    /// Builds state over the in-memory store.
    ///
    /// Suitable for tests and single-node deployments; nothing is shared
    /// across processes.
    pub fn in_memory(config: SecurityConfig) -> Self {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    /// Connects to NATS and builds state over the shared KV bucket.
    pub async fn connect(
        config: SecurityConfig,
        nats_config: NatsConfig,
    ) -> omnidesk_nats::Result<Self> {
        let client = NatsClient::connect(nats_config).await?;
        let store = NatsSecurityStore::new(&client).await?;
        Ok(Self::with_store(config, Arc::new(store)))
    }

    /// The security gateway this state was built around.
    #[inline]
    pub fn gateway(&self) -> &Arc<SecurityGateway> {
        &self.gateway
    }
}

macro_rules! impl_di {
    ($($f:ident: $t:ty),+) => {$(
        impl axum::extract::FromRef<ServiceState> for $t {
            fn from_ref(state: &ServiceState) -> Self {
                state.$f.clone()
            }
        }
    )+};
}

impl_di!(gateway: Arc<SecurityGateway>);

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::extract::FromRef;
    use omnidesk_core::{SecurityConfig, SecurityGateway};

    use super::ServiceState;

    #[test]
    fn gateway_is_extractable_from_state() {
        let state = ServiceState::in_memory(SecurityConfig::new("state-test-secret"));
        let gateway = Arc::<SecurityGateway>::from_ref(&state);
        assert_eq!(gateway.config().secret_key, "state-test-secret");
    }
}
