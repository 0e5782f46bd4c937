//! One-time coordinator initialization
//!
//! Request handlers share one [`Coordinator`] per process. `AuthzRuntime`
//! builds it on first use; concurrent and later calls get the same instance.
//! A failed build leaves the runtime empty so a later call can retry.

use crate::client::AuthClient;
use crate::config::AuthzConfig;
use crate::coordinator::Coordinator;
use crate::error::Result;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

#[derive(Default)]
pub struct AuthzRuntime {
    coordinator: OnceCell<Arc<Coordinator>>,
}

impl AuthzRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the coordinator from `config` unless one already exists
    pub async fn init(&self, config: &AuthzConfig) -> Result<Arc<Coordinator>> {
        self.init_with(|| Coordinator::from_config(config)).await
    }

    /// Build the coordinator with `build` unless one already exists
    pub async fn init_with<F, Fut>(&self, build: F) -> Result<Arc<Coordinator>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Coordinator>>,
    {
        let coordinator = self
            .coordinator
            .get_or_try_init(|| async move { build().await.map(Arc::new) })
            .await?;

        debug!("AuthzRuntime coordinator handed out");
        Ok(Arc::clone(coordinator))
    }

    /// The coordinator, if initialization has completed
    pub fn get(&self) -> Option<Arc<Coordinator>> {
        self.coordinator.get().cloned()
    }

    /// A read-only client over the coordinator's cache, once initialized
    pub fn client(&self) -> Option<AuthClient> {
        self.coordinator
            .get()
            .map(|coordinator| AuthClient::from_coordinator(coordinator))
    }
}
