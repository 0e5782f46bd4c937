//! Read-only client over the cache store
//!
//! For callers that only check permissions. The cache is kept populated by
//! whoever owns the [`Coordinator`]; a client never writes, never falls back
//! to durable and never resyncs, so store errors are returned as-is.
//!
//! In-process clients share the coordinator's cache handle
//! ([`AuthClient::from_coordinator`]). Clients in other processes need a
//! cache backend that lives outside any one process, and must [`reload`]
//! to pick up changes made since they opened it.
//!
//! [`reload`]: AuthClient::reload

use crate::config::{AuthzConfig, StoreConfig};
use crate::coordinator::Coordinator;
use crate::error::{AuthzError, Result};
use crate::handle::{self, PolicyHandle};
use crate::namespace::{IdClass, Namespace};
use crate::types::{ObjectName, RoleName};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info};

pub struct AuthClient {
    namespace: Namespace,
    cache: Arc<dyn PolicyHandle>,
}

impl AuthClient {
    pub fn new(namespace: Namespace, cache: Arc<dyn PolicyHandle>) -> Self {
        Self { namespace, cache }
    }

    /// Read through the cache handle `coordinator` replicates into
    pub fn from_coordinator(coordinator: &Coordinator) -> Self {
        Self::new(coordinator.namespace().clone(), coordinator.cache_handle())
    }

    /// Open only the `[cache]` store of `config`.
    ///
    /// An in-memory cache is private to the process that opened it, so a
    /// fresh one would never see a coordinator's writes; it is rejected.
    pub async fn from_config(config: &AuthzConfig) -> Result<Self> {
        config.validate()?;

        if config.cache == StoreConfig::Memory {
            return Err(AuthzError::Config(
                "an in-memory cache cannot be shared with a client; use \
                 AuthClient::from_coordinator or a shared cache backend"
                    .to_string(),
            ));
        }

        let namespace = config.namespace.build()?;

        let cache = handle::open("cache", &config.cache, &config.model)
            .await
            .map_err(|e| AuthzError::init("cache", e))?;

        info!("AuthClient ready over {} store", cache.label());
        Ok(Self::new(namespace, cache))
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Reload the cache view from its backing store
    pub async fn reload(&self) -> Result<()> {
        self.cache.load_all().await
    }

    pub async fn roles_for_user(&self, user: &str) -> Result<Vec<RoleName>> {
        self.namespace.check(IdClass::User, user)?;

        let roles = self.cache.roles_of(&self.namespace.to_subject(user)).await?;
        Ok(roles.iter().map(|role| self.namespace.from_role(role)).collect())
    }

    pub async fn policies_for_role(&self, role: &str) -> Result<Vec<ObjectName>> {
        self.namespace.check(IdClass::Role, role)?;

        let grants = self.cache.policies_for(&self.namespace.to_role(role)).await?;
        Ok(self.namespace.granted_objects(grants))
    }

    pub async fn policies_for_user(&self, user: &str) -> Result<Vec<ObjectName>> {
        let mut seen = HashSet::new();
        let mut objects = Vec::new();

        for role in self.roles_for_user(user).await? {
            for object in self.policies_for_role(&role).await? {
                if seen.insert(object.clone()) {
                    objects.push(object);
                }
            }
        }

        Ok(objects)
    }

    pub async fn enforce(&self, user: &str, object: &str) -> Result<bool> {
        self.namespace.check(IdClass::User, user)?;
        self.namespace.check(IdClass::Object, object)?;

        let subject = self.namespace.to_subject(user);
        let object = self.namespace.to_object(object);
        let allowed = self
            .cache
            .enforce(&subject, &object, self.namespace.action())
            .await?;

        debug!(subject = %subject, object = %object, allowed, "client enforce");
        Ok(allowed)
    }
}
