//! Policy engine handles
//!
//! A handle adapts one instance of the external policy engine, bound to one
//! backing store, to the operations the coordinator needs. Identifiers passed
//! through a handle are engine-level (already namespaced).
//!
//! Handles propagate every store failure and never retry; repair is the
//! coordinator's job.

pub mod enforcer;
pub mod model;

pub use enforcer::CasbinHandle;
pub use model::{model_from_file, rbac_model, RBAC_MODEL};

use crate::config::{ModelSection, StoreConfig};
use crate::error::Result;
use crate::types::{PolicyGrant, RoleAssignment};
use async_trait::async_trait;
use casbin::MemoryAdapter;
use std::sync::Arc;
use tracing::debug;

/// Counts of what [`PolicyHandle::clear_all`] removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearSummary {
    pub assignments: usize,
    pub grants: usize,
}

/// Operation contract shared by the durable and the cache store
#[async_trait]
pub trait PolicyHandle: Send + Sync {
    /// Short label used in logs ("durable", "cache")
    fn label(&self) -> &str;

    /// Add role assignments; already-present ones are skipped
    async fn assign(&self, assignments: &[RoleAssignment]) -> Result<()>;

    /// Remove role assignments; absent ones are skipped
    async fn unassign(&self, assignments: &[RoleAssignment]) -> Result<()>;

    /// Direct roles of a user
    async fn roles_of(&self, user: &str) -> Result<Vec<String>>;

    /// Direct users of a role
    async fn users_of(&self, role: &str) -> Result<Vec<String>>;

    /// Every role that appears in an assignment
    async fn all_roles(&self) -> Result<Vec<String>>;

    /// Add policy grants; already-present ones are skipped
    async fn grant(&self, grants: &[PolicyGrant]) -> Result<()>;

    /// Remove policy grants; absent ones are skipped
    async fn revoke(&self, grants: &[PolicyGrant]) -> Result<()>;

    /// Grants whose subject is `role`
    async fn policies_for(&self, role: &str) -> Result<Vec<PolicyGrant>>;

    /// Every grant in the store
    async fn all_grants(&self) -> Result<Vec<PolicyGrant>>;

    /// Engine decision for (user, object, action)
    async fn enforce(&self, user: &str, object: &str, action: &str) -> Result<bool>;

    /// Reload the in-memory view from the backing store
    async fn load_all(&self) -> Result<()>;

    /// Remove every role assignment (role by role, user by user), then every
    /// grant in one bulk call.
    async fn clear_all(&self) -> Result<ClearSummary> {
        let mut summary = ClearSummary::default();

        for role in self.all_roles().await? {
            let assignments: Vec<RoleAssignment> = self
                .users_of(&role)
                .await?
                .into_iter()
                .map(|user| RoleAssignment::new(user, role.clone()))
                .collect();

            for assignment in &assignments {
                self.unassign(std::slice::from_ref(assignment)).await?;
            }
            summary.assignments += assignments.len();
        }

        let grants = self.all_grants().await?;
        if !grants.is_empty() {
            self.revoke(&grants).await?;
        }
        summary.grants = grants.len();

        debug!(
            "{} store cleared: {} assignments, {} grants",
            self.label(),
            summary.assignments,
            summary.grants
        );

        Ok(summary)
    }
}

/// Open the handle described by a store section
pub async fn open(
    label: &str,
    store: &StoreConfig,
    model: &ModelSection,
) -> Result<Arc<dyn PolicyHandle>> {
    let model = model.load().await?;

    match store {
        StoreConfig::Memory => Ok(Arc::new(
            CasbinHandle::new(label, model, MemoryAdapter::default()).await?,
        )),
        #[cfg(feature = "postgres")]
        StoreConfig::Postgres { url, pool_size } => Ok(Arc::new(
            CasbinHandle::postgres(label, model, url, *pool_size).await?,
        )),
        #[cfg(not(feature = "postgres"))]
        StoreConfig::Postgres { .. } => Err(crate::error::AuthzError::Config(format!(
            "{} store requires the 'postgres' feature",
            label
        ))),
    }
}
