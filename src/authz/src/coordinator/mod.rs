//! Dual-store coordinator
//!
//! Owns the durable (source of truth) and cache handles and keeps them in
//! step:
//!
//! ```text
//! write ──▶ durable ──▶ cache            read/enforce ──▶ cache
//!              │ err       │ err                            │ err
//!              ▼           ▼                                ▼
//!        resync + fail   resync                     durable + resync
//! ```
//!
//! The durable-then-cache order inside one write is the only ordering
//! guarantee. No lock is held across the two applications, so concurrent
//! writers to the same key may leave the cache briefly behind; the next
//! resync closes that window.

pub mod metrics;
mod resync;

pub use metrics::{MetricsCollector, SyncMetrics};

use crate::config::{AuthzConfig, ConsistencyOptions, StoreConfig};
use crate::error::{AuthzError, Result};
use crate::handle::{self, PolicyHandle};
use crate::namespace::{IdClass, Namespace};
use crate::types::{ObjectName, PolicyGrant, ResyncReport, RoleAssignment, RoleName};
use futures::future::try_join_all;
use resync::{ResyncGuard, ResyncTicket};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Mutation replicated to both stores
#[derive(Debug, Clone)]
enum WriteOp {
    Assign(Vec<RoleAssignment>),
    Unassign(Vec<RoleAssignment>),
    Grant(Vec<PolicyGrant>),
    Revoke(Vec<PolicyGrant>),
}

impl WriteOp {
    fn name(&self) -> &'static str {
        match self {
            WriteOp::Assign(_) => "add_roles_for_user",
            WriteOp::Unassign(_) => "delete_roles_for_user",
            WriteOp::Grant(_) => "add_policies_for_role",
            WriteOp::Revoke(_) => "delete_policies_for_role",
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            WriteOp::Assign(a) | WriteOp::Unassign(a) => a.is_empty(),
            WriteOp::Grant(g) | WriteOp::Revoke(g) => g.is_empty(),
        }
    }

    async fn apply(&self, handle: &dyn PolicyHandle) -> Result<()> {
        match self {
            WriteOp::Assign(assignments) => handle.assign(assignments).await,
            WriteOp::Unassign(assignments) => handle.unassign(assignments).await,
            WriteOp::Grant(grants) => handle.grant(grants).await,
            WriteOp::Revoke(grants) => handle.revoke(grants).await,
        }
    }
}

/// Authoritative entry point for writes, reads and enforcement
pub struct Coordinator {
    /// Source of truth
    durable: Arc<dyn PolicyHandle>,

    /// Disposable low-latency mirror
    cache: Arc<dyn PolicyHandle>,

    namespace: Namespace,
    options: ConsistencyOptions,
    resync_guard: ResyncGuard,
    metrics: Arc<MetricsCollector>,
}

impl Coordinator {
    /// Assemble a coordinator over two ready handles without touching either
    pub fn new(
        namespace: Namespace,
        durable: Arc<dyn PolicyHandle>,
        cache: Arc<dyn PolicyHandle>,
        options: ConsistencyOptions,
    ) -> Self {
        Self {
            durable,
            cache,
            namespace,
            options,
            resync_guard: ResyncGuard::default(),
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    /// Assemble a coordinator and, when `resync_on_startup` is set, rebuild
    /// the cache from durable before returning it.
    pub async fn start(
        namespace: Namespace,
        durable: Arc<dyn PolicyHandle>,
        cache: Arc<dyn PolicyHandle>,
        options: ConsistencyOptions,
    ) -> Result<Self> {
        let coordinator = Self::new(namespace, durable, cache, options);

        if options.resync_on_startup {
            coordinator.resync().await.map_err(|e| {
                let store = match &e {
                    AuthzError::Resync { stage, .. } => resync::store_of_stage(stage),
                    _ => "cache",
                };
                AuthzError::init(store, e)
            })?;
        }

        info!(
            "Coordinator started (durable={}, cache={}, enforce_resync={}, coalesce={})",
            coordinator.durable.label(),
            coordinator.cache.label(),
            options.resync_on_enforce_fallback,
            options.coalesce_resync
        );

        Ok(coordinator)
    }

    /// Open both stores from configuration, durable first, then start
    ///
    /// # Example
    ///
    /// ```rust
    /// use cretoai_authsync::{AuthzConfig, Coordinator};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = AuthzConfig::from_toml_str("[durable]\nbackend = \"memory\"\n")?;
    /// let coordinator = Coordinator::from_config(&config).await?;
    ///
    /// coordinator.add_roles_for_user("alice", &["editor"]).await?;
    /// coordinator.add_policies_for_role("editor", &["doc1"]).await?;
    /// assert!(coordinator.enforce("alice", "doc1").await?);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn from_config(config: &AuthzConfig) -> Result<Self> {
        config.validate()?;
        let namespace = config.namespace.build()?;

        let durable = handle::open("durable", &config.durable, &config.model)
            .await
            .map_err(|e| AuthzError::init("durable", e))?;
        if config.durable == StoreConfig::Memory {
            warn!("durable store is in-memory; authorization state will not survive a restart");
        }

        let cache = handle::open("cache", &config.cache, &config.model)
            .await
            .map_err(|e| AuthzError::init("cache", e))?;

        Self::start(namespace, durable, cache, config.consistency).await
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn options(&self) -> ConsistencyOptions {
        self.options
    }

    /// Shared handle to the cache store this coordinator replicates into
    pub fn cache_handle(&self) -> Arc<dyn PolicyHandle> {
        Arc::clone(&self.cache)
    }

    // ---- writes ----

    /// Assign `roles` to `user` in both stores
    pub async fn add_roles_for_user<S: AsRef<str>>(&self, user: &str, roles: &[S]) -> Result<()> {
        let assignments = self.assignments(user, roles)?;
        self.replicate(WriteOp::Assign(assignments)).await
    }

    /// Remove `roles` from `user` in both stores; absent assignments are ignored
    pub async fn delete_roles_for_user<S: AsRef<str>>(&self, user: &str, roles: &[S]) -> Result<()> {
        let assignments = self.assignments(user, roles)?;
        self.replicate(WriteOp::Unassign(assignments)).await
    }

    /// Grant `objects` to `role` in both stores
    pub async fn add_policies_for_role<S: AsRef<str>>(&self, role: &str, objects: &[S]) -> Result<()> {
        let grants = self.grants(role, objects)?;
        self.replicate(WriteOp::Grant(grants)).await
    }

    /// Revoke `objects` from `role` in both stores; absent grants are ignored
    pub async fn delete_policies_for_role<S: AsRef<str>>(
        &self,
        role: &str,
        objects: &[S],
    ) -> Result<()> {
        let grants = self.grants(role, objects)?;
        self.replicate(WriteOp::Revoke(grants)).await
    }

    fn assignments<S: AsRef<str>>(&self, user: &str, roles: &[S]) -> Result<Vec<RoleAssignment>> {
        self.namespace.check(IdClass::User, user)?;
        let subject = self.namespace.to_subject(user);

        roles
            .iter()
            .map(|role| {
                let role = role.as_ref();
                self.namespace.check(IdClass::Role, role)?;
                Ok(RoleAssignment::new(subject.clone(), self.namespace.to_role(role)))
            })
            .collect()
    }

    fn grants<S: AsRef<str>>(&self, role: &str, objects: &[S]) -> Result<Vec<PolicyGrant>> {
        self.namespace.check(IdClass::Role, role)?;
        let role = self.namespace.to_role(role);

        objects
            .iter()
            .map(|object| {
                let object = object.as_ref();
                self.namespace.check(IdClass::Object, object)?;
                Ok(PolicyGrant::new(
                    role.clone(),
                    self.namespace.to_object(object),
                    self.namespace.action(),
                ))
            })
            .collect()
    }

    /// Apply to durable, then cache.
    ///
    /// Durable failure fails the call (after a repair attempt whose own
    /// failure is only logged). Cache failure after durable success is
    /// repaired in place; the call fails only if that repair fails.
    async fn replicate(&self, op: WriteOp) -> Result<()> {
        if op.is_empty() {
            debug!("{}: nothing to apply", op.name());
            return Ok(());
        }

        self.metrics.record_write().await;

        if let Err(err) = op.apply(self.durable.as_ref()).await {
            self.metrics.record_durable_write_failure().await;
            warn!(op = op.name(), error = %err, "durable write failed, resyncing cache");

            if let Err(resync_err) = self.repair().await {
                error!(
                    op = op.name(),
                    error = %resync_err,
                    "resync after durable write failure failed, cache consistency is unverified"
                );
            }
            return Err(err);
        }

        if let Err(err) = op.apply(self.cache.as_ref()).await {
            self.metrics.record_cache_write_failure().await;
            warn!(op = op.name(), error = %err, "cache write failed after durable commit, resyncing cache");
            self.repair().await?;
        }

        debug!("{} replicated", op.name());
        Ok(())
    }

    // ---- reads ----

    /// Direct roles of `user` (raw names)
    pub async fn roles_for_user(&self, user: &str) -> Result<Vec<RoleName>> {
        self.namespace.check(IdClass::User, user)?;
        let subject = self.namespace.to_subject(user);

        let cached = self.cache.roles_of(&subject).await;
        let roles = self
            .read_through("roles_for_user", cached, || self.durable.roles_of(&subject))
            .await?;

        Ok(roles.iter().map(|role| self.namespace.from_role(role)).collect())
    }

    /// Objects granted directly to `role` (raw names)
    pub async fn policies_for_role(&self, role: &str) -> Result<Vec<ObjectName>> {
        self.namespace.check(IdClass::Role, role)?;
        let role = self.namespace.to_role(role);

        let cached = self.cache.policies_for(&role).await;
        let grants = self
            .read_through("policies_for_role", cached, || self.durable.policies_for(&role))
            .await?;

        Ok(self.namespace.granted_objects(grants))
    }

    /// Union of the objects granted to each of `user`'s roles, first-seen
    /// order, without repeats
    pub async fn policies_for_user(&self, user: &str) -> Result<Vec<ObjectName>> {
        let roles = self.roles_for_user(user).await?;
        let per_role = try_join_all(roles.iter().map(|role| self.policies_for_role(role))).await?;

        let mut seen = HashSet::new();
        Ok(per_role
            .into_iter()
            .flatten()
            .filter(|object| seen.insert(object.clone()))
            .collect())
    }

    /// Return the cached answer, or on cache error the durable one after
    /// repairing the cache. Repair failure is logged, not returned.
    async fn read_through<T, F, Fut>(&self, op: &'static str, cached: Result<T>, durable: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let err = match cached {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        self.metrics.record_read_fallback().await;
        warn!(op, error = %err, "cache read failed, falling back to durable store");

        let value = durable().await?;

        if let Err(resync_err) = self.repair().await {
            warn!(op, error = %resync_err, "cache repair after read fallback failed");
        }

        Ok(value)
    }

    // ---- enforcement ----

    /// Is `user` allowed on `object` through any of its roles
    pub async fn enforce(&self, user: &str, object: &str) -> Result<bool> {
        self.namespace.check(IdClass::User, user)?;
        self.namespace.check(IdClass::Object, object)?;

        let subject = self.namespace.to_subject(user);
        let object = self.namespace.to_object(object);
        let action = self.namespace.action();

        let allowed = match self.cache.enforce(&subject, &object, action).await {
            Ok(allowed) => allowed,
            Err(err) => {
                warn!(error = %err, "cache enforce failed, falling back to durable store");

                // Counted after durable decides; fallbacks never exceed decisions
                let allowed = self.durable.enforce(&subject, &object, action).await?;
                self.metrics.record_enforce_fallback().await;

                if self.options.resync_on_enforce_fallback {
                    if let Err(resync_err) = self.repair().await {
                        warn!(error = %resync_err, "cache repair after enforce fallback failed");
                    }
                }
                allowed
            }
        };

        self.metrics.record_decision(allowed).await;
        debug!(subject = %subject, object = %object, allowed, "enforce");

        Ok(allowed)
    }

    // ---- resync ----

    /// Rebuild the cache from the durable store.
    ///
    /// Always runs its own pass, after any resync already in flight.
    pub async fn resync(&self) -> Result<ResyncReport> {
        let ticket = self.resync_guard.acquire().await;
        self.run_resync(ticket).await
    }

    /// Failure-triggered resync; may be satisfied by a concurrent run
    async fn repair(&self) -> Result<()> {
        let ticket = if self.options.coalesce_resync {
            match self.resync_guard.acquire_unless_covered().await {
                Some(ticket) => ticket,
                None => {
                    self.metrics.record_resync_coalesced().await;
                    return Ok(());
                }
            }
        } else {
            self.resync_guard.acquire().await
        };

        self.run_resync(ticket).await.map(|_| ())
    }

    async fn run_resync(&self, ticket: ResyncTicket<'_>) -> Result<ResyncReport> {
        self.metrics.record_resync_started().await;

        match resync::rebuild_cache(self.durable.as_ref(), self.cache.as_ref()).await {
            Ok(report) => {
                ticket.succeeded();
                self.metrics.record_resync_completed(report.duration).await;
                Ok(report)
            }
            Err(err) => {
                drop(ticket);
                self.metrics.record_resync_failed().await;
                Err(err)
            }
        }
    }

    // ---- metrics ----

    /// Snapshot of replication and repair counters
    pub async fn metrics(&self) -> SyncMetrics {
        self.metrics.get_metrics().await
    }

    /// Counters in Prometheus text format
    pub async fn export_metrics(&self) -> String {
        self.metrics.export_prometheus().await
    }
}
