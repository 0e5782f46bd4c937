//! Cache rebuild from the durable store
//!
//! The rebuild is not transactional: a failure part-way leaves the cache
//! partially rebuilt. The durable store is only ever read.

use crate::error::{AuthzError, Result};
use crate::handle::PolicyHandle;
use crate::types::{ResyncReport, RoleAssignment};
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

const RELOAD_CACHE: &str = "reload cache";
const CLEAR_CACHE: &str = "clear cache";
const LIST_DURABLE_ROLES: &str = "list durable roles";
const LIST_DURABLE_MEMBERS: &str = "list durable role members";
const COPY_ASSIGNMENTS: &str = "copy role assignments";
const LIST_DURABLE_GRANTS: &str = "list durable grants";
const COPY_GRANTS: &str = "copy policy grants";

/// Which store a failed resync stage was talking to
pub(crate) fn store_of_stage(stage: &str) -> &'static str {
    match stage {
        LIST_DURABLE_ROLES | LIST_DURABLE_MEMBERS | LIST_DURABLE_GRANTS => "durable",
        _ => "cache",
    }
}

/// Rebuild `cache` so that its assignments and grants equal `durable`'s
pub(crate) async fn rebuild_cache(
    durable: &dyn PolicyHandle,
    cache: &dyn PolicyHandle,
) -> Result<ResyncReport> {
    let id = Uuid::new_v4();
    let start = Instant::now();

    info!(resync_id = %id, "resync started");

    // Pick up anything written to the cache store behind our back before
    // deciding what to remove.
    cache
        .load_all()
        .await
        .map_err(|e| AuthzError::resync(RELOAD_CACHE, e))?;

    let cleared = cache
        .clear_all()
        .await
        .map_err(|e| AuthzError::resync(CLEAR_CACHE, e))?;

    let mut assignments_copied = 0;
    let roles = durable
        .all_roles()
        .await
        .map_err(|e| AuthzError::resync(LIST_DURABLE_ROLES, e))?;

    for role in roles {
        let assignments: Vec<RoleAssignment> = durable
            .users_of(&role)
            .await
            .map_err(|e| AuthzError::resync(LIST_DURABLE_MEMBERS, e))?
            .into_iter()
            .map(|user| RoleAssignment::new(user, role.clone()))
            .collect();

        if assignments.is_empty() {
            continue;
        }

        cache
            .assign(&assignments)
            .await
            .map_err(|e| AuthzError::resync(COPY_ASSIGNMENTS, e))?;
        assignments_copied += assignments.len();
    }

    cache
        .load_all()
        .await
        .map_err(|e| AuthzError::resync(RELOAD_CACHE, e))?;

    let grants = durable
        .all_grants()
        .await
        .map_err(|e| AuthzError::resync(LIST_DURABLE_GRANTS, e))?;

    if !grants.is_empty() {
        cache
            .grant(&grants)
            .await
            .map_err(|e| AuthzError::resync(COPY_GRANTS, e))?;
    }

    let report = ResyncReport {
        id,
        assignments_cleared: cleared.assignments,
        grants_cleared: cleared.grants,
        assignments_copied,
        grants_copied: grants.len(),
        duration: start.elapsed(),
        completed_at: Utc::now(),
    };

    info!(
        resync_id = %id,
        assignments = report.assignments_copied,
        grants = report.grants_copied,
        elapsed_ms = report.duration.as_millis() as u64,
        "resync completed"
    );

    Ok(report)
}

/// Serializes resyncs and lets repair requests share a run.
///
/// `epoch` counts resyncs that have started; `last_ok` is the epoch of the
/// latest successful one. A request that observed epoch `e` is satisfied by
/// any successful resync with epoch `> e`, since that run began after the
/// request and therefore saw its durable state.
#[derive(Default)]
pub(crate) struct ResyncGuard {
    lock: Mutex<()>,
    epoch: AtomicU64,
    last_ok: AtomicU64,
}

/// Permission to run one resync
pub(crate) struct ResyncTicket<'a> {
    guard: &'a ResyncGuard,
    _permit: MutexGuard<'a, ()>,
    epoch: u64,
}

impl ResyncGuard {
    /// Wait for any running resync and take the next run unconditionally
    pub(crate) async fn acquire(&self) -> ResyncTicket<'_> {
        let permit = self.lock.lock().await;
        self.issue(permit)
    }

    /// Wait for any running resync, then take the next run unless a resync
    /// that started after this call has already succeeded.
    pub(crate) async fn acquire_unless_covered(&self) -> Option<ResyncTicket<'_>> {
        let observed = self.epoch.load(Ordering::SeqCst);
        let permit = self.lock.lock().await;

        if self.last_ok.load(Ordering::SeqCst) > observed {
            debug!(observed_epoch = observed, "resync request satisfied by a newer run");
            return None;
        }

        Some(self.issue(permit))
    }

    fn issue<'a>(&'a self, permit: MutexGuard<'a, ()>) -> ResyncTicket<'a> {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        ResyncTicket {
            guard: self,
            _permit: permit,
            epoch,
        }
    }
}

impl ResyncTicket<'_> {
    /// Record a successful run; dropping the ticket without this marks failure
    pub(crate) fn succeeded(self) {
        self.guard.last_ok.store(self.epoch, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_of_stage() {
        assert_eq!(store_of_stage(LIST_DURABLE_ROLES), "durable");
        assert_eq!(store_of_stage(LIST_DURABLE_GRANTS), "durable");
        assert_eq!(store_of_stage(RELOAD_CACHE), "cache");
        assert_eq!(store_of_stage(COPY_GRANTS), "cache");
    }

    #[tokio::test]
    async fn test_acquire_always_issues_a_ticket() {
        let guard = ResyncGuard::default();

        guard.acquire().await.succeeded();
        let ticket = guard.acquire().await;
        assert_eq!(ticket.epoch, 2);
    }

    #[tokio::test]
    async fn test_request_before_run_is_not_coalesced() {
        let guard = ResyncGuard::default();

        // A run that completes before the request is observed does not cover it
        guard.acquire_unless_covered().await.unwrap().succeeded();
        assert!(guard.acquire_unless_covered().await.is_some());
    }

    #[tokio::test]
    async fn test_failed_run_does_not_satisfy_waiters() {
        let guard = ResyncGuard::default();

        let observed = guard.epoch.load(Ordering::SeqCst);
        let ticket = guard.acquire_unless_covered().await.unwrap();
        drop(ticket);

        assert_eq!(guard.last_ok.load(Ordering::SeqCst), observed);
        assert!(guard.acquire_unless_covered().await.is_some());
    }

    #[tokio::test]
    async fn test_waiters_share_one_newer_run() {
        use std::sync::Arc;

        let guard = Arc::new(ResyncGuard::default());
        let in_flight = guard.acquire().await;

        let mut waiters = Vec::new();
        for _ in 0..2 {
            let guard = guard.clone();
            waiters.push(tokio::spawn(async move {
                match guard.acquire_unless_covered().await {
                    Some(ticket) => {
                        ticket.succeeded();
                        true
                    }
                    None => false,
                }
            }));
        }

        // Let both waiters observe the in-flight epoch and block on the lock
        tokio::task::yield_now().await;
        in_flight.succeeded();

        let mut ran = 0;
        for waiter in waiters {
            if waiter.await.unwrap() {
                ran += 1;
            }
        }
        assert_eq!(ran, 1);
    }
}
