//! Shared helpers for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use cretoai_authsync::{
    AuthzError, CasbinHandle, ConsistencyOptions, Coordinator, Namespace, PolicyGrant,
    PolicyHandle, Result, RoleAssignment,
};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Install a fmt subscriber once per test binary; honours `RUST_LOG`
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// In-memory log sink for asserting on emitted events
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Route events on the current thread here until the guard drops
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let sink = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || sink.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn count(&self, needle: &str) -> usize {
        let bytes = self.0.lock().unwrap();
        String::from_utf8_lossy(&bytes).matches(needle).count()
    }
}

impl io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Number of upcoming calls that should fail; `usize::MAX` means forever
#[derive(Default)]
struct FailureBudget(AtomicUsize);

impl FailureBudget {
    fn set(&self, remaining: usize) {
        self.0.store(remaining, Ordering::SeqCst);
    }

    fn take(&self) -> bool {
        self.0
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| match n {
                0 => None,
                usize::MAX => Some(usize::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }
}

/// Wraps a real handle and fails selected operation groups on demand
pub struct FaultyHandle {
    inner: CasbinHandle,
    reads: FailureBudget,
    writes: FailureBudget,
    enforce: FailureBudget,
    load: FailureBudget,
    writes_attempted: AtomicUsize,
}

fn budget(on: bool) -> usize {
    if on {
        usize::MAX
    } else {
        0
    }
}

impl FaultyHandle {
    pub async fn in_memory(label: &str) -> Arc<Self> {
        Arc::new(Self {
            inner: CasbinHandle::in_memory(label).await.unwrap(),
            reads: FailureBudget::default(),
            writes: FailureBudget::default(),
            enforce: FailureBudget::default(),
            load: FailureBudget::default(),
            writes_attempted: AtomicUsize::new(0),
        })
    }

    pub fn fail_reads(&self, on: bool) {
        self.reads.set(budget(on));
    }

    pub fn fail_writes(&self, on: bool) {
        self.writes.set(budget(on));
    }

    pub fn fail_enforce(&self, on: bool) {
        self.enforce.set(budget(on));
    }

    pub fn fail_load(&self, on: bool) {
        self.load.set(budget(on));
    }

    /// Fail only the next read
    pub fn fail_next_read(&self) {
        self.reads.set(1);
    }

    /// Fail only the next write
    pub fn fail_next_write(&self) {
        self.writes.set(1);
    }

    /// Fail every operation
    pub fn fail_all(&self, on: bool) {
        self.fail_reads(on);
        self.fail_writes(on);
        self.fail_enforce(on);
        self.fail_load(on);
    }

    pub fn writes_attempted(&self) -> usize {
        self.writes_attempted.load(Ordering::SeqCst)
    }

    /// The wrapped handle, bypassing fault injection
    pub fn inner(&self) -> &CasbinHandle {
        &self.inner
    }

    fn check(&self, budget: &FailureBudget, op: &str) -> Result<()> {
        if budget.take() {
            return Err(AuthzError::Store(format!(
                "{}: injected {} failure",
                self.inner.label(),
                op
            )));
        }
        Ok(())
    }

    fn write(&self, op: &str) -> Result<()> {
        self.writes_attempted.fetch_add(1, Ordering::SeqCst);
        self.check(&self.writes, op)
    }
}

#[async_trait]
impl PolicyHandle for FaultyHandle {
    fn label(&self) -> &str {
        self.inner.label()
    }

    async fn assign(&self, assignments: &[RoleAssignment]) -> Result<()> {
        self.write("assign")?;
        self.inner.assign(assignments).await
    }

    async fn unassign(&self, assignments: &[RoleAssignment]) -> Result<()> {
        self.write("unassign")?;
        self.inner.unassign(assignments).await
    }

    async fn roles_of(&self, user: &str) -> Result<Vec<String>> {
        self.check(&self.reads, "roles_of")?;
        self.inner.roles_of(user).await
    }

    async fn users_of(&self, role: &str) -> Result<Vec<String>> {
        self.check(&self.reads, "users_of")?;
        self.inner.users_of(role).await
    }

    async fn all_roles(&self) -> Result<Vec<String>> {
        self.check(&self.reads, "all_roles")?;
        self.inner.all_roles().await
    }

    async fn grant(&self, grants: &[PolicyGrant]) -> Result<()> {
        self.write("grant")?;
        self.inner.grant(grants).await
    }

    async fn revoke(&self, grants: &[PolicyGrant]) -> Result<()> {
        self.write("revoke")?;
        self.inner.revoke(grants).await
    }

    async fn policies_for(&self, role: &str) -> Result<Vec<PolicyGrant>> {
        self.check(&self.reads, "policies_for")?;
        self.inner.policies_for(role).await
    }

    async fn all_grants(&self) -> Result<Vec<PolicyGrant>> {
        self.check(&self.reads, "all_grants")?;
        self.inner.all_grants().await
    }

    async fn enforce(&self, user: &str, object: &str, action: &str) -> Result<bool> {
        self.check(&self.enforce, "enforce")?;
        self.inner.enforce(user, object, action).await
    }

    async fn load_all(&self) -> Result<()> {
        self.check(&self.load, "load_all")?;
        self.inner.load_all().await
    }
}

/// Durable and cache handles plus a coordinator over them
pub struct Harness {
    pub durable: Arc<FaultyHandle>,
    pub cache: Arc<FaultyHandle>,
    pub coordinator: Arc<Coordinator>,
}

impl Harness {
    pub async fn new(options: ConsistencyOptions) -> Self {
        init_tracing();

        let durable = FaultyHandle::in_memory("durable").await;
        let cache = FaultyHandle::in_memory("cache").await;
        let coordinator = Coordinator::start(
            Namespace::default(),
            durable.clone(),
            cache.clone(),
            options,
        )
        .await
        .unwrap();

        Self {
            durable,
            cache,
            coordinator: Arc::new(coordinator),
        }
    }

    pub async fn with_defaults() -> Self {
        Self::new(ConsistencyOptions::default()).await
    }
}

/// Sorted engine-level assignments and grants of a handle
pub async fn snapshot(handle: &dyn PolicyHandle) -> (Vec<RoleAssignment>, Vec<PolicyGrant>) {
    let mut assignments = Vec::new();
    for role in handle.all_roles().await.unwrap() {
        for user in handle.users_of(&role).await.unwrap() {
            assignments.push(RoleAssignment::new(user, role.clone()));
        }
    }
    assignments.sort();
    assignments.dedup();

    let mut grants = handle.all_grants().await.unwrap();
    grants.sort();

    (assignments, grants)
}
