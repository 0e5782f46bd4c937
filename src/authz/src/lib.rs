//! # CretoAI Authorization Sync
//!
//! Role-based authorization over two policy stores: a durable store that is
//! the source of truth and a low-latency cache that answers most checks.
//!
//! ## Features
//!
//! - **Write-through replication**: every mutation lands in durable, then cache
//! - **Fallback reads**: cache errors are answered from durable and repaired
//! - **Resync**: the cache can be rebuilt from durable at any time
//! - **Namespaced identifiers**: users, roles and objects never alias
//! - **Casbin policy engine** with in-memory and PostgreSQL stores
//!
//! ## Example
//!
//! ```rust
//! use cretoai_authsync::{AuthzConfig, AuthzRuntime};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AuthzConfig::from_toml_str(
//!         r#"
//!         [durable]
//!         backend = "memory"
//!         "#,
//!     )?;
//!
//!     let runtime = AuthzRuntime::new();
//!     let authz = runtime.init(&config).await?;
//!
//!     authz.add_roles_for_user("alice", &["editor"]).await?;
//!     authz.add_policies_for_role("editor", &["doc1"]).await?;
//!
//!     if authz.enforce("alice", "doc1").await? {
//!         println!("Access granted!");
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod handle;
pub mod namespace;
pub mod runtime;
pub mod types;

// Re-export commonly used types
pub use client::AuthClient;
pub use config::{AuthzConfig, ConsistencyOptions, ModelSection, NamespaceSection, StoreConfig};
pub use coordinator::{Coordinator, MetricsCollector, SyncMetrics};
pub use error::{AuthzError, Result};
pub use handle::{CasbinHandle, ClearSummary, PolicyHandle};
pub use namespace::{IdClass, Namespace};
pub use runtime::AuthzRuntime;
pub use types::{ObjectName, PolicyGrant, ResyncReport, RoleAssignment, RoleName, UserId};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
