//! Core authorization types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Application-level user identifier
pub type UserId = String;

/// Application-level role name
pub type RoleName = String;

/// Application-level object (resource) name
pub type ObjectName = String;

/// Edge between a user and a role
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoleAssignment {
    pub user: String,
    pub role: String,
}

impl RoleAssignment {
    pub fn new(user: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            role: role.into(),
        }
    }

    /// Engine rule representation (`g, user, role`)
    pub(crate) fn to_rule(&self) -> Vec<String> {
        vec![self.user.clone(), self.role.clone()]
    }
}

/// Allow-only grant of an object to a role
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PolicyGrant {
    pub role: String,
    pub object: String,
    pub action: String,
}

impl PolicyGrant {
    pub fn new(
        role: impl Into<String>,
        object: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            role: role.into(),
            object: object.into(),
            action: action.into(),
        }
    }

    /// Engine rule representation (`p, role, object, action`)
    pub(crate) fn to_rule(&self) -> Vec<String> {
        vec![self.role.clone(), self.object.clone(), self.action.clone()]
    }
}

/// Outcome of a completed cache rebuild
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResyncReport {
    /// Resync identifier, also present in the log lines of the run
    pub id: Uuid,

    /// Role assignments removed from the cache
    pub assignments_cleared: usize,

    /// Policy grants removed from the cache
    pub grants_cleared: usize,

    /// Role assignments copied from the durable store
    pub assignments_copied: usize,

    /// Policy grants copied from the durable store
    pub grants_copied: usize,

    /// Wall-clock duration of the rebuild
    pub duration: Duration,

    pub completed_at: DateTime<Utc>,
}
