//! Identifier namespacing
//!
//! Users, roles and objects share one subject/object space inside the policy
//! engine. Every identifier is prefixed with a class-specific marker before it
//! reaches an engine, so a user `admin` and a role `admin` never alias.
//!
//! # Example
//!
//! ```rust
//! use cretoai_authsync::namespace::Namespace;
//!
//! let ns = Namespace::default();
//! assert_eq!(ns.to_subject("admin"), "u_admin");
//! assert_eq!(ns.to_role("admin"), "r_admin");
//! assert_eq!(ns.from_role("r_admin"), "admin");
//! ```

use crate::error::{AuthzError, Result};
use crate::types::{ObjectName, PolicyGrant};
use std::collections::HashSet;

pub const DEFAULT_USER_PREFIX: &str = "u_";
pub const DEFAULT_ROLE_PREFIX: &str = "r_";
pub const DEFAULT_OBJECT_PREFIX: &str = "p_";
pub const DEFAULT_ACTION: &str = "Allow";

/// Identifier class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdClass {
    User,
    Role,
    Object,
}

/// Prefix scheme plus the single allow action written into every grant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    user_prefix: String,
    role_prefix: String,
    object_prefix: String,
    action: String,
}

impl Default for Namespace {
    fn default() -> Self {
        Self {
            user_prefix: DEFAULT_USER_PREFIX.to_string(),
            role_prefix: DEFAULT_ROLE_PREFIX.to_string(),
            object_prefix: DEFAULT_OBJECT_PREFIX.to_string(),
            action: DEFAULT_ACTION.to_string(),
        }
    }
}

impl Namespace {
    /// Build a namespace with custom prefixes.
    ///
    /// Prefixes must be non-empty and no prefix may start another one;
    /// otherwise `u` + `_x` and `u_` + `x` would collide.
    pub fn new(
        user_prefix: impl Into<String>,
        role_prefix: impl Into<String>,
        object_prefix: impl Into<String>,
        action: impl Into<String>,
    ) -> Result<Self> {
        let ns = Self {
            user_prefix: user_prefix.into(),
            role_prefix: role_prefix.into(),
            object_prefix: object_prefix.into(),
            action: action.into(),
        };
        ns.validate()?;
        Ok(ns)
    }

    fn validate(&self) -> Result<()> {
        let prefixes = [
            ("user", &self.user_prefix),
            ("role", &self.role_prefix),
            ("object", &self.object_prefix),
        ];

        for (class, prefix) in &prefixes {
            if prefix.is_empty() {
                return Err(AuthzError::Config(format!("{} prefix must not be empty", class)));
            }
        }

        for (i, (a_class, a)) in prefixes.iter().enumerate() {
            for (b_class, b) in prefixes.iter().skip(i + 1) {
                if a.starts_with(b.as_str()) || b.starts_with(a.as_str()) {
                    return Err(AuthzError::Config(format!(
                        "{} prefix '{}' and {} prefix '{}' overlap",
                        a_class, a, b_class, b
                    )));
                }
            }
        }

        if self.action.is_empty() {
            return Err(AuthzError::Config("action must not be empty".to_string()));
        }

        Ok(())
    }

    pub fn prefix(&self, class: IdClass) -> &str {
        match class {
            IdClass::User => &self.user_prefix,
            IdClass::Role => &self.role_prefix,
            IdClass::Object => &self.object_prefix,
        }
    }

    /// Action carried by every grant
    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn encode(&self, class: IdClass, raw: &str) -> String {
        let prefix = self.prefix(class);
        let mut out = String::with_capacity(prefix.len() + raw.len());
        out.push_str(prefix);
        out.push_str(raw);
        out
    }

    /// Strip the class prefix. Strings without it are returned unchanged.
    pub fn decode(&self, class: IdClass, engine_id: &str) -> String {
        engine_id
            .strip_prefix(self.prefix(class))
            .unwrap_or(engine_id)
            .to_string()
    }

    pub fn to_subject(&self, user: &str) -> String {
        self.encode(IdClass::User, user)
    }

    pub fn to_role(&self, role: &str) -> String {
        self.encode(IdClass::Role, role)
    }

    pub fn to_object(&self, object: &str) -> String {
        self.encode(IdClass::Object, object)
    }

    pub fn from_subject(&self, subject: &str) -> String {
        self.decode(IdClass::User, subject)
    }

    pub fn from_role(&self, role: &str) -> String {
        self.decode(IdClass::Role, role)
    }

    pub fn from_object(&self, object: &str) -> String {
        self.decode(IdClass::Object, object)
    }

    /// Reject empty caller-supplied identifiers
    pub(crate) fn check(&self, class: IdClass, raw: &str) -> Result<()> {
        if raw.is_empty() {
            return Err(AuthzError::InvalidInput(format!(
                "{} identifier must not be empty",
                class.as_str()
            )));
        }
        Ok(())
    }

    /// Raw object names granted through our action, first-seen order, no repeats
    pub(crate) fn granted_objects<I>(&self, grants: I) -> Vec<ObjectName>
    where
        I: IntoIterator<Item = PolicyGrant>,
    {
        let mut seen = HashSet::new();
        grants
            .into_iter()
            .filter(|grant| grant.action == self.action)
            .map(|grant| self.from_object(&grant.object))
            .filter(|object| seen.insert(object.clone()))
            .collect()
    }
}

impl IdClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdClass::User => "user",
            IdClass::Role => "role",
            IdClass::Object => "object",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_check_rejects_empty() {
        let ns = Namespace::default();
        assert!(ns.check(IdClass::User, "alice").is_ok());
        assert!(matches!(
            ns.check(IdClass::Role, ""),
            Err(AuthzError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_granted_objects_filters_foreign_actions() {
        let ns = Namespace::default();
        let objects = ns.granted_objects(vec![
            PolicyGrant::new("r_editor", "p_doc1", "Allow"),
            PolicyGrant::new("r_editor", "p_doc2", "Read"),
            PolicyGrant::new("r_editor", "p_doc1", "Allow"),
            PolicyGrant::new("r_editor", "p_doc3", "Allow"),
        ]);
        assert_eq!(objects, vec!["doc1", "doc3"]);
    }

    #[test]
    fn test_default_prefixes() {
        let ns = Namespace::default();
        assert_eq!(ns.to_subject("alice"), "u_alice");
        assert_eq!(ns.to_role("editor"), "r_editor");
        assert_eq!(ns.to_object("doc1"), "p_doc1");
        assert_eq!(ns.action(), "Allow");
    }

    #[test]
    fn test_decode_without_prefix_is_identity() {
        let ns = Namespace::default();
        assert_eq!(ns.from_role("editor"), "editor");
        assert_eq!(ns.from_object("u_doc"), "u_doc");
    }

    #[test]
    fn test_overlapping_prefixes_rejected() {
        let err = Namespace::new("u", "u_", "p_", "Allow").unwrap_err();
        assert!(matches!(err, AuthzError::Config(_)));

        let err = Namespace::new("x_", "x_", "p_", "Allow").unwrap_err();
        assert!(matches!(err, AuthzError::Config(_)));
    }

    #[test]
    fn test_empty_prefix_or_action_rejected() {
        assert!(Namespace::new("", "r_", "p_", "Allow").is_err());
        assert!(Namespace::new("u_", "r_", "p_", "").is_err());
        assert!(Namespace::new("user:", "role:", "obj:", "allow").is_ok());
    }

    proptest! {
        #[test]
        fn prop_classes_never_collide(raw in ".{1,32}") {
            let ns = Namespace::default();
            prop_assert_ne!(ns.to_subject(&raw), ns.to_role(&raw));
            prop_assert_ne!(ns.to_subject(&raw), ns.to_object(&raw));
            prop_assert_ne!(ns.to_role(&raw), ns.to_object(&raw));
        }

        #[test]
        fn prop_translation_is_lossless(raw in "[a-zA-Z0-9@.:-]{1,32}") {
            let ns = Namespace::default();
            prop_assert_eq!(ns.from_subject(&ns.to_subject(&raw)), raw.clone());
            prop_assert_eq!(ns.from_role(&ns.to_role(&raw)), raw.clone());
            prop_assert_eq!(ns.from_object(&ns.to_object(&raw)), raw);
        }
    }
}
