//! Error types for the dual-store authorization engine

use thiserror::Error;

/// Authorization engine errors
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A backing store could not be brought up at startup
    #[error("Failed to initialize {store} store: {source}")]
    Init {
        store: &'static str,
        #[source]
        source: Box<AuthzError>,
    },

    /// Policy engine or adapter error
    #[error("Policy engine error: {0}")]
    Engine(#[from] casbin::Error),

    /// Store-level failure reported by a handle
    #[error("Store error: {0}")]
    Store(String),

    /// Stored rule is missing fields
    #[error("Malformed rule: {0:?}")]
    MalformedRule(Vec<String>),

    /// A resync step failed; the cache may be partially rebuilt
    #[error("Resync failed during {stage}: {source}")]
    Resync {
        stage: &'static str,
        #[source]
        source: Box<AuthzError>,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AuthzError {
    pub(crate) fn init(store: &'static str, source: AuthzError) -> Self {
        Self::Init {
            store,
            source: Box::new(source),
        }
    }

    pub(crate) fn resync(stage: &'static str, source: AuthzError) -> Self {
        Self::Resync {
            stage,
            source: Box::new(source),
        }
    }
}

/// Result type for authorization operations
pub type Result<T> = std::result::Result<T, AuthzError>;
