//! Error types for the reconciler crate.
//!
//! Errors fall into two groups. Configuration errors are permanent: retrying
//! cannot help until the user changes the source or a conflicting object.
//! Everything else is transient and the caller requeues with backoff.

use thiserror::Error;

use crate::resolver::ResolveError;
use crate::store::StoreError;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The source declares no sink.
    #[error("spec.sink missing")]
    SinkMissing,

    /// The sink could not be resolved to a URI.
    #[error("getting sink URI: {0}")]
    SinkResolution(#[from] ResolveError),

    /// An object with the derived name exists but belongs to someone else.
    #[error("{kind} '{name}' is not owned by CouchDbSource '{owner}'")]
    OwnershipConflict {
        kind: String,
        name: String,
        owner: String,
    },

    /// The credentials secret does not exist (yet).
    #[error("credentials secret '{namespace}/{name}' not found")]
    CredentialsNotFound { namespace: String, name: String },

    /// The credentials secret exists but cannot be used.
    #[error("credentials secret '{namespace}/{name}' is invalid: {reason}")]
    CredentialsInvalid {
        namespace: String,
        name: String,
        reason: String,
    },

    /// A collaborator store call failed.
    #[error("{operation} {kind} failed: {source}")]
    Store {
        operation: String,
        kind: String,
        #[source]
        source: StoreError,
    },

    /// Object comparison failed to serialize an object.
    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    /// The reconcile context was cancelled while a call was in flight.
    #[error("operation '{operation}' cancelled")]
    Cancelled { operation: String },

    /// The reconcile context deadline passed while a call was in flight.
    #[error("operation '{operation}' exceeded its deadline")]
    DeadlineExceeded { operation: String },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },
}

impl Error {
    /// Create an ownership conflict error.
    pub fn ownership_conflict(
        kind: impl Into<String>,
        name: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        Self::OwnershipConflict {
            kind: kind.into(),
            name: name.into(),
            owner: owner.into(),
        }
    }

    /// Create a credentials not found error.
    pub fn credentials_not_found(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self::CredentialsNotFound {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create a credentials invalid error.
    pub fn credentials_invalid(
        namespace: impl Into<String>,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::CredentialsInvalid {
            namespace: namespace.into(),
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a store error.
    pub fn store(
        operation: impl Into<String>,
        kind: impl Into<String>,
        source: StoreError,
    ) -> Self {
        Self::Store {
            operation: operation.into(),
            kind: kind.into(),
            source,
        }
    }

    /// Create a serialization error.
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization {
            reason: reason.into(),
        }
    }

    /// Create a cancelled error.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create a deadline exceeded error.
    pub fn deadline_exceeded(operation: impl Into<String>) -> Self {
        Self::DeadlineExceeded {
            operation: operation.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// True for errors that need user correction rather than a retry.
    pub const fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::SinkMissing
                | Self::OwnershipConflict { .. }
                | Self::CredentialsInvalid { .. }
                | Self::Serialization { .. }
                | Self::InvalidConfig { .. }
        )
    }

    /// Machine-readable reason recorded on status conditions.
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::SinkMissing => "SinkMissing",
            Self::SinkResolution(_) => "NotFound",
            Self::OwnershipConflict { .. } => "OwnershipConflict",
            Self::CredentialsNotFound { .. } => "CredentialsNotFound",
            Self::CredentialsInvalid { .. } => "CredentialsInvalid",
            Self::Store { .. } => "StoreFailed",
            Self::Serialization { .. } => "SerializationFailed",
            Self::Cancelled { .. } => "Cancelled",
            Self::DeadlineExceeded { .. } => "DeadlineExceeded",
            Self::InvalidConfig { .. } => "InvalidConfig",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}
