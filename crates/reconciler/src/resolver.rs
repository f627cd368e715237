//! Sink resolution.
//!
//! Turning a [`Destination`] into a URI is the resolver's business: it knows
//! how to look up addressable objects. The reconciler only hands over a
//! destination whose namespace has already been defaulted.

use std::collections::HashMap;

use async_trait::async_trait;
use couchdb_source_apis::{Destination, KReference};
use thiserror::Error;
use tokio::sync::RwLock;
use url::Url;

use crate::owner::SourceIdentity;

/// Resolution failures. Both kinds are retryable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// No addressable target, or the lookup itself failed.
    #[error("{target} not found: {reason}")]
    NotFound { target: String, reason: String },

    /// More than one target matches.
    #[error("{target} is ambiguous: {reason}")]
    Ambiguous { target: String, reason: String },
}

impl ResolveError {
    /// Create a not found error.
    pub fn not_found(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NotFound {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Create an ambiguous error.
    pub fn ambiguous(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Ambiguous {
            target: target.into(),
            reason: reason.into(),
        }
    }
}

/// Resolves a destination to a URI.
#[async_trait]
pub trait SinkResolver: Send + Sync {
    /// Resolve `destination` on behalf of `parent`. Must not mutate
    /// cluster state.
    async fn uri_from_destination(
        &self,
        destination: &Destination,
        parent: &SourceIdentity,
    ) -> Result<Url, ResolveError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct AddressKey {
    kind: String,
    namespace: String,
    name: String,
}

impl AddressKey {
    fn of(reference: &KReference) -> Self {
        Self {
            kind: reference.kind.clone(),
            namespace: reference.namespace.clone().unwrap_or_default(),
            name: reference.name.clone(),
        }
    }
}

/// Table-driven resolver for tests and local runs.
///
/// Addressable objects are registered up front with the URL they expose.
#[derive(Debug, Default)]
pub struct StaticSinkResolver {
    addresses: RwLock<HashMap<AddressKey, Url>>,
}

impl StaticSinkResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the address of an addressable object.
    pub async fn register(&self, kind: &str, namespace: &str, name: &str, url: Url) {
        let key = AddressKey {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        };
        self.addresses.write().await.insert(key, url);
    }
}

fn describe(reference: &KReference) -> String {
    format!(
        "{} '{}/{}'",
        reference.kind,
        reference.namespace.as_deref().unwrap_or_default(),
        reference.name
    )
}

#[async_trait]
impl SinkResolver for StaticSinkResolver {
    async fn uri_from_destination(
        &self,
        destination: &Destination,
        _parent: &SourceIdentity,
    ) -> Result<Url, ResolveError> {
        let relative = destination.uri.as_deref().filter(|u| !u.is_empty());

        let Some(reference) = destination.effective_ref() else {
            let raw = relative
                .ok_or_else(|| ResolveError::not_found("destination", "nothing to resolve"))?;
            return Url::parse(raw).map_err(|e| ResolveError::not_found(raw, e.to_string()));
        };

        let target = describe(&reference);
        let base = self
            .addresses
            .read()
            .await
            .get(&AddressKey::of(&reference))
            .cloned()
            .ok_or_else(|| ResolveError::not_found(&target, "object is not addressable"))?;

        match relative {
            Some(path) => base
                .join(path)
                .map_err(|e| ResolveError::not_found(&target, e.to_string())),
            None => Ok(base),
        }
    }
}
