//! The `CouchDbSource` resource and its sink destination.

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use serde::{Deserialize, Serialize};

use crate::status::CouchDbSourceStatus;

/// API group/version of the `CouchDbSource` resource.
pub const API_VERSION: &str = "sources.knative.dev/v1alpha1";

/// Kind of the `CouchDbSource` resource.
pub const KIND: &str = "CouchDbSource";

/// Kind of a sink that accepts event type registrations.
pub const BROKER_KIND: &str = "Broker";

/// A CouchDB change feed exposed as an event source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouchDbSource {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: CouchDbSourceSpec,
    #[serde(default)]
    pub status: CouchDbSourceStatus,
}

impl CouchDbSource {
    /// Create a source with the given namespace, name and spec.
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        spec: CouchDbSourceSpec,
    ) -> Self {
        Self {
            metadata: ObjectMeta {
                namespace: Some(namespace.into()),
                name: Some(name.into()),
                ..ObjectMeta::default()
            },
            spec,
            status: CouchDbSourceStatus::default(),
        }
    }

    /// Set the object UID.
    #[must_use]
    pub fn with_uid(mut self, uid: impl Into<String>) -> Self {
        self.metadata.uid = Some(uid.into());
        self
    }

    /// Set the object generation.
    #[must_use]
    pub fn with_generation(mut self, generation: i64) -> Self {
        self.metadata.generation = Some(generation);
        self
    }

    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }

    pub fn namespace(&self) -> &str {
        self.metadata.namespace.as_deref().unwrap_or_default()
    }

    pub fn uid(&self) -> &str {
        self.metadata.uid.as_deref().unwrap_or_default()
    }

    /// Controller owner reference pointing back at this source.
    ///
    /// Children carrying this reference are garbage collected with the source.
    pub fn controller_reference(&self) -> OwnerReference {
        OwnerReference {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            name: self.name().to_string(),
            uid: self.uid().to_string(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    /// Namespace holding the credentials secret.
    pub fn credentials_namespace(&self) -> &str {
        self.spec
            .credentials
            .namespace
            .as_deref()
            .filter(|ns| !ns.is_empty())
            .unwrap_or_else(|| self.namespace())
    }
}

/// Desired state of a [`CouchDbSource`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouchDbSourceSpec {
    /// Service account the receive adapter runs as.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_account_name: Option<String>,
    /// Secret holding the CouchDB `url`.
    pub credentials: CredentialsReference,
    #[serde(default)]
    pub feed: Feed,
    /// Database to watch.
    pub database: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sink: Option<Destination>,
}

/// Coordinates of the CouchDB credentials secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsReference {
    pub name: String,
    /// Defaults to the source namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// CouchDB change feed mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feed {
    #[default]
    Normal,
    Continuous,
}

impl Feed {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Continuous => "continuous",
        }
    }
}

/// Reference to an addressable object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KReference {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl KReference {
    pub fn new(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            api_version: api_version.into(),
            kind: kind.into(),
            name: name.into(),
            namespace: None,
        }
    }

    /// Set the namespace.
    #[must_use]
    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }
}

/// Delivery target for produced events.
///
/// Either the structured `ref` or the legacy `deprecated*` triple names the
/// target. When `ref` is set it is authoritative and the legacy fields are
/// ignored for resolution. `uri` is either an absolute target on its own or a
/// path relative to the resolved reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    #[serde(rename = "ref", default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<KReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated_api_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated_namespace: Option<String>,
}

impl Destination {
    /// Destination pointing at a structured reference.
    pub fn to_ref(reference: KReference) -> Self {
        Self {
            reference: Some(reference),
            uri: None,
            deprecated_api_version: None,
            deprecated_kind: None,
            deprecated_name: None,
            deprecated_namespace: None,
        }
    }

    /// Destination pointing at an absolute URI.
    pub fn to_uri(uri: impl Into<String>) -> Self {
        Self {
            uri: Some(uri.into()),
            ..Self::default()
        }
    }

    /// Destination using the legacy name/kind triple.
    pub fn deprecated(
        api_version: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            deprecated_api_version: Some(api_version.into()),
            deprecated_kind: Some(kind.into()),
            deprecated_name: Some(name.into()),
            ..Self::default()
        }
    }

    /// True when the legacy triple is fully populated.
    pub fn uses_deprecated_ref(&self) -> bool {
        [
            &self.deprecated_api_version,
            &self.deprecated_kind,
            &self.deprecated_name,
        ]
        .iter()
        .all(|field| field.as_deref().is_some_and(|v| !v.is_empty()))
    }

    /// True when nothing in the destination names a target.
    pub fn is_empty(&self) -> bool {
        self.reference.is_none()
            && self.uri.as_deref().map_or(true, str::is_empty)
            && self.deprecated_name.as_deref().map_or(true, str::is_empty)
    }

    /// The reference used for resolution: `ref` when set, otherwise the
    /// legacy triple.
    pub fn effective_ref(&self) -> Option<KReference> {
        if let Some(reference) = &self.reference {
            return Some(reference.clone());
        }
        if !self.uses_deprecated_ref() {
            return None;
        }
        Some(KReference {
            api_version: self.deprecated_api_version.clone().unwrap_or_default(),
            kind: self.deprecated_kind.clone().unwrap_or_default(),
            name: self.deprecated_name.clone().unwrap_or_default(),
            namespace: self.deprecated_namespace.clone(),
        })
    }

    /// Copy of this destination with a missing namespace filled in.
    ///
    /// The receiver is left untouched.
    #[must_use]
    pub fn with_default_namespace(&self, namespace: &str) -> Self {
        let mut dest = self.clone();
        if let Some(reference) = dest.reference.as_mut() {
            if reference.namespace.as_deref().map_or(true, str::is_empty) {
                reference.namespace = Some(namespace.to_string());
            }
        } else if dest.deprecated_name.as_deref().is_some_and(|n| !n.is_empty())
            && dest.deprecated_namespace.as_deref().map_or(true, str::is_empty)
        {
            dest.deprecated_namespace = Some(namespace.to_string());
        }
        dest
    }

    /// Broker name when the structured `ref` targets a broker.
    pub fn broker_name(&self) -> Option<&str> {
        self.reference
            .as_ref()
            .filter(|r| r.kind == BROKER_KIND)
            .map(|r| r.name.as_str())
    }
}
