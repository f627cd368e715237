//! Ownership of child objects.
//!
//! A child belongs to a source only through its controller owner reference.
//! Matching names or labels never establish ownership.

use couchdb_source_apis::CouchDbSource;

use crate::store::Object;

/// The identity a controller owner reference points at.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceIdentity {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    pub uid: String,
}

impl SourceIdentity {
    pub fn of(source: &CouchDbSource) -> Self {
        Self {
            api_version: couchdb_source_apis::API_VERSION.to_string(),
            kind: couchdb_source_apis::KIND.to_string(),
            name: source.name().to_string(),
            uid: source.uid().to_string(),
        }
    }

    /// Same object: kind and a non-empty UID agree.
    pub fn same_as(&self, other: &Self) -> bool {
        !self.uid.is_empty() && self.uid == other.uid && self.kind == other.kind
    }
}

/// Capability to report which source controls an object.
pub trait OwnerOf {
    fn owner_of(&self) -> Option<SourceIdentity>;

    fn is_controlled_by(&self, source: &CouchDbSource) -> bool {
        self.owner_of()
            .is_some_and(|owner| owner.same_as(&SourceIdentity::of(source)))
    }
}

impl<K: Object> OwnerOf for K {
    fn owner_of(&self) -> Option<SourceIdentity> {
        self.meta()
            .owner_references
            .as_ref()?
            .iter()
            .find(|r| r.controller == Some(true))
            .map(|r| SourceIdentity {
                api_version: r.api_version.clone(),
                kind: r.kind.clone(),
                name: r.name.clone(),
                uid: r.uid.clone(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use couchdb_source_apis::CouchDbSourceSpec;
    use k8s_openapi::api::apps::v1::Deployment;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};

    fn source(uid: &str) -> CouchDbSource {
        CouchDbSource::new("shop", "orders", CouchDbSourceSpec::default()).with_uid(uid)
    }

    fn owned_by(reference: Option<OwnerReference>) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                owner_references: reference.map(|r| vec![r]),
                ..ObjectMeta::default()
            },
            ..Deployment::default()
        }
    }

    #[test]
    fn test_controller_reference_claims_child() {
        let src = source("uid-1");
        let child = owned_by(Some(src.controller_reference()));

        assert!(child.is_controlled_by(&src));
    }

    #[test]
    fn test_same_name_different_uid_is_foreign() {
        let child = owned_by(Some(source("uid-1").controller_reference()));

        assert!(!child.is_controlled_by(&source("uid-2")));
    }

    #[test]
    fn test_non_controller_reference_is_ignored() {
        let src = source("uid-1");
        let mut reference = src.controller_reference();
        reference.controller = Some(false);

        assert!(owned_by(Some(reference)).owner_of().is_none());
    }

    #[test]
    fn test_unowned_child() {
        assert!(!owned_by(None).is_controlled_by(&source("uid-1")));
    }

    #[test]
    fn test_empty_uid_never_matches() {
        let src = source("");
        let child = owned_by(Some(src.controller_reference()));

        assert!(!child.is_controlled_by(&src));
    }
}
