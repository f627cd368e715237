//! Object store trait and implementations.
//!
//! The reconciler never talks to a cluster directly. Every read and write
//! goes through an [`ObjectStore`] for the object kind involved, so the
//! control plane client, listers and label-selector execution all stay
//! behind this seam.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use couchdb_source_apis::{CouchDbSource, EventType};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use thiserror::Error;
use tokio::sync::RwLock;
use ulid::Ulid;

/// Label set used as an equality-based selector.
pub type Labels = BTreeMap<String, String>;

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors reported by a store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{kind} '{namespace}/{name}' not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("{kind} '{namespace}/{name}' already exists")]
    AlreadyExists {
        kind: String,
        namespace: String,
        name: String,
    },

    /// Optimistic concurrency failure.
    #[error("conflict on {kind} '{namespace}/{name}': {reason}")]
    Conflict {
        kind: String,
        namespace: String,
        name: String,
        reason: String,
    },

    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },
}

impl StoreError {
    /// Create a not found error.
    pub fn not_found(
        kind: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Create an unavailable error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// An object the store can hold: anything with standard object metadata.
pub trait Object: Clone + Send + Sync + 'static {
    const KIND: &'static str;

    fn meta(&self) -> &ObjectMeta;

    fn meta_mut(&mut self) -> &mut ObjectMeta;

    fn name(&self) -> &str {
        self.meta().name.as_deref().unwrap_or_default()
    }

    fn namespace(&self) -> &str {
        self.meta().namespace.as_deref().unwrap_or_default()
    }
}

impl Object for Deployment {
    const KIND: &'static str = "Deployment";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl Object for Secret {
    const KIND: &'static str = "Secret";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl Object for EventType {
    const KIND: &'static str = "EventType";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

impl Object for CouchDbSource {
    const KIND: &'static str = couchdb_source_apis::KIND;

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

/// CRUD over one object kind, keyed by (namespace, name) or label selector.
#[async_trait]
pub trait ObjectStore<K: Object>: Send + Sync {
    /// Fetch an object. A missing object is `StoreError::NotFound`.
    async fn get(&self, namespace: &str, name: &str) -> StoreResult<K>;

    /// List objects in a namespace whose labels contain `selector`.
    async fn list(&self, namespace: &str, selector: &Labels) -> StoreResult<Vec<K>>;

    /// Create an object. An empty name with `generateName` set gets a
    /// generated name.
    async fn create(&self, object: &K) -> StoreResult<K>;

    /// Replace an existing object.
    async fn update(&self, object: &K) -> StoreResult<K>;

    async fn delete(&self, namespace: &str, name: &str) -> StoreResult<()>;
}

/// Persists the status sub-object of a source.
#[async_trait]
pub trait StatusWriter: Send + Sync {
    async fn update_status(&self, source: &CouchDbSource) -> StoreResult<CouchDbSource>;
}

/// Store operations, used for recorded writes and injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    List,
    Create,
    Update,
    UpdateStatus,
    Delete,
}

impl Verb {
    pub const fn is_write(self) -> bool {
        !matches!(self, Self::Get | Self::List)
    }
}

/// A write performed against an [`InMemoryStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOp {
    pub verb: Verb,
    pub namespace: String,
    pub name: String,
}

/// In-memory object store for testing and local runs.
///
/// Records every write so tests can assert on exactly what a reconcile pass
/// did. Failures can be injected per verb and fire once each, in order.
pub struct InMemoryStore<K: Object> {
    objects: RwLock<BTreeMap<(String, String), K>>,
    writes: RwLock<Vec<WriteOp>>,
    failures: RwLock<VecDeque<(Verb, StoreError)>>,
}

impl<K: Object> Default for InMemoryStore<K> {
    fn default() -> Self {
        Self {
            objects: RwLock::new(BTreeMap::new()),
            writes: RwLock::new(Vec::new()),
            failures: RwLock::new(VecDeque::new()),
        }
    }
}

impl<K: Object> InMemoryStore<K> {
    /// Create a new in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new in-memory store wrapped in an Arc.
    pub fn new_arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Seed an object without recording a write.
    pub async fn insert(&self, object: K) {
        let key = key_of(&object);
        self.objects.write().await.insert(key, object);
    }

    /// Snapshot an object without going through the trait.
    pub async fn peek(&self, namespace: &str, name: &str) -> Option<K> {
        self.objects
            .read()
            .await
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// All stored objects, ordered by (namespace, name).
    pub async fn objects(&self) -> Vec<K> {
        self.objects.read().await.values().cloned().collect()
    }

    /// Writes recorded so far.
    pub async fn writes(&self) -> Vec<WriteOp> {
        self.writes.read().await.clone()
    }

    pub async fn write_count(&self) -> usize {
        self.writes.read().await.len()
    }

    pub async fn clear_writes(&self) {
        self.writes.write().await.clear();
    }

    /// Make the next call with `verb` fail with `err`.
    pub async fn fail_next(&self, verb: Verb, err: StoreError) {
        self.failures.write().await.push_back((verb, err));
    }

    async fn take_failure(&self, verb: Verb) -> StoreResult<()> {
        let mut failures = self.failures.write().await;
        match failures.iter().position(|(v, _)| *v == verb) {
            Some(pos) => match failures.remove(pos) {
                Some((_, err)) => Err(err),
                None => Ok(()),
            },
            None => Ok(()),
        }
    }

    async fn record(&self, verb: Verb, namespace: &str, name: &str) {
        self.writes.write().await.push(WriteOp {
            verb,
            namespace: namespace.to_string(),
            name: name.to_string(),
        });
    }

    fn not_found(namespace: &str, name: &str) -> StoreError {
        StoreError::not_found(K::KIND, namespace, name)
    }
}

fn key_of<K: Object>(object: &K) -> (String, String) {
    (object.namespace().to_string(), object.name().to_string())
}

fn matches_selector(meta: &ObjectMeta, selector: &Labels) -> bool {
    let labels = meta.labels.as_ref();
    selector
        .iter()
        .all(|(k, v)| labels.and_then(|l| l.get(k)) == Some(v))
}

fn next_resource_version(meta: &ObjectMeta) -> String {
    let current = meta
        .resource_version
        .as_deref()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0);
    current.saturating_add(1).to_string()
}

#[async_trait]
impl<K: Object> ObjectStore<K> for InMemoryStore<K> {
    async fn get(&self, namespace: &str, name: &str) -> StoreResult<K> {
        self.take_failure(Verb::Get).await?;
        self.peek(namespace, name)
            .await
            .ok_or_else(|| Self::not_found(namespace, name))
    }

    async fn list(&self, namespace: &str, selector: &Labels) -> StoreResult<Vec<K>> {
        self.take_failure(Verb::List).await?;
        let objects = self.objects.read().await;
        Ok(objects
            .iter()
            .filter(|((ns, _), obj)| ns == namespace && matches_selector(obj.meta(), selector))
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn create(&self, object: &K) -> StoreResult<K> {
        self.take_failure(Verb::Create).await?;
        let mut created = object.clone();
        let meta = created.meta_mut();
        if meta.name.as_deref().map_or(true, str::is_empty) {
            let prefix = meta.generate_name.clone().unwrap_or_default();
            let suffix = Ulid::new().to_string().to_lowercase();
            let tail: String = suffix.chars().rev().take(5).collect();
            meta.name = Some(format!("{prefix}{tail}"));
        }
        if meta.uid.is_none() {
            meta.uid = Some(Ulid::new().to_string().to_lowercase());
        }
        meta.resource_version = Some("1".to_string());

        let key = key_of(&created);
        let mut objects = self.objects.write().await;
        if objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists {
                kind: K::KIND.to_string(),
                namespace: key.0,
                name: key.1,
            });
        }
        objects.insert(key.clone(), created.clone());
        drop(objects);

        self.record(Verb::Create, &key.0, &key.1).await;
        Ok(created)
    }

    async fn update(&self, object: &K) -> StoreResult<K> {
        self.take_failure(Verb::Update).await?;
        let key = key_of(object);
        let mut objects = self.objects.write().await;
        let Some(existing) = objects.get(&key) else {
            return Err(Self::not_found(&key.0, &key.1));
        };

        let expected = object.meta().resource_version.as_deref();
        let stored = existing.meta().resource_version.as_deref();
        if expected.is_some() && expected != stored {
            return Err(StoreError::Conflict {
                kind: K::KIND.to_string(),
                namespace: key.0,
                name: key.1,
                reason: "the object has been modified".to_string(),
            });
        }

        let mut updated = object.clone();
        updated.meta_mut().resource_version = Some(next_resource_version(existing.meta()));
        objects.insert(key.clone(), updated.clone());
        drop(objects);

        self.record(Verb::Update, &key.0, &key.1).await;
        Ok(updated)
    }

    async fn delete(&self, namespace: &str, name: &str) -> StoreResult<()> {
        self.take_failure(Verb::Delete).await?;
        let removed = self
            .objects
            .write()
            .await
            .remove(&(namespace.to_string(), name.to_string()));
        if removed.is_none() {
            return Err(Self::not_found(namespace, name));
        }
        self.record(Verb::Delete, namespace, name).await;
        Ok(())
    }
}

#[async_trait]
impl StatusWriter for InMemoryStore<CouchDbSource> {
    async fn update_status(&self, source: &CouchDbSource) -> StoreResult<CouchDbSource> {
        self.take_failure(Verb::UpdateStatus).await?;
        let key = key_of(source);
        let mut objects = self.objects.write().await;
        let Some(existing) = objects.get_mut(&key) else {
            return Err(Self::not_found(&key.0, &key.1));
        };
        existing.status = source.status.clone();
        existing.metadata.resource_version = Some(next_resource_version(&existing.metadata));
        let updated = existing.clone();
        drop(objects);

        self.record(Verb::UpdateStatus, &key.0, &key.1).await;
        Ok(updated)
    }
}
