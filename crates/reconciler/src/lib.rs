//! K8s-style reconciler for `CouchDbSource`.
//!
//! A source declares a CouchDB database and a sink. Each reconcile pass
//! drives the cluster toward that declaration in three stages:
//!
//! - **Sink**: resolve the sink destination to a URI
//! - **Receive adapter**: create or update the single deployment that
//!   forwards database changes to the sink
//! - **Event types**: keep the owned event type records in sync, one per
//!   emitted type, only when the sink is a broker
//!
//! Status conditions are recomputed from scratch on every pass, and a pass
//! with nothing to do performs no writes.
//!
//! # Key Concepts
//!
//! ## Ownership
//!
//! Children are claimed only through their controller owner reference. An
//! object with the expected name but another owner is a permanent conflict.
//!
//! ## Collaborators
//!
//! Every cluster interaction goes through an injected trait object:
//! [`ObjectStore`] per kind, [`SinkResolver`], [`EventRecorder`] and
//! [`StatusWriter`]. In-memory implementations ship for tests and local runs.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use couchdb_source_reconciler::{
//!     Controller, InMemoryStore, ReconcileContext, ReconcilerBuilder, ReconcilerConfig,
//!     StaticSinkResolver, TracingRecorder,
//! };
//!
//! #[tokio::main]
//! async fn main() -> couchdb_source_reconciler::Result<()> {
//!     let sources = InMemoryStore::new_arc();
//!     let reconciler = ReconcilerBuilder::new()
//!         .with_config(ReconcilerConfig::from_env()?)
//!         .with_resolver(Arc::new(StaticSinkResolver::new()))
//!         .with_secrets(InMemoryStore::new_arc())
//!         .with_deployments(InMemoryStore::new_arc())
//!         .with_event_types(InMemoryStore::new_arc())
//!         .build()?;
//!     let controller = Controller::new(Arc::new(reconciler), sources, Arc::new(TracingRecorder));
//!
//!     // for each changed source:
//!     // let action = controller.handle(&ReconcileContext::background(), &source).await;
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod config;
pub mod context;
pub mod controller;
pub mod deployment;
pub mod error;
pub mod event_types;
pub mod origin;
pub mod owner;
pub mod reconciler;
pub mod recorder;
pub mod resolver;
pub mod resources;
pub mod semantic;
pub mod store;
pub mod types;

// Re-export main types
pub use config::ReconcilerConfig;
pub use context::{CancelHandle, ReconcileContext};
pub use controller::Controller;
pub use kube::runtime::controller::Action;
pub use deployment::{pod_spec_changed, DeploymentReconciler};
pub use error::{Error, Result};
pub use event_types::EventTypeSynchronizer;
pub use owner::{OwnerOf, SourceIdentity};
pub use reconciler::{Reconciler, ReconcilerBuilder};
pub use recorder::{EventKind, EventRecorder, InMemoryRecorder, RecordedEvent, TracingRecorder};
pub use resolver::{ResolveError, SinkResolver, StaticSinkResolver};
pub use store::{
    InMemoryStore, Labels, Object, ObjectStore, StatusWriter, StoreError, StoreResult, Verb,
    WriteOp,
};
pub use types::{ChildAction, DeploymentOp, DeploymentOutcome, EventTypeDiff, ReconcileEvent};
