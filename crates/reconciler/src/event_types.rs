//! Event type record synchronization.
//!
//! A source registers one event type per emitted type, but only when its
//! sink is a broker. The synchronizer diffs the owned records against the
//! desired ones by [`EventTypeKey`] and applies the difference: deletes
//! first, then creates, stopping at the first failure. Nothing is rolled
//! back; the next pass diffs again from scratch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use couchdb_source_apis::{CouchDbSource, EventType, EventTypeKey, EVENT_TYPES};
use tracing::{debug, info, warn};

use crate::context::ReconcileContext;
use crate::error::{Error, Result};
use crate::owner::OwnerOf;
use crate::resources::{self, EventTypeArgs};
use crate::semantic::deep_equal;
use crate::store::{Object, ObjectStore};
use crate::types::{ChildAction, EventTypeDiff};

/// Keeps a source's event type records in line with its sink.
pub struct EventTypeSynchronizer {
    event_types: Arc<dyn ObjectStore<EventType>>,
}

impl EventTypeSynchronizer {
    pub fn new(event_types: Arc<dyn ObjectStore<EventType>>) -> Self {
        Self { event_types }
    }

    /// Records the source should own, in [`EVENT_TYPES`] order.
    ///
    /// Empty unless the sink's structured reference is a broker.
    pub fn desired(source: &CouchDbSource, event_origin: &str) -> Vec<EventType> {
        let Some(broker) = source.spec.sink.as_ref().and_then(|s| s.broker_name()) else {
            return Vec::new();
        };
        EVENT_TYPES
            .iter()
            .map(|type_| {
                resources::make_event_type(&EventTypeArgs {
                    source,
                    type_,
                    event_source: event_origin,
                    broker,
                })
            })
            .collect()
    }

    /// Records the source currently owns.
    ///
    /// # Errors
    ///
    /// Returns store and context errors.
    pub async fn current(
        &self,
        ctx: &ReconcileContext,
        source: &CouchDbSource,
    ) -> Result<Vec<EventType>> {
        let selector = resources::labels(source.name());
        let listed = ctx
            .run("list EventType", async {
                self.event_types
                    .list(source.namespace(), &selector)
                    .await
                    .map_err(|e| Error::store("list", EventType::KIND, e))
            })
            .await?;
        Ok(listed.into_iter().filter(|et| et.is_controlled_by(source)).collect())
    }

    /// Diff `current` against `desired`.
    ///
    /// Walks `desired` first, creating what is missing and replacing records
    /// whose spec differs, then walks `current`, deleting what `desired`
    /// does not name. Extra records sharing a key are deleted too. Output
    /// order follows the inputs.
    ///
    /// # Errors
    ///
    /// Returns an error if a spec fails to serialize.
    pub fn compute_diff(current: &[EventType], desired: &[EventType]) -> Result<EventTypeDiff> {
        let mut first_by_key: HashMap<EventTypeKey, usize> = HashMap::new();
        for (idx, et) in current.iter().enumerate() {
            first_by_key.entry(et.key()).or_insert(idx);
        }
        let wanted: HashSet<EventTypeKey> = desired.iter().map(EventType::key).collect();

        let mut diff = EventTypeDiff::default();
        for want in desired {
            match first_by_key.get(&want.key()).and_then(|idx| current.get(*idx)) {
                None => diff.to_create.push(want.clone()),
                Some(have) => {
                    if !deep_equal(&want.spec, &have.spec)? {
                        diff.to_delete.push(have.clone());
                        diff.to_create.push(want.clone());
                    }
                }
            }
        }
        for (idx, have) in current.iter().enumerate() {
            let key = have.key();
            let duplicate = first_by_key.get(&key) != Some(&idx);
            if !wanted.contains(&key) || duplicate {
                diff.to_delete.push(have.clone());
            }
        }
        Ok(diff)
    }

    /// Apply a diff: all deletes, then all creates.
    ///
    /// Returns the writes performed. A record that is already gone counts as
    /// deleted.
    ///
    /// # Errors
    ///
    /// Returns the first store or context error. Earlier writes stay applied.
    pub async fn apply(
        &self,
        ctx: &ReconcileContext,
        diff: &EventTypeDiff,
    ) -> Result<Vec<ChildAction>> {
        let mut actions = Vec::with_capacity(diff.len());

        for et in &diff.to_delete {
            let deleted = ctx
                .run("delete EventType", async {
                    match self.event_types.delete(et.namespace(), et.name()).await {
                        Ok(()) => Ok(true),
                        Err(e) if e.is_not_found() => Ok(false),
                        Err(e) => Err(Error::store("delete", EventType::KIND, e)),
                    }
                })
                .await
                .inspect_err(|e| {
                    warn!(
                        namespace = et.namespace(),
                        event_type = et.name(),
                        error = %e,
                        "Error deleting event type"
                    );
                })?;
            if deleted {
                info!(namespace = et.namespace(), event_type = et.name(), "Deleted event type");
                actions.push(ChildAction::DeleteEventType {
                    name: et.name().to_string(),
                });
            } else {
                debug!(
                    namespace = et.namespace(),
                    event_type = et.name(),
                    "Event type already deleted"
                );
            }
        }

        for et in &diff.to_create {
            let created = ctx
                .run("create EventType", async {
                    self.event_types
                        .create(et)
                        .await
                        .map_err(|e| Error::store("create", EventType::KIND, e))
                })
                .await
                .inspect_err(|e| {
                    warn!(
                        namespace = et.namespace(),
                        event_type = %et.spec.type_,
                        error = %e,
                        "Error creating event type"
                    );
                })?;
            info!(
                namespace = created.namespace(),
                event_type = created.name(),
                type_ = %created.spec.type_,
                broker = %created.spec.broker,
                "Created event type"
            );
            actions.push(ChildAction::CreateEventType {
                type_: created.spec.type_.clone(),
                broker: created.spec.broker.clone(),
            });
        }

        Ok(actions)
    }

    /// Converge the source's event type records.
    ///
    /// # Errors
    ///
    /// Returns the first store or context error.
    pub async fn reconcile(
        &self,
        ctx: &ReconcileContext,
        source: &CouchDbSource,
        event_origin: &str,
    ) -> Result<Vec<ChildAction>> {
        let current = self.current(ctx, source).await?;
        let desired = Self::desired(source, event_origin);
        let diff = Self::compute_diff(&current, &desired)?;
        if diff.is_empty() {
            debug!(
                namespace = source.namespace(),
                name = source.name(),
                count = current.len(),
                "Event types up to date"
            );
            return Ok(Vec::new());
        }
        self.apply(ctx, &diff).await
    }
}
