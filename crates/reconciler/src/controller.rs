//! Entry point for the surrounding control loop.
//!
//! The controller runs a pass on a copy of the source, persists the status
//! when it changed and turns the outcome into a requeue decision.

use std::sync::Arc;

use couchdb_source_apis::CouchDbSource;
use kube::runtime::controller::Action;
use tracing::{debug, info, warn};

use crate::context::ReconcileContext;
use crate::error::{Error, Result};
use crate::recorder::{EventKind, EventRecorder};
use crate::reconciler::Reconciler;
use crate::store::{Object, StatusWriter};

/// Wraps a [`Reconciler`] with status persistence and requeue policy.
pub struct Controller {
    reconciler: Arc<Reconciler>,
    status: Arc<dyn StatusWriter>,
    recorder: Arc<dyn EventRecorder>,
}

impl Controller {
    pub fn new(
        reconciler: Arc<Reconciler>,
        status: Arc<dyn StatusWriter>,
        recorder: Arc<dyn EventRecorder>,
    ) -> Self {
        Self {
            reconciler,
            status,
            recorder,
        }
    }

    /// Reconcile `source` and persist its status.
    ///
    /// The input is never modified. Status is written only when the pass
    /// changed it, and is written even when the pass fails.
    ///
    /// # Errors
    ///
    /// The pass error, or the status write error when the pass succeeded.
    pub async fn reconcile(
        &self,
        ctx: &ReconcileContext,
        source: &CouchDbSource,
    ) -> Result<Action> {
        let config = self.reconciler.config();
        let pass_ctx = match config.reconcile_timeout {
            Some(timeout) => ctx.clone().with_timeout(timeout),
            None => ctx.clone(),
        };

        let mut working = source.clone();
        let outcome = self.reconciler.reconcile_kind(&pass_ctx, &mut working).await;
        working.status.observed_generation = source.metadata.generation;

        let written = self.write_status(ctx, source, &working).await;

        let event = outcome?;
        written?;
        match event {
            Some(event) => {
                self.recorder
                    .event(source, EventKind::Normal, &event.reason, &event.message);
                Ok(Action::await_change())
            }
            None => Ok(config.resync_period.map_or_else(Action::await_change, Action::requeue)),
        }
    }

    /// Requeue policy for a failed pass.
    pub fn error_policy(&self, source: &CouchDbSource, err: &Error) -> Action {
        if err.is_permanent() {
            warn!(
                namespace = source.namespace(),
                name = source.name(),
                reason = err.reason(),
                error = %err,
                "Reconcile failed permanently, waiting for a change"
            );
            self.recorder
                .event(source, EventKind::Warning, err.reason(), &err.to_string());
            return Action::await_change();
        }
        let backoff = self.reconciler.config().retry_backoff;
        info!(
            namespace = source.namespace(),
            name = source.name(),
            reason = err.reason(),
            error = %err,
            backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
            "Reconcile failed, requeueing"
        );
        Action::requeue(backoff)
    }

    /// Reconcile and apply the error policy.
    pub async fn handle(&self, ctx: &ReconcileContext, source: &CouchDbSource) -> Action {
        match self.reconcile(ctx, source).await {
            Ok(action) => action,
            Err(e) => self.error_policy(source, &e),
        }
    }

    async fn write_status(
        &self,
        ctx: &ReconcileContext,
        original: &CouchDbSource,
        working: &CouchDbSource,
    ) -> Result<()> {
        if working.status == original.status {
            debug!(namespace = working.namespace(), name = working.name(), "Status unchanged");
            return Ok(());
        }
        ctx.run("update CouchDbSource status", async {
            self.status
                .update_status(working)
                .await
                .map(|_| ())
                .map_err(|e| Error::store("update status", CouchDbSource::KIND, e))
        })
        .await
        .inspect_err(|e| {
            warn!(
                namespace = working.namespace(),
                name = working.name(),
                error = %e,
                "Failed to update status"
            );
        })
    }
}
