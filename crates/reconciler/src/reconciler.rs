//! Reconciler implementation.

use std::sync::Arc;

use chrono::Utc;
use couchdb_source_apis::{CouchDbSource, EventType};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Secret;
use tracing::{debug, error, instrument, warn};

use crate::config::ReconcilerConfig;
use crate::context::ReconcileContext;
use crate::deployment::DeploymentReconciler;
use crate::error::{Error, Result};
use crate::event_types::EventTypeSynchronizer;
use crate::origin;
use crate::owner::SourceIdentity;
use crate::recorder::{EventRecorder, TracingRecorder};
use crate::resolver::SinkResolver;
use crate::store::ObjectStore;
use crate::types::{DeploymentOutcome, ReconcileEvent};

/// Condition reason when the deployment stage fails for a reason of its own.
const DEPLOYMENT_RECONCILE_FAILED: &str = "DeploymentReconcileFailed";

/// Condition reason when event type sync fails.
const EVENT_TYPES_RECONCILE_FAILED: &str = "EventTypesReconcileFailed";

/// K8s-style reconciler for `CouchDbSource`.
///
/// Holds only shared collaborators and immutable config, so one instance
/// serves any number of sources concurrently.
pub struct Reconciler {
    resolver: Arc<dyn SinkResolver>,
    secrets: Arc<dyn ObjectStore<Secret>>,
    deployments: DeploymentReconciler,
    event_types: EventTypeSynchronizer,
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Run one pass over `source`, rewriting its status in place.
    ///
    /// Every condition is recomputed from scratch. Returns `Ok(None)` when
    /// the source converged without writes, and a [`ReconcileEvent`] when the
    /// pass had to write children to get there.
    ///
    /// # Errors
    ///
    /// Whatever stopped the pass. [`Error::is_permanent`] tells the caller
    /// whether a retry can help.
    #[instrument(skip_all, fields(namespace = %source.namespace(), name = %source.name()))]
    pub async fn reconcile_kind(
        &self,
        ctx: &ReconcileContext,
        source: &mut CouchDbSource,
    ) -> Result<Option<ReconcileEvent>> {
        let previous = source.status.conditions.clone();
        let result = self.run_stages(ctx, source).await;
        source.status.stamp_transitions(&previous, Utc::now());
        result
    }

    async fn run_stages(
        &self,
        ctx: &ReconcileContext,
        source: &mut CouchDbSource,
    ) -> Result<Option<ReconcileEvent>> {
        source.status.initialize_conditions();

        // 1. Sink
        let sink_uri = match self.resolve_sink(ctx, source).await {
            Ok(uri) => uri,
            Err(e) => {
                warn!(error = %e, "Unable to resolve sink");
                source.status.mark_no_sink(e.reason(), &e.to_string());
                return Err(e);
            }
        };
        match source.spec.sink.as_ref() {
            Some(sink) if sink.uses_deprecated_ref() => {
                source.status.mark_sink_warn_ref_deprecated(&sink_uri);
            }
            _ => source.status.mark_sink(&sink_uri),
        }

        // 2. Receive adapter
        let deployed = self.reconcile_deployment(ctx, source, &sink_uri).await;
        let (outcome, event_origin) = match deployed {
            Ok(done) => done,
            Err(e) => {
                error!(error = %e, "Unable to create the receive adapter");
                source
                    .status
                    .mark_no_deployment(deployment_failure_reason(&e), &e.to_string());
                return Err(e);
            }
        };
        source.status.propagate_deployment_availability(&outcome.deployment);

        // 3. Event types
        let event_actions = match self.event_types.reconcile(ctx, source, &event_origin).await {
            Ok(actions) => actions,
            Err(e) => {
                error!(error = %e, "Unable to reconcile event types");
                source
                    .status
                    .mark_no_event_types(EVENT_TYPES_RECONCILE_FAILED, &e.to_string());
                return Err(e);
            }
        };
        source.status.mark_event_types();

        let actions: Vec<_> = outcome.action().into_iter().chain(event_actions).collect();
        debug!(writes = actions.len(), ready = source.status.is_ready(), "Reconcile pass complete");
        Ok(ReconcileEvent::reconciled(
            &format!("{}/{}", source.namespace(), source.name()),
            actions,
        ))
    }

    /// Resolve the sink on a namespace-defaulted copy of the destination.
    async fn resolve_sink(&self, ctx: &ReconcileContext, source: &CouchDbSource) -> Result<String> {
        let Some(sink) = source.spec.sink.as_ref().filter(|s| !s.is_empty()) else {
            return Err(Error::SinkMissing);
        };
        let destination = sink.with_default_namespace(source.namespace());
        let parent = SourceIdentity::of(source);
        let uri = ctx
            .run("resolve sink", async {
                self.resolver
                    .uri_from_destination(&destination, &parent)
                    .await
                    .map_err(Error::from)
            })
            .await?;
        Ok(uri.to_string())
    }

    async fn reconcile_deployment(
        &self,
        ctx: &ReconcileContext,
        source: &CouchDbSource,
        sink_uri: &str,
    ) -> Result<(DeploymentOutcome, String)> {
        let event_origin = origin::event_origin(ctx, self.secrets.as_ref(), source).await?;
        let outcome = self
            .deployments
            .reconcile(ctx, source, &event_origin, sink_uri)
            .await?;
        Ok((outcome, event_origin))
    }

    /// Get the configuration.
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }
}

/// Reason recorded on `DeploymentAvailable` when the stage fails.
fn deployment_failure_reason(err: &Error) -> &'static str {
    match err {
        Error::OwnershipConflict { .. }
        | Error::CredentialsNotFound { .. }
        | Error::CredentialsInvalid { .. } => err.reason(),
        _ => DEPLOYMENT_RECONCILE_FAILED,
    }
}

/// Builder for Reconciler.
pub struct ReconcilerBuilder {
    resolver: Option<Arc<dyn SinkResolver>>,
    secrets: Option<Arc<dyn ObjectStore<Secret>>>,
    deployments: Option<Arc<dyn ObjectStore<Deployment>>>,
    event_types: Option<Arc<dyn ObjectStore<EventType>>>,
    recorder: Option<Arc<dyn EventRecorder>>,
    config: ReconcilerConfig,
}

impl ReconcilerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self {
            resolver: None,
            secrets: None,
            deployments: None,
            event_types: None,
            recorder: None,
            config: ReconcilerConfig::default(),
        }
    }

    /// Set the sink resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn SinkResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Set the secret store used for credentials.
    #[must_use]
    pub fn with_secrets(mut self, secrets: Arc<dyn ObjectStore<Secret>>) -> Self {
        self.secrets = Some(secrets);
        self
    }

    #[must_use]
    pub fn with_deployments(mut self, deployments: Arc<dyn ObjectStore<Deployment>>) -> Self {
        self.deployments = Some(deployments);
        self
    }

    #[must_use]
    pub fn with_event_types(mut self, event_types: Arc<dyn ObjectStore<EventType>>) -> Self {
        self.event_types = Some(event_types);
        self
    }

    /// Set the event recorder. Defaults to logging only.
    #[must_use]
    pub fn with_recorder(mut self, recorder: Arc<dyn EventRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Set the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the receive adapter image.
    #[must_use]
    pub fn receive_adapter_image(mut self, image: impl Into<String>) -> Self {
        self.config.receive_adapter_image = image.into();
        self
    }

    /// Build the reconciler.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` when a collaborator is missing or the
    /// configuration does not validate.
    pub fn build(self) -> Result<Reconciler> {
        self.config.validate()?;
        let resolver = self
            .resolver
            .ok_or_else(|| Error::invalid_config("Sink resolver is required"))?;
        let secrets = self
            .secrets
            .ok_or_else(|| Error::invalid_config("Secret store is required"))?;
        let deployments = self
            .deployments
            .ok_or_else(|| Error::invalid_config("Deployment store is required"))?;
        let event_types = self
            .event_types
            .ok_or_else(|| Error::invalid_config("EventType store is required"))?;
        let recorder = self
            .recorder
            .unwrap_or_else(|| Arc::new(TracingRecorder));

        Ok(Reconciler {
            resolver,
            secrets,
            deployments: DeploymentReconciler::new(
                deployments,
                recorder,
                self.config.receive_adapter_image.clone(),
            ),
            event_types: EventTypeSynchronizer::new(event_types),
            config: self.config,
        })
    }
}

impl Default for ReconcilerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
