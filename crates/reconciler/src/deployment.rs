//! Receive adapter deployment.
//!
//! One deployment per source, claimed through its controller owner
//! reference. The reconciler creates it when missing, rewrites its pod spec
//! on drift and otherwise leaves it alone. Each call performs at most one
//! write.

use std::sync::Arc;

use couchdb_source_apis::CouchDbSource;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::PodSpec;
use tracing::{debug, info, warn};

use crate::context::ReconcileContext;
use crate::error::{Error, Result};
use crate::owner::OwnerOf;
use crate::recorder::{EventKind, EventRecorder};
use crate::resources::{self, ReceiveAdapterArgs};
use crate::semantic::{deep_derivative, deep_equal};
use crate::store::{Object, ObjectStore};
use crate::types::{DeploymentOp, DeploymentOutcome, DEPLOYMENT_CREATED, DEPLOYMENT_UPDATED};

/// Creates and updates the receive adapter for a source.
pub struct DeploymentReconciler {
    deployments: Arc<dyn ObjectStore<Deployment>>,
    recorder: Arc<dyn EventRecorder>,
    image: String,
}

impl DeploymentReconciler {
    pub fn new(
        deployments: Arc<dyn ObjectStore<Deployment>>,
        recorder: Arc<dyn EventRecorder>,
        image: impl Into<String>,
    ) -> Self {
        Self {
            deployments,
            recorder,
            image: image.into(),
        }
    }

    /// The deployment this source should have.
    pub fn build_desired(
        &self,
        source: &CouchDbSource,
        event_origin: &str,
        sink_uri: &str,
    ) -> Deployment {
        resources::make_receive_adapter(&ReceiveAdapterArgs {
            source,
            image: &self.image,
            event_source: event_origin,
            sink_uri,
            labels: resources::labels(source.name()),
        })
    }

    /// Look the deployment up by its derived name, then by labels.
    ///
    /// A name match is returned whoever owns it. Label matches only count
    /// when the source controls them.
    ///
    /// # Errors
    ///
    /// Returns store errors other than not found, and context errors.
    pub async fn find_existing(
        &self,
        ctx: &ReconcileContext,
        source: &CouchDbSource,
    ) -> Result<Option<Deployment>> {
        let namespace = source.namespace();
        let name = resources::receive_adapter_name(source);

        let by_name = ctx
            .run("get Deployment", async {
                match self.deployments.get(namespace, &name).await {
                    Ok(found) => Ok(Some(found)),
                    Err(e) if e.is_not_found() => Ok(None),
                    Err(e) => Err(Error::store("get", Deployment::KIND, e)),
                }
            })
            .await?;
        if by_name.is_some() {
            return Ok(by_name);
        }

        let selector = resources::labels(source.name());
        let listed = ctx
            .run("list Deployment", async {
                self.deployments
                    .list(namespace, &selector)
                    .await
                    .map_err(|e| Error::store("list", Deployment::KIND, e))
            })
            .await?;
        Ok(listed.into_iter().find(|d| d.is_controlled_by(source)))
    }

    /// Converge the receive adapter.
    ///
    /// # Errors
    ///
    /// `OwnershipConflict` when the existing deployment belongs to someone
    /// else. Store and context errors otherwise.
    pub async fn reconcile(
        &self,
        ctx: &ReconcileContext,
        source: &CouchDbSource,
        event_origin: &str,
        sink_uri: &str,
    ) -> Result<DeploymentOutcome> {
        let desired = self.build_desired(source, event_origin, sink_uri);

        let Some(current) = self.find_existing(ctx, source).await? else {
            let created = ctx
                .run("create Deployment", async {
                    self.deployments
                        .create(&desired)
                        .await
                        .map_err(|e| Error::store("create", Deployment::KIND, e))
                })
                .await?;
            info!(
                namespace = source.namespace(),
                name = source.name(),
                deployment = created.name(),
                "Created receive adapter"
            );
            self.recorder.event(
                source,
                EventKind::Normal,
                DEPLOYMENT_CREATED,
                &format!("Deployment \"{}\" created", created.name()),
            );
            return Ok(DeploymentOutcome {
                deployment: created,
                op: DeploymentOp::Created,
            });
        };

        if !current.is_controlled_by(source) {
            warn!(
                namespace = source.namespace(),
                name = source.name(),
                deployment = current.name(),
                "Receive adapter exists but is not owned by this source"
            );
            return Err(Error::ownership_conflict(Deployment::KIND, current.name(), source.name()));
        }

        let desired_pod = pod_spec(&desired);
        if !pod_spec_changed(&pod_spec(&current), &desired_pod)? {
            debug!(
                namespace = source.namespace(),
                name = source.name(),
                deployment = current.name(),
                "Reusing existing receive adapter"
            );
            return Ok(DeploymentOutcome {
                deployment: current,
                op: DeploymentOp::Unchanged,
            });
        }

        let mut patched = current;
        match patched.spec.as_mut() {
            Some(spec) => spec.template.spec = Some(desired_pod),
            None => patched.spec = desired.spec,
        }
        let updated = ctx
            .run("update Deployment", async {
                self.deployments
                    .update(&patched)
                    .await
                    .map_err(|e| Error::store("update", Deployment::KIND, e))
            })
            .await?;
        info!(
            namespace = source.namespace(),
            name = source.name(),
            deployment = updated.name(),
            "Updated receive adapter"
        );
        self.recorder.event(
            source,
            EventKind::Normal,
            DEPLOYMENT_UPDATED,
            &format!("Deployment \"{}\" updated", updated.name()),
        );
        Ok(DeploymentOutcome {
            deployment: updated,
            op: DeploymentOp::Updated,
        })
    }
}

fn pod_spec(deployment: &Deployment) -> PodSpec {
    deployment
        .spec
        .as_ref()
        .and_then(|s| s.template.spec.clone())
        .unwrap_or_default()
}

/// True when `current` has drifted from `desired`.
///
/// Drift is anything `desired` sets that `current` lacks, a different
/// container count, or any difference in a container's env list. Fields the
/// cluster defaulted in `current` are not drift.
///
/// # Errors
///
/// Returns an error if a pod spec fails to serialize.
pub fn pod_spec_changed(current: &PodSpec, desired: &PodSpec) -> Result<bool> {
    if !deep_derivative(desired, current)? {
        return Ok(true);
    }
    if current.containers.len() != desired.containers.len() {
        return Ok(true);
    }
    for (want, have) in desired.containers.iter().zip(&current.containers) {
        if !deep_equal(&want.env, &have.env)? {
            return Ok(true);
        }
    }
    Ok(false)
}
