//! Core types for the reconciler.

use std::fmt;

use couchdb_source_apis::EventType;
use itertools::Itertools;
use k8s_openapi::api::apps::v1::Deployment;

/// Notification reason for a newly created receive adapter.
pub const DEPLOYMENT_CREATED: &str = "CouchDbSourceDeploymentCreated";

/// Notification reason for an updated receive adapter.
pub const DEPLOYMENT_UPDATED: &str = "CouchDbSourceDeploymentUpdated";

/// Reason of the success event returned when a pass wrote children.
pub const SOURCE_RECONCILED: &str = "CouchDbSourceReconciled";

/// A write the reconciler performed against a child object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildAction {
    /// Create the receive adapter deployment.
    CreateDeployment { name: String },
    /// Replace the receive adapter's pod spec.
    UpdateDeployment { name: String },
    /// Create an event type record.
    CreateEventType { type_: String, broker: String },
    /// Delete an event type record.
    DeleteEventType { name: String },
}

impl ChildAction {
    /// Get a description of the action.
    pub fn description(&self) -> String {
        match self {
            Self::CreateDeployment { name } => format!("create deployment {name}"),
            Self::UpdateDeployment { name } => format!("update deployment {name}"),
            Self::CreateEventType { type_, broker } => {
                format!("create event type {type_} for broker {broker}")
            }
            Self::DeleteEventType { name } => format!("delete event type {name}"),
        }
    }
}

impl fmt::Display for ChildAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description())
    }
}

/// What the deployment stage did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentOp {
    Created,
    Updated,
    Unchanged,
}

/// Deployment stage result.
#[derive(Debug, Clone)]
pub struct DeploymentOutcome {
    /// The deployment as the store now holds it.
    pub deployment: Deployment,
    pub op: DeploymentOp,
}

impl DeploymentOutcome {
    /// The write this outcome stands for, if any.
    pub fn action(&self) -> Option<ChildAction> {
        let name = self.deployment.metadata.name.clone().unwrap_or_default();
        match self.op {
            DeploymentOp::Created => Some(ChildAction::CreateDeployment { name }),
            DeploymentOp::Updated => Some(ChildAction::UpdateDeployment { name }),
            DeploymentOp::Unchanged => None,
        }
    }
}

/// Minimal set of event type writes.
///
/// A record whose key matches but whose spec differs appears in both lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventTypeDiff {
    pub to_create: Vec<EventType>,
    pub to_delete: Vec<EventType>,
}

impl EventTypeDiff {
    /// Check if there is nothing to do.
    pub fn is_empty(&self) -> bool {
        self.to_create.is_empty() && self.to_delete.is_empty()
    }

    /// Number of writes applying this diff takes.
    pub fn len(&self) -> usize {
        self.to_create.len() + self.to_delete.len()
    }
}

/// Event returned by a pass that converged after writing children.
///
/// The caller treats it as success and skips the requeue: the child writes
/// trigger the next pass on their own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileEvent {
    pub reason: String,
    pub message: String,
    pub actions: Vec<ChildAction>,
}

impl ReconcileEvent {
    /// Success event summarizing `actions`. `None` when nothing was written.
    pub fn reconciled(source: &str, actions: Vec<ChildAction>) -> Option<Self> {
        if actions.is_empty() {
            return None;
        }
        let message = format!(
            "CouchDbSource reconciled: \"{source}\" ({})",
            actions.iter().map(ChildAction::description).join(", ")
        );
        Some(Self {
            reason: SOURCE_RECONCILED.to_string(),
            message,
            actions,
        })
    }
}
