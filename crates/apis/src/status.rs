//! Observed state of a [`CouchDbSource`](crate::CouchDbSource).
//!
//! Status is a set of conditions. Three of them are dependents of the
//! summary `Ready` condition:
//!
//! - `SinkResolved`: the sink resolved to a URI
//! - `DeploymentAvailable`: the receive adapter deployment is available
//! - `EventTypesReady`: owned event type records match the configuration
//!
//! `Ready` is never marked directly. It is derived from the dependents after
//! every change: False if any dependent is False, True if all are True,
//! Unknown otherwise.

use std::fmt;

use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::Deployment;
use serde::{Deserialize, Serialize};

/// Deployment condition type signalling availability.
const DEPLOYMENT_AVAILABLE: &str = "Available";

/// Condition types tracked on a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    Ready,
    SinkResolved,
    DeploymentAvailable,
    EventTypesReady,
    /// Informational warning about deprecated sink fields.
    Deprecated,
}

impl ConditionType {
    /// Conditions that `Ready` summarizes, in evaluation order.
    pub const DEPENDENTS: [Self; 3] = [
        Self::SinkResolved,
        Self::DeploymentAvailable,
        Self::EventTypesReady,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ready => "Ready",
            Self::SinkResolved => "SinkResolved",
            Self::DeploymentAvailable => "DeploymentAvailable",
            Self::EventTypesReady => "EventTypesReady",
            Self::Deprecated => "Deprecated",
        }
    }
}

impl fmt::Display for ConditionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    fn from_k8s(status: &str) -> Self {
        match status {
            "True" => Self::True,
            "False" => Self::False,
            _ => Self::Unknown,
        }
    }
}

/// Severity of a non-dependent condition. Dependents carry no severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<Severity>,
    /// Machine-readable reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Condition {
    fn new(type_: ConditionType, status: ConditionStatus) -> Self {
        Self {
            type_,
            status,
            severity: None,
            reason: None,
            message: None,
            last_transition_time: None,
        }
    }

    fn with_reason(mut self, reason: &str, message: &str) -> Self {
        self.reason = Some(reason.to_string()).filter(|r| !r.is_empty());
        self.message = Some(message.to_string()).filter(|m| !m.is_empty());
        self
    }

    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CouchDbSourceStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Resolved sink URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sink_uri: Option<String>,
}

impl CouchDbSourceStatus {
    /// Reset every condition to Unknown and clear derived fields.
    ///
    /// Called at the start of each reconcile pass so that nothing from a
    /// previous pass survives unless it is marked again.
    pub fn initialize_conditions(&mut self) {
        self.sink_uri = None;
        self.conditions = std::iter::once(ConditionType::Ready)
            .chain(ConditionType::DEPENDENTS)
            .map(|t| Condition::new(t, ConditionStatus::Unknown))
            .collect();
    }

    pub fn get_condition(&self, type_: ConditionType) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    pub fn is_ready(&self) -> bool {
        self.get_condition(ConditionType::Ready)
            .is_some_and(Condition::is_true)
    }

    pub fn mark_sink(&mut self, uri: &str) {
        self.sink_uri = Some(uri.to_string()).filter(|u| !u.is_empty());
        if self.sink_uri.is_some() {
            self.mark_true(ConditionType::SinkResolved);
        } else {
            self.mark_unknown(
                ConditionType::SinkResolved,
                "SinkEmpty",
                "Sink has resolved to empty.",
            );
        }
    }

    /// Mark the sink resolved and warn that the legacy triple is in use.
    pub fn mark_sink_warn_ref_deprecated(&mut self, uri: &str) {
        self.mark_sink(uri);
        let mut warning = Condition::new(ConditionType::Deprecated, ConditionStatus::True)
            .with_reason(
                "DeprecatedFields",
                "Using deprecated fields when specifying spec.sink. Use spec.sink.ref instead.",
            );
        warning.severity = Some(Severity::Warning);
        self.set(warning);
    }

    pub fn mark_no_sink(&mut self, reason: &str, message: &str) {
        self.sink_uri = None;
        self.mark_false(ConditionType::SinkResolved, reason, message);
    }

    /// Mirror the deployment's own `Available` condition.
    pub fn propagate_deployment_availability(&mut self, deployment: &Deployment) {
        let available = deployment
            .status
            .as_ref()
            .and_then(|s| s.conditions.as_ref())
            .and_then(|conds| conds.iter().find(|c| c.type_ == DEPLOYMENT_AVAILABLE));

        let Some(cond) = available else {
            let name = deployment.metadata.name.as_deref().unwrap_or_default();
            self.mark_unknown(
                ConditionType::DeploymentAvailable,
                "DeploymentUnavailable",
                &format!("The Deployment '{name}' is unavailable."),
            );
            return;
        };

        let reason = cond.reason.as_deref().unwrap_or_default();
        let message = cond.message.as_deref().unwrap_or_default();
        match ConditionStatus::from_k8s(&cond.status) {
            ConditionStatus::True => self.mark_true(ConditionType::DeploymentAvailable),
            ConditionStatus::False => {
                self.mark_false(ConditionType::DeploymentAvailable, reason, message);
            }
            ConditionStatus::Unknown => {
                self.mark_unknown(ConditionType::DeploymentAvailable, reason, message);
            }
        }
    }

    pub fn mark_no_deployment(&mut self, reason: &str, message: &str) {
        self.mark_false(ConditionType::DeploymentAvailable, reason, message);
    }

    pub fn mark_event_types(&mut self) {
        self.mark_true(ConditionType::EventTypesReady);
    }

    pub fn mark_no_event_types(&mut self, reason: &str, message: &str) {
        self.mark_false(ConditionType::EventTypesReady, reason, message);
    }

    /// Stamp `lastTransitionTime` on every condition.
    ///
    /// A condition whose status matches the one in `previous` keeps the
    /// previous timestamp, so a pass that changes nothing leaves the status
    /// equal to what it was.
    pub fn stamp_transitions(&mut self, previous: &[Condition], now: DateTime<Utc>) {
        for cond in &mut self.conditions {
            let carried = previous
                .iter()
                .find(|p| p.type_ == cond.type_ && p.status == cond.status)
                .and_then(|p| p.last_transition_time);
            cond.last_transition_time = carried.or(Some(now));
        }
    }

    fn mark_true(&mut self, type_: ConditionType) {
        self.set(Condition::new(type_, ConditionStatus::True));
    }

    fn mark_false(&mut self, type_: ConditionType, reason: &str, message: &str) {
        self.set(Condition::new(type_, ConditionStatus::False).with_reason(reason, message));
    }

    fn mark_unknown(&mut self, type_: ConditionType, reason: &str, message: &str) {
        self.set(Condition::new(type_, ConditionStatus::Unknown).with_reason(reason, message));
    }

    fn set(&mut self, cond: Condition) {
        match self.conditions.iter_mut().find(|c| c.type_ == cond.type_) {
            Some(existing) => *existing = cond,
            None => self.conditions.push(cond),
        }
        self.recompute_ready();
    }

    fn recompute_ready(&mut self) {
        let dependents: Vec<&Condition> = ConditionType::DEPENDENTS
            .iter()
            .filter_map(|t| self.get_condition(*t))
            .collect();

        let failed = dependents
            .iter()
            .find(|c| c.status == ConditionStatus::False);
        let ready = if let Some(failed) = failed {
            Condition::new(ConditionType::Ready, ConditionStatus::False).with_reason(
                failed.reason.as_deref().unwrap_or_default(),
                failed.message.as_deref().unwrap_or_default(),
            )
        } else if dependents.len() == ConditionType::DEPENDENTS.len()
            && dependents.iter().all(|c| c.is_true())
        {
            Condition::new(ConditionType::Ready, ConditionStatus::True)
        } else {
            Condition::new(ConditionType::Ready, ConditionStatus::Unknown)
        };

        match self.conditions.iter_mut().find(|c| c.type_ == ConditionType::Ready) {
            Some(existing) => *existing = ready,
            None => self.conditions.insert(0, ready),
        }
    }
}
