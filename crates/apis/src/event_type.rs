//! Event type registration records.

use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

/// Emitted when a document is created or updated.
pub const UPDATE_EVENT_TYPE: &str = "org.apache.couchdb.document.update";

/// Emitted when a document is deleted.
pub const DELETE_EVENT_TYPE: &str = "org.apache.couchdb.document.delete";

/// Every event type a source can emit, in registration order.
pub const EVENT_TYPES: [&str; 2] = [UPDATE_EVENT_TYPE, DELETE_EVENT_TYPE];

/// Discoverability record: "this source may emit `type` from `source` into
/// `broker`".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventType {
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: EventTypeSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTypeSpec {
    #[serde(rename = "type")]
    pub type_: String,
    /// CloudEvent `source` attribute.
    pub source: String,
    #[serde(default)]
    pub schema: String,
    pub broker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl EventType {
    pub fn key(&self) -> EventTypeKey {
        self.spec.key()
    }

    pub fn name(&self) -> &str {
        self.metadata.name.as_deref().unwrap_or_default()
    }
}

impl EventTypeSpec {
    pub fn key(&self) -> EventTypeKey {
        EventTypeKey {
            type_: self.type_.clone(),
            source: self.source.clone(),
            schema: self.schema.clone(),
            broker: self.broker.clone(),
        }
    }
}

/// Identity of an event type record.
///
/// Two records with the same key describe the same registration, however
/// their other spec fields differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventTypeKey {
    pub type_: String,
    pub source: String,
    pub schema: String,
    pub broker: String,
}

impl fmt::Display for EventTypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}_{}", self.type_, self.source, self.schema, self.broker)
    }
}
