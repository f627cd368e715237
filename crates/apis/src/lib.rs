//! Resource types for the CouchDB event source.
//!
//! - [`CouchDbSource`]: the user-declared desired state
//! - [`Destination`]: where produced events are delivered
//! - [`CouchDbSourceStatus`]: observed state as a set of conditions
//! - [`EventType`]: discoverability records derived from a source
//!
//! These are plain data. Everything that talks to a cluster lives in the
//! reconciler crate.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod event_type;
pub mod source;
pub mod status;

pub use event_type::{
    EventType, EventTypeKey, EventTypeSpec, DELETE_EVENT_TYPE, EVENT_TYPES, UPDATE_EVENT_TYPE,
};
pub use source::{
    CouchDbSource, CouchDbSourceSpec, CredentialsReference, Destination, Feed, KReference,
    API_VERSION, BROKER_KIND, KIND,
};
pub use status::{Condition, ConditionStatus, ConditionType, CouchDbSourceStatus, Severity};
