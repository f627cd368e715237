//! Desired child objects, built purely from their inputs.

use std::collections::BTreeMap;

use couchdb_source_apis::{CouchDbSource, EventType, EventTypeSpec};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{Container, EnvVar, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use sha2::{Digest, Sha256};

use crate::store::Labels;

/// Label identifying objects managed by this controller.
pub const SOURCE_LABEL: &str = "knative-eventing-source";

/// Label carrying the owning source's name.
pub const SOURCE_NAME_LABEL: &str = "knative-eventing-source-name";

pub const CONTROLLER_AGENT_NAME: &str = "couchdbsource-controller";

/// Name of the single container in the receive adapter pod.
pub const ADAPTER_CONTAINER_NAME: &str = "receive-adapter";

const MAX_NAME_LENGTH: usize = 63;
const MAX_SUBDOMAIN_LENGTH: usize = 253;
const HASH_LENGTH: usize = 32;

/// Labels put on every child of the named source. Also the selector used
/// to find them.
pub fn labels(source_name: &str) -> Labels {
    BTreeMap::from([
        (SOURCE_LABEL.to_string(), CONTROLLER_AGENT_NAME.to_string()),
        (SOURCE_NAME_LABEL.to_string(), source_name.to_string()),
    ])
}

/// Deterministic child name of at most 63 characters.
///
/// When `parent + suffix` is too long the parent is shortened and a hash of
/// the full parent keeps the result unique. When not even the hash fits next
/// to the suffix, the name is a hash of `parent + suffix` alone.
pub fn child_name(parent: &str, suffix: &str) -> String {
    let suffix_len = suffix.chars().count();
    if parent.chars().count() + suffix_len <= MAX_NAME_LENGTH {
        return format!("{parent}{suffix}");
    }
    match MAX_NAME_LENGTH.checked_sub(suffix_len + HASH_LENGTH) {
        Some(keep) if keep > 0 => {
            let head: String = parent.chars().take(keep).collect();
            format!("{head}{}{suffix}", short_hash(parent))
        }
        _ => short_hash(&format!("{parent}{suffix}")),
    }
}

fn short_hash(input: &str) -> String {
    Sha256::digest(input.as_bytes())
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<String>()
        .chars()
        .take(HASH_LENGTH)
        .collect()
}

/// Best-effort conversion into a DNS-1123 subdomain.
pub fn to_dns1123_subdomain(name: &str) -> String {
    let lowered: String = name
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .collect();
    lowered
        .trim_matches(|c: char| !c.is_ascii_alphanumeric())
        .chars()
        .take(MAX_SUBDOMAIN_LENGTH)
        .collect()
}

/// Name of the receive adapter deployment for a source.
pub fn receive_adapter_name(source: &CouchDbSource) -> String {
    child_name(&format!("couchdbsource-{}-", source.name()), source.uid())
}

/// Inputs for [`make_receive_adapter`].
#[derive(Debug, Clone)]
pub struct ReceiveAdapterArgs<'a> {
    pub source: &'a CouchDbSource,
    pub image: &'a str,
    pub event_source: &'a str,
    pub sink_uri: &'a str,
    pub labels: Labels,
}

fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        value_from: None,
    }
}

/// Build the receive adapter deployment.
pub fn make_receive_adapter(args: &ReceiveAdapterArgs<'_>) -> Deployment {
    let source = args.source;
    let env = vec![
        env("K_SINK", args.sink_uri),
        env("EVENT_SOURCE", args.event_source),
        env("COUCHDB_CREDENTIALS", &source.spec.credentials.name),
        env("COUCHDB_CREDENTIALS_NAMESPACE", source.credentials_namespace()),
        env("COUCHDB_DATABASE", &source.spec.database),
        env("COUCHDB_FEED", source.spec.feed.as_str()),
        env("NAMESPACE", source.namespace()),
        env("NAME", source.name()),
    ];

    Deployment {
        metadata: ObjectMeta {
            name: Some(receive_adapter_name(source)),
            namespace: Some(source.namespace().to_string()),
            labels: Some(args.labels.clone()),
            owner_references: Some(vec![source.controller_reference()]),
            ..ObjectMeta::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(1),
            selector: LabelSelector {
                match_labels: Some(args.labels.clone()),
                match_expressions: None,
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(args.labels.clone()),
                    annotations: Some(BTreeMap::from([(
                        "sidecar.istio.io/inject".to_string(),
                        "false".to_string(),
                    )])),
                    ..ObjectMeta::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: source
                        .spec
                        .service_account_name
                        .clone()
                        .filter(|sa| !sa.is_empty()),
                    containers: vec![Container {
                        name: ADAPTER_CONTAINER_NAME.to_string(),
                        image: Some(args.image.to_string()),
                        env: Some(env),
                        ..Container::default()
                    }],
                    ..PodSpec::default()
                }),
            },
            ..DeploymentSpec::default()
        }),
        status: None,
    }
}

/// Inputs for [`make_event_type`].
#[derive(Debug, Clone)]
pub struct EventTypeArgs<'a> {
    pub source: &'a CouchDbSource,
    pub type_: &'a str,
    pub event_source: &'a str,
    pub broker: &'a str,
}

/// Build one event type record. The store assigns the final name.
pub fn make_event_type(args: &EventTypeArgs<'_>) -> EventType {
    let source = args.source;
    EventType {
        metadata: ObjectMeta {
            generate_name: Some(format!("{}-", to_dns1123_subdomain(args.type_))),
            namespace: Some(source.namespace().to_string()),
            labels: Some(labels(source.name())),
            owner_references: Some(vec![source.controller_reference()]),
            ..ObjectMeta::default()
        },
        spec: EventTypeSpec {
            type_: args.type_.to_string(),
            source: args.event_source.to_string(),
            schema: String::new(),
            broker: args.broker.to_string(),
            description: None,
        },
    }
}
