//! End-to-end reconcile passes against in-memory stores.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod common;

use std::time::Duration;

use common::{
    broker_ref, broker_source, service_source, source_with_sink, Fixture, NAMESPACE, ORIGIN,
};
use couchdb_source_apis::{
    ConditionStatus, ConditionType, CouchDbSource, Destination, EventType, EventTypeKey, KReference,
    Severity, BROKER_KIND, DELETE_EVENT_TYPE, UPDATE_EVENT_TYPE,
};
use couchdb_source_reconciler::{
    Action, Error, ReconcileContext, ReconcilerConfig, StoreError, TracingRecorder, Verb,
};
use futures::future::join_all;

fn condition(source: &CouchDbSource, type_: ConditionType) -> (ConditionStatus, Option<String>) {
    let cond = source
        .status
        .get_condition(type_)
        .unwrap_or_else(|| panic!("condition {type_} should be set"));
    (cond.status, cond.reason.clone())
}

fn key(type_: &str) -> EventTypeKey {
    EventTypeKey {
        type_: type_.to_string(),
        source: ORIGIN.to_string(),
        schema: String::new(),
        broker: "default".to_string(),
    }
}

#[tokio::test]
async fn test_broker_sink_creates_adapter_and_two_event_types() {
    let fx = Fixture::new().await;
    let mut source = broker_source();

    let event = fx.reconcile(&mut source).await.expect("pass should succeed");

    assert!(event.is_some_and(|e| e.actions.len() == 3));
    assert_eq!(fx.deployments.objects().await.len(), 1);

    let keys: Vec<EventTypeKey> = fx
        .event_types
        .objects()
        .await
        .iter()
        .map(EventType::key)
        .collect();
    assert_eq!(keys.len(), 2);
    assert!(keys.contains(&key(UPDATE_EVENT_TYPE)));
    assert!(keys.contains(&key(DELETE_EVENT_TYPE)));

    assert_eq!(condition(&source, ConditionType::SinkResolved).0, ConditionStatus::True);
    assert_eq!(condition(&source, ConditionType::EventTypesReady).0, ConditionStatus::True);
    assert_eq!(
        condition(&source, ConditionType::DeploymentAvailable),
        (ConditionStatus::Unknown, Some("DeploymentUnavailable".to_string()))
    );
    assert_eq!(condition(&source, ConditionType::Ready).0, ConditionStatus::Unknown);
    assert_eq!(source.status.sink_uri.as_deref(), Some(common::BROKER_URI));
    assert_eq!(fx.recorder.reasons(), vec!["CouchDbSourceDeploymentCreated"]);
}

#[tokio::test]
async fn test_second_pass_makes_no_writes() {
    let fx = Fixture::new().await;
    let mut source = broker_source();
    fx.reconcile(&mut source).await.expect("first pass should succeed");
    fx.clear_writes().await;
    let status_after_first = source.status.clone();

    let event = fx.reconcile(&mut source).await.expect("second pass should succeed");

    assert!(event.is_none());
    assert_eq!(fx.child_writes().await, 0);
    assert_eq!(source.status, status_after_first);
}

#[tokio::test]
async fn test_ready_once_adapter_is_available() {
    let fx = Fixture::new().await;
    let mut source = broker_source();
    fx.reconcile(&mut source).await.expect("first pass should succeed");
    fx.make_deployment_available().await;

    fx.reconcile(&mut source).await.expect("second pass should succeed");

    assert!(source.status.is_ready());
}

#[tokio::test]
async fn test_missing_sink_is_permanent() {
    let fx = Fixture::new().await;
    let mut source = source_with_sink("orders", None);

    let err = fx.reconcile(&mut source).await.unwrap_err();

    assert!(matches!(err, Error::SinkMissing));
    assert!(err.is_permanent());
    assert_eq!(
        condition(&source, ConditionType::SinkResolved),
        (ConditionStatus::False, Some("SinkMissing".to_string()))
    );
    assert_eq!(
        condition(&source, ConditionType::Ready),
        (ConditionStatus::False, Some("SinkMissing".to_string()))
    );
    assert_eq!(fx.child_writes().await, 0);
}

#[tokio::test]
async fn test_empty_sink_is_missing_not_retryable() {
    let fx = Fixture::new().await;
    let mut source = source_with_sink("orders", Some(Destination::default()));

    let err = fx.reconcile(&mut source).await.unwrap_err();

    assert!(matches!(err, Error::SinkMissing));
    assert!(err.is_permanent());
    assert_eq!(
        condition(&source, ConditionType::SinkResolved),
        (ConditionStatus::False, Some("SinkMissing".to_string()))
    );
    assert_eq!(fx.child_writes().await, 0);
    assert_eq!(fx.controller().error_policy(&source, &err), Action::await_change());
}

#[tokio::test]
async fn test_unresolvable_sink_is_retryable() {
    let fx = Fixture::new().await;
    let mut source = source_with_sink(
        "orders",
        Some(Destination::to_ref(KReference::new(
            "eventing.knative.dev/v1alpha1",
            BROKER_KIND,
            "missing",
        ))),
    );

    let err = fx.reconcile(&mut source).await.unwrap_err();

    assert!(matches!(err, Error::SinkResolution(_)));
    assert!(!err.is_permanent());
    assert_eq!(
        condition(&source, ConditionType::SinkResolved),
        (ConditionStatus::False, Some("NotFound".to_string()))
    );
    assert!(source.status.sink_uri.is_none());
    assert_eq!(fx.child_writes().await, 0);
}

#[tokio::test]
async fn test_switching_away_from_broker_deletes_event_types() {
    let fx = Fixture::new().await;
    let mut source = broker_source();
    fx.reconcile(&mut source).await.expect("broker pass should succeed");
    assert_eq!(fx.event_types.objects().await.len(), 2);
    fx.clear_writes().await;

    source.spec.sink = service_source().spec.sink;
    fx.reconcile(&mut source).await.expect("service pass should succeed");

    assert!(fx.event_types.objects().await.is_empty());
    let deletes = fx
        .event_types
        .writes()
        .await
        .into_iter()
        .filter(|w| w.verb == Verb::Delete)
        .count();
    assert_eq!(deletes, 2);
    assert_eq!(fx.deployments.writes().await.first().map(|w| w.verb), Some(Verb::Update));
    assert_eq!(condition(&source, ConditionType::EventTypesReady).0, ConditionStatus::True);
    assert_eq!(source.status.sink_uri.as_deref(), Some(common::DISPLAY_URI));
}

#[tokio::test]
async fn test_event_type_failure_keeps_deployment_condition() {
    let fx = Fixture::new().await;
    let mut source = broker_source();
    fx.reconcile(&mut source).await.expect("first pass should succeed");
    fx.make_deployment_available().await;
    fx.event_types
        .fail_next(Verb::List, StoreError::unavailable("informer not synced"))
        .await;

    let err = fx.reconcile(&mut source).await.unwrap_err();

    assert!(!err.is_permanent());
    assert_eq!(
        condition(&source, ConditionType::EventTypesReady),
        (ConditionStatus::False, Some("EventTypesReconcileFailed".to_string()))
    );
    assert_eq!(condition(&source, ConditionType::DeploymentAvailable).0, ConditionStatus::True);
    assert_eq!(condition(&source, ConditionType::SinkResolved).0, ConditionStatus::True);
    assert_eq!(condition(&source, ConditionType::Ready).0, ConditionStatus::False);
}

#[tokio::test]
async fn test_partial_event_type_apply_converges_next_pass() {
    let fx = Fixture::new().await;
    let mut source = broker_source();
    fx.event_types
        .fail_next(Verb::Create, StoreError::unavailable("etcd timeout"))
        .await;

    assert!(fx.reconcile(&mut source).await.is_err());
    assert!(fx.event_types.objects().await.is_empty());

    fx.reconcile(&mut source).await.expect("retry should succeed");
    assert_eq!(fx.event_types.objects().await.len(), 2);
    assert_eq!(fx.deployments.objects().await.len(), 1);
}

#[tokio::test]
async fn test_default_sink_namespace_is_not_written_back() {
    let fx = Fixture::new().await;
    let mut source = broker_source();

    fx.reconcile(&mut source).await.expect("pass should succeed");

    let namespace = source
        .spec
        .sink
        .as_ref()
        .and_then(|s| s.reference.as_ref())
        .and_then(|r| r.namespace.clone());
    assert_eq!(namespace, None);
    assert_eq!(broker_source().spec, source.spec);
}

#[tokio::test]
async fn test_deprecated_sink_fields_warn_without_event_types() {
    let fx = Fixture::new().await;
    let mut source = source_with_sink(
        "orders",
        Some(Destination::deprecated(
            broker_ref().api_version,
            BROKER_KIND,
            "default",
        )),
    );

    fx.reconcile(&mut source).await.expect("pass should succeed");

    let warning = source
        .status
        .get_condition(ConditionType::Deprecated)
        .expect("deprecated condition should be set");
    assert_eq!(warning.severity, Some(Severity::Warning));
    assert_eq!(condition(&source, ConditionType::SinkResolved).0, ConditionStatus::True);
    assert!(fx.event_types.objects().await.is_empty());
}

#[tokio::test]
async fn test_missing_credentials_is_retryable() {
    let fx = Fixture::new().await;
    fx.secrets
        .fail_next(Verb::Get, StoreError::not_found("Secret", NAMESPACE, common::SECRET_NAME))
        .await;
    let mut source = broker_source();

    let err = fx.reconcile(&mut source).await.unwrap_err();

    assert!(matches!(err, Error::CredentialsNotFound { .. }));
    assert!(!err.is_permanent());
    assert_eq!(
        condition(&source, ConditionType::DeploymentAvailable),
        (ConditionStatus::False, Some("CredentialsNotFound".to_string()))
    );
    assert_eq!(fx.child_writes().await, 0);
}

#[tokio::test]
async fn test_malformed_credentials_are_permanent() {
    let fx = Fixture::new().await;
    fx.secrets.insert(common::credentials_secret("not a url")).await;
    let mut source = broker_source();

    let err = fx.reconcile(&mut source).await.unwrap_err();

    assert!(matches!(err, Error::CredentialsInvalid { .. }));
    assert!(err.is_permanent());
    assert_eq!(fx.child_writes().await, 0);
}

#[tokio::test]
async fn test_cancelled_context_aborts_pass() {
    let fx = Fixture::new().await;
    let (ctx, handle) = ReconcileContext::new();
    handle.cancel();
    let mut source = broker_source();

    let err = fx.reconciler.reconcile_kind(&ctx, &mut source).await.unwrap_err();

    assert!(matches!(err, Error::Cancelled { .. }));
    assert!(!err.is_permanent());
    assert_eq!(condition(&source, ConditionType::SinkResolved).0, ConditionStatus::False);
    assert_eq!(fx.child_writes().await, 0);
}

#[tokio::test]
async fn test_sources_reconcile_concurrently() {
    let fx = Fixture::new().await;
    let mut sources: Vec<CouchDbSource> = ["orders-a", "orders-b", "orders-c"]
        .iter()
        .map(|name| source_with_sink(name, Some(Destination::to_ref(broker_ref()))))
        .collect();

    let results = join_all(sources.iter_mut().map(|s| fx.reconcile(s))).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(fx.deployments.objects().await.len(), 3);
    assert_eq!(fx.event_types.objects().await.len(), 6);
}

#[tokio::test]
async fn test_controller_persists_status_only_on_change() {
    let fx = Fixture::new().await;
    let controller = fx.controller();
    let ctx = ReconcileContext::background();
    fx.sources.insert(broker_source()).await;

    let first = controller.reconcile(&ctx, &broker_source()).await;
    assert_eq!(first.ok(), Some(Action::await_change()));
    assert_eq!(fx.sources.write_count().await, 1);

    let stored = fx.sources.peek(NAMESPACE, "orders").await.expect("source should be stored");
    assert_eq!(stored.status.observed_generation, Some(1));
    assert!(fx.recorder.reasons().contains(&"CouchDbSourceReconciled".to_string()));

    fx.clear_writes().await;
    let second = controller.reconcile(&ctx, &stored).await;

    assert_eq!(second.ok(), Some(Action::await_change()));
    assert_eq!(fx.sources.write_count().await, 0);
    assert_eq!(fx.child_writes().await, 0);
}

#[tokio::test]
async fn test_controller_resyncs_converged_source() {
    let config = ReconcilerConfig {
        resync_period: Some(Duration::from_secs(600)),
        ..ReconcilerConfig::default().with_image(common::IMAGE)
    };
    let fx = Fixture::with_config(config).await;
    let controller = fx.controller();
    let ctx = ReconcileContext::background();
    fx.sources.insert(broker_source()).await;

    controller.reconcile(&ctx, &broker_source()).await.expect("first pass should succeed");
    let stored = fx.sources.peek(NAMESPACE, "orders").await.expect("source should be stored");

    let action = controller.reconcile(&ctx, &stored).await;
    assert_eq!(action.ok(), Some(Action::requeue(Duration::from_secs(600))));
}

#[tokio::test]
async fn test_controller_error_policy() {
    let fx = Fixture::new().await;
    let controller = fx.controller();
    let ctx = ReconcileContext::background();

    let no_sink = source_with_sink("no-sink", None);
    fx.sources.insert(no_sink.clone()).await;
    assert_eq!(controller.handle(&ctx, &no_sink).await, Action::await_change());

    let stored = fx.sources.peek(NAMESPACE, "no-sink").await.expect("source should be stored");
    assert_eq!(
        condition(&stored, ConditionType::SinkResolved),
        (ConditionStatus::False, Some("SinkMissing".to_string()))
    );
    assert!(fx.recorder.reasons().contains(&"SinkMissing".to_string()));

    let unresolvable = source_with_sink(
        "unresolvable",
        Some(Destination::to_ref(KReference::new("v1", "Service", "nowhere"))),
    );
    fx.sources.insert(unresolvable.clone()).await;
    assert_eq!(
        controller.handle(&ctx, &unresolvable).await,
        Action::requeue(ReconcilerConfig::default().retry_backoff)
    );
}

#[tokio::test]
async fn test_controller_leaves_input_untouched() {
    let fx = Fixture::new().await;
    let controller = couchdb_source_reconciler::Controller::new(
        fx.reconciler.clone(),
        fx.sources.clone(),
        std::sync::Arc::new(TracingRecorder),
    );
    let source = broker_source();
    fx.sources.insert(source.clone()).await;

    controller
        .reconcile(&ReconcileContext::background(), &source)
        .await
        .expect("pass should succeed");

    assert_eq!(source, broker_source());
}
