//! Change propagation against the in-memory host.

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::json;
use tabflow_catalog::{Catalog, Duplicate, Mean, OutputType};
use tabflow_dataset::{ContextSchema, DataSet, Row};
use tabflow_engine::{
  ApplyRequest, ChannelNotifier, EditedOutputPolicy, EngineConfig, EngineError, PropagationEvent,
  SequentialIds, TransformEngine,
};
use tabflow_host::{HostCall, MemoryHost};
use tabflow_registry::{DescriptionKind, RegistryAction, TransformationDescription};
use tokio::sync::mpsc;

use common::{Flaky, Harness, Recording, Shifty, Slow, state, values};

fn output_of(kind: &DescriptionKind) -> String {
  match kind {
    DescriptionKind::DatasetCreator { output, .. } => output.clone(),
    DescriptionKind::FullOverride => panic!("expected a dataset creator"),
  }
}

fn revenue_update(row: u64, revenue: i64) -> Row {
  Row::new(row, values(json!({ "Revenue": revenue })))
}

#[tokio::test]
async fn test_mean_update_invokes_catalog_once_and_writes_once() {
  let (recording, calls) = Recording::new(Mean);
  let mut catalog = Catalog::new();
  catalog.register_creator("Mean", recording);
  let mut h = Harness::new(catalog, EngineConfig::default());

  let stored = state(json!({ "input": "Sales", "attribute": "Revenue" }));
  let description = h
    .engine
    .apply(ApplyRequest::new("Mean", stored.clone()).expecting(OutputType::Text))
    .await
    .expect("apply mean");
  let summary = output_of(&description.kind);
  assert_eq!(h.host.text(&summary).expect("summary text").content, "20");

  calls.lock().expect("calls").clear();
  h.host.clear_calls();

  h.host
    .update_rows("Sales", vec![revenue_update(1, 40)])
    .expect("edit sales");
  h.settle().await;

  assert_eq!(*calls.lock().expect("calls"), vec![stored]);
  let writes: Vec<HostCall> = h
    .host
    .calls()
    .into_iter()
    .filter(|c| matches!(c, HostCall::UpdateText(_) | HostCall::UpdateContext(_)))
    .collect();
  assert_eq!(writes, vec![HostCall::UpdateText(summary.clone())]);
  assert_eq!(h.host.text(&summary).expect("summary text").content, "30");
  assert_eq!(h.engine.errors().get(&description.error_id), None);
}

#[tokio::test]
async fn test_failure_is_isolated_in_either_order() {
  for flaky_first in [true, false] {
    let failing = Arc::new(AtomicBool::new(false));
    let mut catalog = Catalog::new();
    catalog.register_creator("Flaky", Flaky { failing: failing.clone() });
    catalog.register_creator("Copy", Duplicate);
    let mut h = Harness::new(catalog, EngineConfig::default());

    let flaky = ApplyRequest::new("Flaky", state(json!({ "input": "Sales" })));
    let copy = ApplyRequest::new("Copy", state(json!({ "input": "Sales" })));
    let (d1, d2) = if flaky_first {
      let d1 = h.engine.apply(flaky).await.expect("apply flaky");
      (d1, h.engine.apply(copy).await.expect("apply copy"))
    } else {
      let d2 = h.engine.apply(copy).await.expect("apply copy");
      (h.engine.apply(flaky).await.expect("apply flaky"), d2)
    };
    assert_eq!(h.engine.store().bucket("Sales").len(), 2);

    failing.store(true, Ordering::SeqCst);
    h.host
      .update_rows("Sales", vec![revenue_update(2, 99)])
      .expect("edit sales");
    h.settle().await;

    let message = h
      .engine
      .errors()
      .get(&d1.error_id)
      .expect("flaky description carries an error");
    assert!(message.starts_with("Flaky output: "), "got {message}");
    assert!(message.contains("formula could not be evaluated"));

    let copied = h.host.context(&output_of(&d2.kind)).expect("copy output");
    assert_eq!(copied.rows[1].get("Revenue"), &json!(99));
    assert_eq!(h.engine.errors().get(&d2.error_id), None);
  }
}

#[tokio::test]
async fn test_output_is_updated_in_place() {
  let mut h = Harness::builtins();
  let description = h
    .engine
    .apply(ApplyRequest::new("Copy", state(json!({ "input": "Sales" }))))
    .await
    .expect("apply copy");
  let output = output_of(&description.kind);
  let contexts_before = h.host.context_names();

  h.host
    .create_rows("Sales", vec![values(json!({ "Region": "North", "Revenue": 5 }))])
    .expect("add row");
  h.settle().await;

  assert_eq!(h.host.context_names(), contexts_before);
  let after = h.engine.store().find(&description.id).expect("still tracked");
  assert_eq!(output_of(&after.kind), output);
  assert_eq!(h.host.context(&output).expect("output").rows.len(), 4);
  assert_eq!(h.host.context(&output).expect("output").schema.title, "Copy of Sales");
}

#[tokio::test]
async fn test_failed_error_is_cleared_on_next_success() {
  let failing = Arc::new(AtomicBool::new(false));
  let mut catalog = Catalog::new();
  catalog.register_creator("Flaky", Flaky { failing: failing.clone() });
  let mut h = Harness::new(catalog, EngineConfig::default());
  let d = h
    .engine
    .apply(ApplyRequest::new("Flaky", state(json!({ "input": "Sales" }))))
    .await
    .expect("apply");

  failing.store(true, Ordering::SeqCst);
  h.host.update_rows("Sales", vec![revenue_update(1, 1)]).expect("edit");
  h.settle().await;
  assert!(h.engine.errors().get(&d.error_id).is_some());

  failing.store(false, Ordering::SeqCst);
  h.host.update_rows("Sales", vec![revenue_update(1, 2)]).expect("edit");
  h.settle().await;
  assert_eq!(h.engine.errors().get(&d.error_id), None);
}

#[tokio::test]
async fn test_rejected_write_is_reported_with_output_title() {
  let mut h = Harness::builtins();
  let d = h
    .engine
    .apply(ApplyRequest::new(
      "Mean",
      state(json!({ "input": "Sales", "attribute": "Revenue" })),
    ))
    .await
    .expect("apply");
  h.host.reject_writes(&output_of(&d.kind));

  h.host.update_rows("Sales", vec![revenue_update(1, 1)]).expect("edit");
  h.settle().await;

  let message = h.engine.errors().get(&d.error_id).expect("error");
  assert!(message.starts_with("Mean of Sales: "), "got {message}");
  assert!(message.contains("host rejected updateText"), "got {message}");
}

#[tokio::test]
async fn test_missing_output_title_falls_back_to_id() {
  let mut h = Harness::builtins();
  let d = h
    .engine
    .apply(ApplyRequest::new(
      "Mean",
      state(json!({ "input": "Sales", "attribute": "Revenue" })),
    ))
    .await
    .expect("apply");
  let output = output_of(&d.kind);

  // The primary output is not a dependency, so this keeps the description
  h.host.remove_text(&output).expect("remove output");
  h.host.update_rows("Sales", vec![revenue_update(1, 1)]).expect("edit");
  h.settle().await;

  assert!(h.engine.store().find(&d.id).is_some());
  let message = h.engine.errors().get(&d.error_id).expect("error");
  assert!(message.starts_with(&format!("{}: ", output)), "got {message}");
  assert!(message.contains("text component not found"));
}

#[tokio::test]
async fn test_shape_change_at_update_is_reported() {
  let switched = Arc::new(AtomicBool::new(false));
  let mut catalog = Catalog::new();
  catalog.register_creator("Shifty", Shifty { switched: switched.clone() });
  let mut h = Harness::new(catalog, EngineConfig::default());
  let d = h
    .engine
    .apply(ApplyRequest::new(
      "Shifty",
      state(json!({ "input": "Sales", "attribute": "Revenue" })),
    ))
    .await
    .expect("apply");
  let output = output_of(&d.kind);

  switched.store(true, Ordering::SeqCst);
  h.host.update_rows("Sales", vec![revenue_update(1, 1)]).expect("edit");
  h.settle().await;

  let message = h.engine.errors().get(&d.error_id).expect("error");
  assert!(message.contains("expected a text result"), "got {message}");
  assert_eq!(h.host.text(&output).expect("text").content, "20");
}

#[tokio::test]
async fn test_missing_value_report_is_rewritten_in_place() {
  let mut h = Harness::builtins();
  h.host
    .update_rows("Sales", vec![Row::new(2, values(json!({ "Revenue": "n/a" })))])
    .expect("edit");
  h.settle().await;

  let d = h
    .engine
    .apply(ApplyRequest::new(
      "Mean",
      state(json!({ "input": "Sales", "attribute": "Revenue" })),
    ))
    .await
    .expect("apply");
  let DescriptionKind::DatasetCreator {
    missing_value_report: Some(report),
    ..
  } = &d.kind
  else {
    panic!("expected a missing-value report");
  };
  assert!(d.extra_dependencies.contains(report));
  assert_eq!(
    h.host.text(report).expect("report").content,
    "1 row(s) produced no value: 2"
  );
  let texts = h.host.texts().len();

  h.host
    .update_rows("Sales", vec![Row::new(3, values(json!({ "Revenue": null })))])
    .expect("edit");
  h.settle().await;

  assert_eq!(h.host.texts().len(), texts);
  assert_eq!(
    h.host.text(report).expect("report").content,
    "2 row(s) produced no value: 2, 3"
  );
}

#[tokio::test]
async fn test_edited_output_is_skipped_under_skip_policy() {
  let config = EngineConfig {
    edited_output_policy: EditedOutputPolicy::Skip,
    ..EngineConfig::default()
  };
  let mut h = Harness::new(Catalog::with_builtins(), config);
  let d = h
    .engine
    .apply(ApplyRequest::new("Copy", state(json!({ "input": "Sales" }))))
    .await
    .expect("apply");
  let output = output_of(&d.kind);

  let first = h.host.context(&output).expect("output").rows[0].id;
  h.host
    .update_rows(&output, vec![Row::new(first, values(json!({ "Revenue": 1000 })))])
    .expect("hand edit");
  h.settle().await;
  assert!(h.engine.store().is_edited(&output));

  h.host.update_rows("Sales", vec![revenue_update(1, 11)]).expect("edit");
  h.settle().await;

  assert_eq!(
    h.host.context(&output).expect("output").rows[0].get("Revenue"),
    &json!(1000)
  );
  let message = h.engine.errors().get(&d.error_id).expect("skip message");
  assert!(message.contains("edited by hand"));
  assert!(h.engine.save_state()["editedOutputs"]
    .as_array()
    .expect("edited list")
    .contains(&json!(output)));
}

#[tokio::test]
async fn test_edited_output_is_overwritten_by_default() {
  let mut h = Harness::builtins();
  let d = h
    .engine
    .apply(ApplyRequest::new("Copy", state(json!({ "input": "Sales" }))))
    .await
    .expect("apply");
  let output = output_of(&d.kind);

  let first = h.host.context(&output).expect("output").rows[0].id;
  h.host
    .update_rows(&output, vec![Row::new(first, values(json!({ "Revenue": 1000 })))])
    .expect("hand edit");
  h.host.update_rows("Sales", vec![revenue_update(1, 11)]).expect("edit");
  h.settle().await;

  assert_eq!(
    h.host.context(&output).expect("output").rows[0].get("Revenue"),
    &json!(11)
  );
  assert!(!h.engine.store().is_edited(&output));
  assert_eq!(h.engine.errors().get(&d.error_id), None);
}

#[tokio::test]
async fn test_failed_overwrite_keeps_the_edited_mark() {
  let failing = Arc::new(AtomicBool::new(false));
  let mut catalog = Catalog::new();
  catalog.register_creator("Flaky", Flaky { failing: failing.clone() });
  let mut h = Harness::new(catalog, EngineConfig::default());
  let d = h
    .engine
    .apply(ApplyRequest::new("Flaky", state(json!({ "input": "Sales" }))))
    .await
    .expect("apply");
  let output = output_of(&d.kind);

  let first = h.host.context(&output).expect("output").rows[0].id;
  h.host
    .update_rows(&output, vec![Row::new(first, values(json!({ "Revenue": 1000 })))])
    .expect("hand edit");
  failing.store(true, Ordering::SeqCst);
  h.host.update_rows("Sales", vec![revenue_update(1, 11)]).expect("edit");
  h.settle().await;

  assert!(h.engine.errors().get(&d.error_id).is_some());
  assert!(h.engine.store().is_edited(&output));
  assert_eq!(
    h.host.context(&output).expect("output").rows[0].get("Revenue"),
    &json!(1000)
  );

  failing.store(false, Ordering::SeqCst);
  h.host.update_rows("Sales", vec![revenue_update(1, 12)]).expect("edit");
  h.settle().await;

  assert_eq!(h.engine.errors().get(&d.error_id), None);
  assert!(!h.engine.store().is_edited(&output));
  assert_eq!(
    h.host.context(&output).expect("output").rows[0].get("Revenue"),
    &json!(12)
  );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_shared_output_is_never_written_concurrently() {
  let (slow, overlapped) = Slow::new();
  let mut catalog = Catalog::new();
  catalog.register_creator("Slow", slow);
  let mut h = Harness::new(catalog, EngineConfig::default());
  h.host.seed_context(DataSet::new(
    ContextSchema::flat("Costs", &["Region", "Revenue"]),
    vec![Row::new(10, values(json!({ "Region": "West", "Revenue": 5 })))],
  ));

  let first = h
    .engine
    .apply(ApplyRequest::new("Slow", state(json!({ "input": "Sales" }))))
    .await
    .expect("apply");
  let output = output_of(&first.kind);
  // A second description in another bucket writing the same output
  h.engine
    .store()
    .dispatch(RegistryAction::Add(TransformationDescription::dataset_creator(
      "costs-copy",
      "costs-copy-error",
      "Slow",
      vec!["Costs".to_string()],
      state(json!({ "input": "Costs" })),
      OutputType::Context,
      output.clone(),
    )))
    .expect("track second writer");
  assert!(!overlapped.load(Ordering::SeqCst));

  h.host.update_rows("Sales", vec![revenue_update(1, 11)]).expect("edit sales");
  h.host
    .update_rows("Costs", vec![Row::new(10, values(json!({ "Revenue": 6 })))])
    .expect("edit costs");
  h.settle().await;

  assert!(!overlapped.load(Ordering::SeqCst), "writes to {output} overlapped");
  assert_eq!(h.engine.errors().get(&first.error_id), None);
  assert_eq!(h.engine.errors().get("costs-copy-error"), None);
}

#[tokio::test]
async fn test_invalid_requests_never_reach_the_host() {
  let h = Harness::builtins();
  h.host.clear_calls();

  let unknown = h
    .engine
    .apply(ApplyRequest::new("Pivot", state(json!({ "input": "Sales" }))))
    .await;
  let incomplete = h
    .engine
    .apply(ApplyRequest::new("Mean", state(json!({ "input": "Sales" }))))
    .await;
  let wrong_shape = h
    .engine
    .apply(
      ApplyRequest::new("Mean", state(json!({ "input": "Sales", "attribute": "Revenue" })))
        .expecting(OutputType::Context),
    )
    .await;

  for result in [unknown, incomplete, wrong_shape] {
    assert!(matches!(result, Err(EngineError::Validation { .. })));
  }
  assert!(h.host.calls().is_empty());
  assert!(h.engine.store().registry().is_empty());
}

#[tokio::test]
async fn test_compute_error_at_creation_tracks_nothing() {
  let h = Harness::builtins();
  let result = h
    .engine
    .apply(ApplyRequest::new(
      "Mean",
      state(json!({ "input": "Sales", "attribute": "Region" })),
    ))
    .await;

  assert!(matches!(result, Err(EngineError::Transform(_))));
  assert!(h.engine.store().registry().is_empty());
  assert!(h.host.texts().is_empty());
}

#[tokio::test]
async fn test_events_bracket_each_bucket() {
  let host = Arc::new(MemoryHost::new());
  host.seed_context(common::sales());
  let (tx, mut rx) = mpsc::unbounded_channel();
  let engine = TransformEngine::builder(host.clone())
    .ids(Arc::new(SequentialIds::new()))
    .notifier(Arc::new(ChannelNotifier::new(tx)))
    .build();
  let d = engine
    .apply(ApplyRequest::new("Copy", state(json!({ "input": "Sales" }))))
    .await
    .expect("apply");

  let mut notifications = host.subscribe();
  host.update_rows("Sales", vec![revenue_update(1, 3)]).expect("edit");
  let envelope = notifications.recv().await.expect("notification");
  engine.handle_envelope(envelope).await.expect("valid envelope");

  let events: Vec<PropagationEvent> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
  assert_eq!(
    events,
    vec![
      PropagationEvent::BucketStarted {
        source: "Sales".to_string(),
        descriptions: 1,
      },
      PropagationEvent::DescriptionUpdated {
        source: "Sales".to_string(),
        description_id: d.id.clone(),
        outputs: vec![output_of(&d.kind)],
      },
      PropagationEvent::BucketFinished {
        source: "Sales".to_string(),
        updated: 1,
        failed: 0,
        skipped: 0,
      },
    ]
  );
}

#[tokio::test]
async fn test_repeated_reads_in_one_cycle_hit_the_cache() {
  let mut h = Harness::builtins();
  for attribute in ["Revenue", "Region"] {
    let transformer = if attribute == "Revenue" { "Mean" } else { "Count" };
    h.engine
      .apply(ApplyRequest::new(
        transformer,
        state(json!({ "input": "Sales", "attribute": attribute })),
      ))
      .await
      .expect("apply");
  }
  h.host.clear_calls();

  h.host.update_rows("Sales", vec![revenue_update(1, 7)]).expect("edit");
  h.settle().await;

  let reads = h
    .host
    .calls()
    .iter()
    .filter(|c| **c == HostCall::GetDataSet("Sales".to_string()))
    .count();
  assert_eq!(reads, 1);
  assert!(h.engine.cache_stats().hits > 0);
}
