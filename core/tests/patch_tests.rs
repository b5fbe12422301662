// tests/patch_tests.rs
mod common;

use common::*;
use reconstep::{
  patch, patch_with_condition, ClientError, ConditionResult, ConfigError, ConditionStatus, ObjectCell, ObjectKey, OperationResult,
  PatchCycle, ReconcileError, ResourceClient, StepError, StepOptions,
};
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};

async fn fetched(client: &reconstep::MemoryClient<Widget>, key: &ObjectKey) -> ObjectCell<Widget> {
  ObjectCell::new(client.get(key).await.expect("get"))
}

#[tokio::test]
#[serial]
async fn test_status_only_change_patches_status_only() {
  setup_tracing();
  let (client, key) = seeded("status-only");
  let cell = fetched(&client, &key).await;
  client.reset_calls();

  let live = cell.clone();
  let patched = patch(&*client, &cell, move || async move {
    live.write().status.ready_replicas = Some(1);
    Ok::<(), anyhow::Error>(())
  })
  .await
  .expect("patch");

  assert_eq!(patched.operation, OperationResult::UpdatedStatusOnly);
  let calls = client.calls();
  assert_eq!((calls.patch, calls.patch_status), (0, 1));
  assert_eq!(stored(&client, &key).status.ready_replicas, Some(1));
}

#[tokio::test]
#[serial]
async fn test_main_only_change_patches_main_only() {
  setup_tracing();
  let (client, key) = seeded("main-only");
  let cell = fetched(&client, &key).await;
  client.reset_calls();

  let live = cell.clone();
  let patched = patch(&*client, &cell, move || async move {
    live.write().spec.replicas = 4;
    Ok::<(), anyhow::Error>(())
  })
  .await
  .expect("patch");

  assert_eq!(patched.operation, OperationResult::Updated);
  let calls = client.calls();
  assert_eq!((calls.patch, calls.patch_status), (1, 0));
  assert_eq!(stored(&client, &key).spec.replicas, 4);
}

#[tokio::test]
#[serial]
async fn test_main_and_status_change_patch_both() {
  setup_tracing();
  let (client, key) = seeded("both");
  let cell = fetched(&client, &key).await;
  client.reset_calls();

  let live = cell.clone();
  let patched = patch(&*client, &cell, move || async move {
    let mut guard = live.write();
    guard.spec.replicas = 2;
    guard.status.ready_replicas = Some(2);
    Ok::<(), anyhow::Error>(())
  })
  .await
  .expect("patch");

  assert_eq!(patched.operation, OperationResult::UpdatedStatus);
  let widget = stored(&client, &key);
  assert_eq!(widget.spec.replicas, 2);
  assert_eq!(widget.status.ready_replicas, Some(2));
  // The cell reflects what was persisted, status included.
  assert_eq!(*cell.read(), widget);
}

#[tokio::test]
#[serial]
async fn test_no_change_issues_no_write() {
  setup_tracing();
  let (client, key) = seeded("untouched");
  let cell = fetched(&client, &key).await;
  client.reset_calls();

  let live = cell.clone();
  let patched = patch(&*client, &cell, move || async move {
    // Writing the same value is not a change.
    live.write().spec.replicas = 1;
    Ok::<(), anyhow::Error>(())
  })
  .await
  .expect("patch");

  assert_eq!(patched.operation, OperationResult::NoChange);
  assert_eq!(client.calls().writes(), 0);
}

#[tokio::test]
#[serial]
async fn test_mutation_error_aborts_by_default() {
  setup_tracing();
  let (client, key) = seeded("abort");
  let cell = fetched(&client, &key).await;
  client.reset_calls();

  let live = cell.clone();
  let patched = patch(&*client, &cell, move || async move {
    live.write().spec.replicas = 9;
    Err::<(), anyhow::Error>(anyhow::anyhow!("validation failed"))
  })
  .await
  .expect("mutation errors are not fatal");

  assert_eq!(patched.operation, OperationResult::NoChange);
  assert_eq!(client.calls().writes(), 0);
  assert_eq!(stored(&client, &key).spec.replicas, 1);
  let err = patched.into_result().expect_err("mutation error is handed back");
  assert_eq!(err.to_string(), "validation failed");
}

#[tokio::test]
#[serial]
async fn test_partial_mutation_is_persisted_when_requested() {
  setup_tracing();
  let (client, key) = seeded("persist");
  let cell = fetched(&client, &key).await;

  let live = cell.clone();
  let patched = PatchCycle::new(&*client, &cell)
    .persist_on_mutate_error()
    .run(move || async move {
      live.write().status.ready_replicas = Some(0);
      Err::<(), anyhow::Error>(anyhow::anyhow!("only half done"))
    })
    .await
    .expect("patch");

  assert_eq!(patched.operation, OperationResult::UpdatedStatusOnly);
  assert!(patched.mutate_error.is_some());
  assert_eq!(stored(&client, &key).status.ready_replicas, Some(0));
}

#[tokio::test]
#[serial]
async fn test_identity_change_is_fatal() {
  setup_tracing();
  let (client, key) = seeded("renamed");
  let cell = fetched(&client, &key).await;
  client.reset_calls();

  let live = cell.clone();
  let result = patch(&*client, &cell, move || async move {
    live.write().metadata.name = "other".to_string();
    Ok::<(), anyhow::Error>(())
  })
  .await;

  assert!(matches!(result, Err(ReconcileError::IdentityChanged { .. })));
  assert_eq!(client.calls().writes(), 0);
}

#[tokio::test]
#[serial]
async fn test_on_change_runs_only_when_something_changed() {
  setup_tracing();
  let (client, key) = seeded("hooked");
  let cell = fetched(&client, &key).await;
  let hook_calls = AtomicUsize::new(0);

  let live = cell.clone();
  let patched = PatchCycle::new(&*client, &cell)
    .on_change(|w: &mut Widget| {
      hook_calls.fetch_add(1, Ordering::SeqCst);
      w.status.ready_replicas = Some(w.spec.replicas);
    })
    .run(move || async move {
      live.write().spec.replicas = 6;
      Ok::<(), anyhow::Error>(())
    })
    .await
    .expect("patch");
  assert_eq!(patched.operation, OperationResult::UpdatedStatus);
  assert_eq!(stored(&client, &key).status.ready_replicas, Some(6));

  let patched = PatchCycle::new(&*client, &cell)
    .on_change(|_w: &mut Widget| {
      hook_calls.fetch_add(1, Ordering::SeqCst);
    })
    .run(|| async { Ok::<(), anyhow::Error>(()) })
    .await
    .expect("patch");
  assert_eq!(patched.operation, OperationResult::NoChange);
  assert_eq!(hook_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
#[serial]
async fn test_stale_base_surfaces_conflict() {
  setup_tracing();
  let (client, key) = seeded("stale");
  let cell = fetched(&client, &key).await;

  let live = cell.clone();
  let writer = client.clone();
  let result = patch(&*client, &cell, move || async move {
    let concurrent = writer.peek(&key).expect("stored");
    writer.insert(concurrent).expect("concurrent write");
    live.write().spec.replicas = 3;
    Ok::<(), anyhow::Error>(())
  })
  .await;

  match result {
    Err(ReconcileError::Client(err)) => assert!(err.is_conflict(), "{}", err),
    other => panic!("expected a conflict, got {:?}", other),
  }
}

#[tokio::test]
#[serial]
async fn test_missing_object_is_not_found() {
  setup_tracing();
  let (client, _) = seeded("exists");
  let cell = ObjectCell::new(widget("missing"));

  let result = patch(&*client, &cell, || async { Ok::<(), anyhow::Error>(()) }).await;
  assert!(matches!(
    result,
    Err(ReconcileError::Client(ClientError::NotFound { .. }))
  ));
}

#[tokio::test]
#[serial]
async fn test_patch_with_condition_records_success() {
  setup_tracing();
  let (client, key) = seeded("single");
  let cell = fetched(&client, &key).await;

  let patched = patch_with_condition(&*client, &cell, "Synced", set_endpoint, StepOptions::new())
    .await
    .expect("patch");

  assert_eq!(patched.operation, OperationResult::UpdatedStatus);
  assert!(patched.mutate_error.is_none());
  let widget = stored(&client, &key);
  assert_eq!(widget.spec.endpoint.as_deref(), Some("single.svc:8080"));
  let synced = condition(&widget, "Synced");
  assert_eq!(synced.status, ConditionStatus::True);
  assert_eq!(synced.reason, "SyncedSucceeded");
}

#[tokio::test]
#[serial]
async fn test_patch_with_condition_records_failure() {
  setup_tracing();
  let (client, key) = seeded("single-fail");
  let cell = fetched(&client, &key).await;
  client.reset_calls();

  let patched = patch_with_condition(
    &*client,
    &cell,
    "Synced",
    |_cell: ObjectCell<Widget>| async move {
      Err::<(), StepError>(ConditionResult::fail("UpstreamDown", "upstream returned 503").into())
    },
    StepOptions::new().set_processing(),
  )
  .await
  .expect("failures are handed back, not fatal");

  assert_eq!(client.calls().update_status, 1);
  assert_eq!(patched.operation, OperationResult::UpdatedStatusOnly);
  assert!(patched.mutate_error.is_some());

  let synced = condition(&stored(&client, &key), "Synced");
  assert_eq!(synced.status, ConditionStatus::False);
  assert_eq!(synced.reason, "UpstreamDown");
  assert_eq!(synced.message, "upstream returned 503");
}

#[tokio::test]
#[serial]
async fn test_patch_with_condition_rejects_invalid_configuration() {
  setup_tracing();
  let (client, key) = seeded("single-invalid");
  let cell = fetched(&client, &key).await;
  client.reset_calls();

  let result = patch_with_condition(&*client, &cell, "", succeed, StepOptions::new()).await;
  assert!(matches!(
    result,
    Err(ReconcileError::Config(ConfigError::EmptyConditionType))
  ));

  let result = patch_with_condition(
    &*client,
    &cell,
    "Synced",
    succeed,
    StepOptions::new().set_processing().default_fail_reason("Sync Failed"),
  )
  .await;
  match result {
    Err(ReconcileError::Config(ConfigError::InvalidReason { reason })) => assert_eq!(reason, "Sync Failed"),
    other => panic!("expected an invalid reason error, got {:?}", other.map(|p| p.operation)),
  }

  assert_eq!(client.calls().writes(), 0);
  assert!(stored(&client, &key).status.condition_phase.conditions.is_empty());
}
