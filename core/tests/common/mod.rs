// tests/common/mod.rs
#![allow(dead_code)] // Allow unused code in this common test module

use once_cell::sync::Lazy;
use reconstep::{
  Condition, ConditionPhase, ConditionResult, MemoryClient, ObjectCell, ObjectKey, ObjectMeta, Resource, StepEngine,
  StepEngineBuilder, StepError, StepResult,
};
use serde::{Deserialize, Serialize};
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use tracing::Level;

pub const NAMESPACE: &str = "default";

// --- Test resource ---
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Widget {
  pub metadata: ObjectMeta,
  #[serde(default)]
  pub spec: WidgetSpec,
  #[serde(default)]
  pub status: WidgetStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetSpec {
  pub replicas: u32,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetStatus {
  #[serde(flatten)]
  pub condition_phase: ConditionPhase,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub ready_replicas: Option<u32>,
}

impl Resource for Widget {
  fn meta(&self) -> &ObjectMeta {
    &self.metadata
  }

  fn meta_mut(&mut self) -> &mut ObjectMeta {
    &mut self.metadata
  }

  fn condition_phase(&self) -> &ConditionPhase {
    &self.status.condition_phase
  }

  fn condition_phase_mut(&mut self) -> &mut ConditionPhase {
    &mut self.status.condition_phase
  }
}

pub fn widget(name: &str) -> Widget {
  Widget {
    metadata: ObjectMeta::new(NAMESPACE, name),
    spec: WidgetSpec {
      replicas: 1,
      endpoint: None,
    },
    status: WidgetStatus::default(),
  }
}

/// A memory client holding one freshly inserted widget.
pub fn seeded(name: &str) -> (Arc<MemoryClient<Widget>>, ObjectKey) {
  let client = Arc::new(MemoryClient::new());
  let stored = client.insert(widget(name)).expect("insert widget");
  (client, stored.key())
}

pub fn builder(client: &Arc<MemoryClient<Widget>>) -> StepEngineBuilder<Widget, MemoryClient<Widget>> {
  StepEngine::builder(client.clone())
}

pub fn condition(widget: &Widget, condition_type: &str) -> Condition {
  widget
    .condition_phase()
    .find_condition(condition_type)
    .cloned()
    .unwrap_or_else(|| panic!("condition {} should be set", condition_type))
}

pub fn stored(client: &MemoryClient<Widget>, key: &ObjectKey) -> Widget {
  client.peek(key).expect("widget should be stored")
}

// --- Common transition functions ---
pub async fn succeed(_cell: ObjectCell<Widget>) -> StepResult {
  Ok(())
}

pub async fn set_endpoint(cell: ObjectCell<Widget>) -> StepResult {
  let mut guard = cell.write();
  guard.spec.endpoint = Some(format!("{}.svc:8080", guard.metadata.name));
  Ok(())
}

pub async fn report_ready_replicas(cell: ObjectCell<Widget>) -> StepResult {
  let mut guard = cell.write();
  guard.status.ready_replicas = Some(guard.spec.replicas);
  Ok(())
}

pub async fn fail_generic(_cell: ObjectCell<Widget>) -> StepResult {
  Err(StepError::msg("backend unavailable"))
}

pub async fn fail_structured(_cell: ObjectCell<Widget>) -> StepResult {
  Err(ConditionResult::fail("QuotaExceeded", "namespace quota exhausted").into())
}

pub async fn panics(_cell: ObjectCell<Widget>) -> StepResult {
  panic!("boom");
}

// --- Helper for Tracing Setup (call once per test run if needed) ---
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer() // Important for tests to capture output
    .try_init()
    .ok(); // Allow multiple initializations in tests (ok if fails)
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Atomic counters for checking execution counts ---
pub static STEP_EXEC_COUNTER: Lazy<Arc<AtomicUsize>> = Lazy::new(|| Arc::new(AtomicUsize::new(0)));
pub static CALLBACK_EXEC_COUNTER: Lazy<Arc<AtomicUsize>> = Lazy::new(|| Arc::new(AtomicUsize::new(0)));

pub fn reset_counters() {
  STEP_EXEC_COUNTER.store(0, Ordering::SeqCst);
  CALLBACK_EXEC_COUNTER.store(0, Ordering::SeqCst);
}

pub async fn count_and_succeed(_cell: ObjectCell<Widget>) -> StepResult {
  STEP_EXEC_COUNTER.fetch_add(1, Ordering::SeqCst);
  Ok(())
}

pub fn step_count() -> usize {
  STEP_EXEC_COUNTER.load(Ordering::SeqCst)
}

pub fn callback_count() -> usize {
  CALLBACK_EXEC_COUNTER.load(Ordering::SeqCst)
}
