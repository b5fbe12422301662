// reconstep/examples/basic_reconcile.rs

use reconstep::{
  ConditionPhase, ConditionResult, MemoryClient, ObjectCell, ObjectMeta, Phase, ReconcileResult, Resource, StepEngine,
  StepError, StepOptions, StepResult,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

// 1. Define the resource the engine reconciles.
//    Conditions and phase live inside `status`, which is patched separately.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Database {
  metadata: ObjectMeta,
  spec: DatabaseSpec,
  #[serde(default)]
  status: DatabaseStatus,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatabaseSpec {
  version: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  connection_secret: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DatabaseStatus {
  #[serde(flatten)]
  condition_phase: ConditionPhase,
  #[serde(default)]
  ready_replicas: u32,
}

impl Resource for Database {
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

// 2. Transition functions. Each one must be safe to run again on every invocation.
async fn ensure_secret(cell: ObjectCell<Database>) -> StepResult {
  let mut db = cell.write();
  if db.spec.connection_secret.is_none() {
    let secret = format!("{}-credentials", db.metadata.name);
    info!(%secret, "Creating connection secret.");
    db.spec.connection_secret = Some(secret);
  }
  Ok(())
}

async fn wait_for_replicas(cell: ObjectCell<Database>) -> StepResult {
  let mut db = cell.write();
  if db.status.ready_replicas == 0 {
    // Pretend the replica comes up before the next invocation.
    db.status.ready_replicas = 1;
    return Err(
      ConditionResult::unknown("WaitingForReplicas", "0/1 replicas ready")
        .with_phase(Phase::PENDING)
        .with_exit_result(ReconcileResult::requeue_after(Duration::from_secs(5)))
        .into(),
    );
  }
  Ok(())
}

async fn check_version(cell: ObjectCell<Database>) -> StepResult {
  let version = cell.read().spec.version.clone();
  if !version.starts_with("16.") {
    return Err(ConditionResult::fail("UnsupportedVersion", format!("version {} is not supported", version)).into());
  }
  Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  info!("--- Basic Reconcile Example ---");

  // 3. Seed an in-memory store with one resource.
  let client = Arc::new(MemoryClient::<Database>::new());
  let db = client.insert(Database {
    metadata: ObjectMeta::new("default", "orders"),
    spec: DatabaseSpec {
      version: "16.2".to_string(),
      connection_secret: None,
    },
    status: DatabaseStatus::default(),
  })?;
  let key = db.key();

  // 4. Build the engine. Configuration mistakes surface here, not at run time.
  let engine = StepEngine::builder(client.clone())
    .step("SecretReady", ensure_secret)
    .step("ReplicasReady", wait_for_replicas)
    .step_with(
      "VersionSupported",
      check_version,
      StepOptions::new().after_condition_set(|db: &mut Database| {
        db.status.condition_phase.check_ready(None, &[]);
        Ok(())
      }),
    )
    .build()?;

  // 5. Invoke it the way a controller would: once per trigger until nothing is left to do.
  for attempt in 1..=3 {
    let result = engine.run(&key).await?;
    let current = client.peek(&key).unwrap_or_default();
    info!(
      attempt,
      ?result,
      phase = %current.status.condition_phase.phase,
      "Invocation finished."
    );
    for cond in &current.status.condition_phase.conditions {
      info!(condition_type = %cond.condition_type, status = %cond.status, reason = %cond.reason, "Condition.");
    }
    if result.is_zero() {
      break;
    }
  }

  // Demonstrate a failing step with a plain error.
  let failing = StepEngine::builder(client.clone())
    .step("Backup", |_cell: ObjectCell<Database>| async move {
      Err::<(), StepError>(StepError::msg("object store unreachable"))
    })
    .build()?;
  let result = failing.run(&key).await?;
  let current = client.peek(&key).unwrap_or_default();
  info!(?result, phase = %current.status.condition_phase.phase, "Failing step recorded.");

  Ok(())
}
