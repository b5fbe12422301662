// reconstep/examples/finalizer_lifecycle.rs

use reconstep::client::memory::Verb;
use reconstep::{
  ConditionPhase, MemoryClient, ObjectCell, ObjectMeta, RecordingEventSink, Resource, StepEngine, StepResult,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

const FINALIZER: &str = "buckets.example.com/cleanup";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct Bucket {
  metadata: ObjectMeta,
  #[serde(default)]
  status: BucketStatus,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct BucketStatus {
  #[serde(flatten)]
  condition_phase: ConditionPhase,
}

impl Resource for Bucket {
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

async fn provision(cell: ObjectCell<Bucket>) -> StepResult {
  info!(bucket = %cell.read().metadata.name, "Bucket provisioned.");
  Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

  info!("--- Finalizer Lifecycle Example ---");

  let client = Arc::new(MemoryClient::<Bucket>::new());
  let key = client
    .insert(Bucket {
      metadata: ObjectMeta::new("storage", "logs"),
      status: BucketStatus::default(),
    })?
    .key();

  // The first cleanup attempt fails so the retry path is visible.
  let objects_left = Arc::new(AtomicBool::new(true));
  let objects_left_in_cleanup = objects_left.clone();
  let events = Arc::new(RecordingEventSink::new());

  let engine = StepEngine::builder(client.clone())
    .with_event_sink(events.clone())
    .with_finalizer(FINALIZER, move |cell: ObjectCell<Bucket>| {
      let objects_left = objects_left_in_cleanup.clone();
      async move {
        let name = cell.read().metadata.name.clone();
        if objects_left.swap(false, Ordering::SeqCst) {
          anyhow::bail!("bucket {} still holds objects", name);
        }
        info!(bucket = %name, "Bucket emptied and deleted.");
        Ok(())
      }
    })
    .with_after_deletion(|key| info!(%key, "Bucket is gone, nothing to reconcile."))
    .step("Provisioned", provision)
    .build()?;

  engine.run(&key).await?;
  let bucket = client.peek(&key).unwrap_or_default();
  info!(finalizers = ?bucket.metadata.finalizers, "Finalizer added on first run.");

  client.delete(&key)?;
  info!("Deletion requested.");

  let result = engine.run(&key).await?;
  let bucket = client.peek(&key).unwrap_or_default();
  warn!(
    ?result,
    phase = %bucket.status.condition_phase.phase,
    "Cleanup failed, finalizer kept."
  );

  // A store outage while finalizing only delays deletion further.
  client.fail_on(Verb::Update);
  let result = engine.run(&key).await?;
  warn!(?result, "Store rejected the finalizer removal.");
  client.clear_failures();

  let result = engine.run(&key).await?;
  info!(?result, still_stored = client.contains(&key), "Cleanup succeeded.");

  // The next trigger finds nothing.
  engine.run(&key).await?;
  info!(events = events.events().len(), "Done.");
  Ok(())
}
