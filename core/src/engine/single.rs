// reconstep/src/engine/single.rs

//! A single condition-tracked procedure outside of a `StepEngine`.

use super::record::{apply_step, mark_processing, Recorded};
use crate::client::{Resource, ResourceClient};
use crate::condition::{is_valid_reason, StepResult};
use crate::core::object_cell::ObjectCell;
use crate::core::step::{Step, StepFuture, StepOptions, TransitionFn};
use crate::error::{ConfigError, Result};
use crate::patch::{PatchCycle, Patched};
use std::future::Future;
use std::sync::Arc;
use tracing::{event, instrument, Level};

/// Runs `procedure` inside one patch cycle and records its outcome as the
/// `condition_type` condition, exactly like a registered step would.
///
/// With `set_processing` the Unknown "Processing" condition is persisted
/// first. The returned `Patched` carries the procedure's failure, if any,
/// after the failed condition was persisted. Panics are not caught and no
/// events are emitted.
///
/// Fails with `ReconcileError::Config` before touching the object if
/// `condition_type` is empty or a configured reason is not a single token.
#[instrument(name = "patch_with_condition", skip_all, fields(condition_type = %condition_type))]
pub async fn patch_with_condition<K, C, F, Fut>(
  client: &C,
  cell: &ObjectCell<K>,
  condition_type: &str,
  procedure: F,
  options: StepOptions<K>,
) -> Result<Patched<anyhow::Error>>
where
  K: Resource,
  C: ResourceClient<K> + ?Sized,
  F: Fn(ObjectCell<K>) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = StepResult> + Send + 'static,
{
  if condition_type.is_empty() {
    return Err(ConfigError::EmptyConditionType.into());
  }
  let transition: TransitionFn<K> = Arc::new(move |cell| -> StepFuture { Box::pin(procedure(cell)) });
  let step = Step::new(condition_type.to_string(), transition, options);
  let processing_reason = step.processing_reason();
  let reasons = [&step.success_reason, &step.default_fail_reason, &processing_reason];
  if let Some(bad) = reasons.into_iter().find(|r| !is_valid_reason(r)) {
    return Err(ConfigError::InvalidReason { reason: bad.clone() }.into());
  }

  if step.set_processing {
    mark_processing(client, &step, cell).await?;
  }

  let mut recorded = Recorded::default();
  let recorded_ref = &mut recorded;
  let patched = PatchCycle::new(client, cell)
    .persist_on_mutate_error()
    .run(|| apply_step(&step, cell, false, None, recorded_ref))
    .await?;
  event!(
    Level::DEBUG,
    operation = ?patched.operation,
    failed = patched.mutate_error.is_some(),
    "Procedure outcome recorded."
  );
  Ok(patched)
}
