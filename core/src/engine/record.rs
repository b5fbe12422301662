// reconstep/src/engine/record.rs

//! Turns the outcome of one transition function into condition, phase,
//! event and callback bookkeeping on the object being patched.

use crate::client::{EventSeverity, EventSink, Resource, ResourceClient};
use crate::condition::{
  truncate_chars, Condition, ConditionStatus, Phase, StepError, StepResult, MAX_ERROR_LEN,
};
use crate::core::control::ReconcileResult;
use crate::core::object_cell::ObjectCell;
use crate::core::step::Step;
use crate::error::{ReconcileError, Result};
use anyhow::Error as AnyhowError;
use futures_util::FutureExt;
use std::any::Any;
use std::backtrace::Backtrace;
use std::panic::{self, AssertUnwindSafe};
use tracing::{event, Level};

/// What the recorded outcome asks of the step loop.
#[derive(Debug, Default)]
pub(crate) struct Recorded {
  pub(crate) exit: bool,
  pub(crate) result: Option<ReconcileResult>,
  /// Set when the step recorded a failed condition or the hook failed.
  pub(crate) failure: Option<AnyhowError>,
}

/// Persists an Unknown "Processing" condition for `step` before it runs.
pub(crate) async fn mark_processing<K, C>(client: &C, step: &Step<K>, cell: &ObjectCell<K>) -> Result<()>
where
  K: Resource,
  C: ResourceClient<K> + ?Sized,
{
  let mut obj = cell.snapshot();
  let condition = Condition::new(
    &step.condition_type,
    ConditionStatus::Unknown,
    step.processing_reason(),
    "Processing",
  );
  obj.condition_phase_mut().set_condition(condition);
  step
    .run_after_condition_set(&mut obj)
    .map_err(ReconcileError::AfterConditionSet)?;
  client.update_status(&mut obj).await?;
  cell.replace(obj);
  event!(Level::DEBUG, "Processing condition persisted.");
  Ok(())
}

/// Runs the transition function and records its outcome on the live object.
///
/// Used as the mutation of a non-aborting patch cycle: a failed condition is
/// returned as the mutation error after being written to the object, so the
/// cycle still persists it.
pub(crate) async fn apply_step<K: Resource>(
  step: &Step<K>,
  cell: &ObjectCell<K>,
  catch_panics: bool,
  events: Option<&dyn EventSink<K>>,
  recorded: &mut Recorded,
) -> std::result::Result<(), AnyhowError> {
  let outcome = invoke_transition(step, cell, catch_panics).await;
  let mut obj = cell.write();
  *recorded = record_outcome(step, &mut obj, outcome, events);
  match recorded.failure.take() {
    Some(err) => Err(err),
    None => Ok(()),
  }
}

async fn invoke_transition<K: Resource>(step: &Step<K>, cell: &ObjectCell<K>, catch_panics: bool) -> StepResult {
  if !catch_panics {
    return (step.transition)(cell.clone()).await;
  }
  let fut = match panic::catch_unwind(AssertUnwindSafe(|| (step.transition)(cell.clone()))) {
    Ok(fut) => fut,
    Err(payload) => return Err(panic_error(payload)),
  };
  match AssertUnwindSafe(fut).catch_unwind().await {
    Ok(outcome) => outcome,
    Err(payload) => Err(panic_error(payload)),
  }
}

fn panic_error(payload: Box<dyn Any + Send>) -> StepError {
  let message = if let Some(s) = payload.downcast_ref::<&str>() {
    s.to_string()
  } else if let Some(s) = payload.downcast_ref::<String>() {
    s.clone()
  } else {
    "non-string panic payload".to_string()
  };
  event!(Level::ERROR, panic = %message, "Transition function panicked.");
  StepError::msg(format!("panic: {}\n{}", message, Backtrace::force_capture()))
}

fn record_outcome<K: Resource>(
  step: &Step<K>,
  obj: &mut K,
  outcome: StepResult,
  events: Option<&dyn EventSink<K>>,
) -> Recorded {
  let mut recorded = Recorded::default();
  let mut phase_set = false;

  let mut condition = match outcome {
    Ok(()) => Condition::new(
      &step.condition_type,
      ConditionStatus::True,
      step.success_reason.clone(),
      step.success_message.clone(),
    ),
    Err(StepError::Condition(rst)) => {
      recorded.exit = rst.exit();
      recorded.result = rst.result();
      if let Some(phase) = rst.phase() {
        obj.condition_phase_mut().phase = phase.clone();
        phase_set = true;
      }
      let condition = rst.as_condition(&step.condition_type);
      if condition.is_false() {
        recorded.failure = Some(AnyhowError::msg(rst.to_string()));
      }
      if !rst.suppress_event() {
        emit(events, obj, &condition);
      }
      condition
    }
    Err(StepError::Other(err)) => {
      let message = truncate_chars(&format!("{}: {:#}", step.default_fail_message_prefix, err), MAX_ERROR_LEN);
      let condition = Condition::new(
        &step.condition_type,
        ConditionStatus::False,
        step.default_fail_reason.clone(),
        message,
      );
      emit(events, obj, &condition);
      recorded.failure = Some(err);
      condition
    }
  };

  if let Some(generation) = obj.meta().generation {
    condition = condition.with_observed_generation(generation);
  }

  if condition.is_false() {
    event!(
      Level::INFO,
      reason = %condition.reason,
      message = %condition.message,
      "Condition failed."
    );
    if !phase_set {
      obj.condition_phase_mut().phase = Phase::new(condition.reason.clone());
    }
    obj.condition_phase_mut().set_condition(condition);
    if let Some(fail_callback) = &step.fail_callback {
      fail_callback(obj);
    }
  } else {
    obj.condition_phase_mut().set_condition(condition);
  }

  if let Err(err) = step.run_after_condition_set(obj) {
    event!(Level::ERROR, error = %format!("{:#}", err), "After-condition-set hook failed.");
    recorded.failure = Some(err);
  }
  recorded
}

fn emit<K: Resource>(events: Option<&dyn EventSink<K>>, obj: &K, condition: &Condition) {
  let Some(sink) = events else {
    return;
  };
  let severity = if condition.is_false() {
    EventSeverity::Warning
  } else {
    EventSeverity::Normal
  };
  sink.event(obj, severity, &condition.reason, &condition.message);
}
