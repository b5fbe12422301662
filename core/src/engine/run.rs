// reconstep/src/engine/run.rs

//! `StepEngine::run`: one reconcile invocation against a single resource.

use super::record::{apply_step, mark_processing, Recorded};
use super::{StepEngine, FINALIZATION_FAILED_REASON, FINALIZING_CONDITION};
use crate::client::{ObjectKey, Resource, ResourceClient};
use crate::condition::{truncate_chars, Condition, ConditionStatus, Phase, MAX_ERROR_LEN};
use crate::core::control::{ReconcileResult, StepControl};
use crate::core::object_cell::ObjectCell;
use crate::core::step::Step;
use crate::error::{ReconcileError, Result};
use crate::finalizer::finalize;
use crate::patch::PatchCycle;
use tracing::{event, instrument, span, Instrument, Level};

impl<K, C> StepEngine<K, C>
where
  K: Resource,
  C: ResourceClient<K> + ?Sized,
{
  /// Reconciles the resource stored under `key`.
  ///
  /// Returns `Err` only for store failures that leave nothing sensible to
  /// record (the initial fetch). Step failures, including failed patches, are
  /// folded into conditions and the returned `ReconcileResult`.
  #[instrument(
    name = "StepEngine::run",
    skip_all,
    fields(key = %key, num_steps = self.steps.len()),
    err(Display)
  )]
  pub async fn run(&self, key: &ObjectKey) -> Result<ReconcileResult> {
    let Some(obj) = self.fetch(key).await? else {
      return Ok(ReconcileResult::done());
    };
    let cell = ObjectCell::new(obj);
    self.process(&cell).await
  }

  /// Like `run`, but reconciles through a caller-owned cell which holds the
  /// latest persisted state of the object afterwards.
  #[instrument(
    name = "StepEngine::run_in",
    skip_all,
    fields(key = %cell.read().key(), num_steps = self.steps.len()),
    err(Display)
  )]
  pub async fn run_in(&self, cell: &ObjectCell<K>) -> Result<ReconcileResult> {
    let key = cell.read().key();
    let Some(obj) = self.fetch(&key).await? else {
      return Ok(ReconcileResult::done());
    };
    cell.replace(obj);
    self.process(cell).await
  }

  async fn fetch(&self, key: &ObjectKey) -> Result<Option<K>> {
    match self.client.get(key).await {
      Ok(obj) => Ok(Some(obj)),
      Err(err) if err.is_not_found() => {
        event!(Level::DEBUG, "Object not found, assuming it was deleted.");
        if let Some(after_deletion) = &self.after_deletion {
          after_deletion(key);
        }
        Ok(None)
      }
      Err(err) => {
        event!(Level::ERROR, error = %err, "Failed to fetch object.");
        Err(err.into())
      }
    }
  }

  async fn process(&self, cell: &ObjectCell<K>) -> Result<ReconcileResult> {
    if let Some(skipper) = &self.pre_finalize_skipper {
      if skipper(&*cell.read()) {
        event!(Level::INFO, "Pre-finalize skipper matched, skipping invocation.");
        return Ok(ReconcileResult::done());
      }
    }

    if let Some(registration) = &self.finalizer {
      match finalize(&*self.client, cell, &registration.name, registration.callback.as_ref()).await {
        Ok(true) => {
          event!(Level::INFO, finalizer = %registration.name, "Object finalized.");
          return Ok(ReconcileResult::done());
        }
        Ok(false) => {}
        Err(err) => return Ok(self.record_finalize_failure(cell, err).await),
      }
    }

    if let Some(skipper) = &self.skipper {
      if skipper(&*cell.read()) {
        event!(Level::INFO, "Skipper matched, skipping all steps.");
        return Ok(ReconcileResult::done());
      }
    }

    event!(Level::DEBUG, "Step loop starting.");
    for (step_idx, step) in self.steps.iter().enumerate() {
      let step_span = span!(
        Level::INFO,
        "reconcile_step",
        condition_type = %step.condition_type,
        step_index = step_idx
      );
      match self.run_step(step, cell).instrument(step_span).await {
        StepControl::Continue => {}
        StepControl::Stop(result) => {
          event!(Level::INFO, condition_type = %step.condition_type, ?result, "Step loop stopped.");
          return Ok(result);
        }
      }
    }

    event!(Level::DEBUG, "All steps completed.");
    Ok(ReconcileResult::done())
  }

  /// Records the failed cleanup on the object's status and hands back the
  /// default failure result. A failure to persist is only logged.
  async fn record_finalize_failure(&self, cell: &ObjectCell<K>, err: ReconcileError) -> ReconcileResult {
    event!(Level::ERROR, error = %err, "Failed to finalize object.");
    let mut obj = cell.snapshot();
    let condition = Condition::new(
      FINALIZING_CONDITION,
      ConditionStatus::False,
      FINALIZATION_FAILED_REASON,
      truncate_chars(&err.to_string(), MAX_ERROR_LEN),
    );
    let condition_phase = obj.condition_phase_mut();
    condition_phase.set_condition(condition);
    condition_phase.phase = Phase::FINALIZATION_ERROR;

    match self.client.update_status(&mut obj).await {
      Ok(()) => {
        cell.replace(obj);
      }
      Err(update_err) => {
        event!(Level::ERROR, error = %update_err, "Failed to persist finalization failure.");
      }
    }
    self.config.default_fail_result
  }

  async fn run_step(&self, step: &Step<K>, cell: &ObjectCell<K>) -> StepControl {
    if let Some(step_skipper) = &self.step_skipper {
      let skipped = {
        let obj = cell.read();
        step_skipper(step, obj.condition_phase().find_condition(&step.condition_type))
      };
      if skipped {
        event!(Level::DEBUG, "Step skipped by step skipper.");
        return StepControl::Continue;
      }
    }

    if step.set_processing {
      if let Err(err) = mark_processing(&*self.client, step, cell).await {
        event!(Level::ERROR, error = %err, "Failed to persist processing condition.");
        return StepControl::Stop(ReconcileResult::first_non_zero([
          step.fail_result,
          Some(self.config.default_fail_result),
        ]));
      }
    }

    let mut recorded = Recorded::default();
    let recorded_ref = &mut recorded;
    let events = self.event_sink.as_deref();
    let catch_panics = self.config.catch_panics;
    let patched = PatchCycle::new(&*self.client, cell)
      .persist_on_mutate_error()
      .run(move || apply_step(step, cell, catch_panics, events, recorded_ref))
      .await;

    let stop = ReconcileResult::first_non_zero([
      recorded.result,
      step.fail_result,
      Some(self.config.default_fail_result),
    ]);
    match patched {
      Err(err) => {
        event!(Level::ERROR, error = %err, "Failed to persist step outcome.");
        StepControl::Stop(stop)
      }
      Ok(patched) => {
        if let Some(err) = patched.mutate_error {
          event!(Level::WARN, error = %format!("{:#}", err), operation = ?patched.operation, "Step failed.");
          return StepControl::Stop(stop);
        }
        if recorded.exit {
          event!(Level::INFO, operation = ?patched.operation, "Step requested exit.");
          return StepControl::Stop(stop);
        }
        event!(Level::DEBUG, operation = ?patched.operation, "Step completed.");
        StepControl::Continue
      }
    }
  }
}
