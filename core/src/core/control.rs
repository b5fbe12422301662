// reconstep/src/core/control.rs

//! Defines the requeue instruction returned by a reconcile invocation and
//! the outcome of a single patch cycle.

use std::time::Duration;

/// Requeue instruction handed back to whatever schedules invocations.
///
/// The zero value means "done, no requeue".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ReconcileResult {
  pub requeue: bool,
  pub requeue_after: Duration,
}

impl ReconcileResult {
  /// Nothing more to do for this trigger.
  pub const fn done() -> Self {
    Self {
      requeue: false,
      requeue_after: Duration::ZERO,
    }
  }

  /// Requeue after `after`.
  pub const fn requeue_after(after: Duration) -> Self {
    Self {
      requeue: true,
      requeue_after: after,
    }
  }

  pub fn is_zero(&self) -> bool {
    !self.requeue && self.requeue_after.is_zero()
  }

  /// The first candidate that is not the zero value, or `done()`.
  pub fn first_non_zero<I>(candidates: I) -> Self
  where
    I: IntoIterator<Item = Option<ReconcileResult>>,
  {
    candidates
      .into_iter()
      .flatten()
      .find(|r| !r.is_zero())
      .unwrap_or_default()
  }
}

/// Signal from a step telling the engine whether to move on to the next step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepControl {
  /// Continue with the next registered step.
  Continue,
  /// Stop the step loop and return this result from the invocation.
  Stop(ReconcileResult),
}

/// What a patch cycle ended up writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationResult {
  /// Neither main fields nor status changed; no write was issued.
  NoChange,
  /// Only the main fields were patched.
  Updated,
  /// Main fields and status were both patched.
  UpdatedStatus,
  /// Only the status subresource was patched.
  UpdatedStatusOnly,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn first_non_zero_skips_missing_and_zero_values() {
    let step = ReconcileResult::requeue_after(Duration::from_secs(3));
    let engine = ReconcileResult::requeue_after(Duration::from_secs(30));
    assert_eq!(ReconcileResult::first_non_zero([None, Some(ReconcileResult::done()), Some(step), Some(engine)]), step);
    assert_eq!(ReconcileResult::first_non_zero([None, Some(engine)]), engine);
    assert!(ReconcileResult::first_non_zero([None, None]).is_zero());
  }
}
