// reconstep/src/core/step.rs

//! Defines a reconcile step: a condition type, its transition function and
//! the options that shape how its outcome is recorded.

use super::control::ReconcileResult;
use super::object_cell::ObjectCell;
use crate::condition::StepResult;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Type alias for a step's transition function.
///
/// It receives the live object (refreshed from the store right before the
/// call) and returns `Ok(())` on success or a `StepError`. Transition
/// functions must be idempotent: every invocation runs them again from the
/// top unless a step skipper says otherwise.
pub type TransitionFn<K> = Arc<dyn Fn(ObjectCell<K>) -> StepFuture + Send + Sync>;

pub type StepFuture = Pin<Box<dyn Future<Output = StepResult> + Send>>;

/// Runs after the step's condition was set on the object, inside the same
/// patch cycle. An error here replaces the cycle's outcome.
pub type AfterConditionSet<K> = Arc<dyn Fn(&mut K) -> anyhow::Result<()> + Send + Sync>;

/// Runs when the step recorded a failed condition.
pub type FailCallback<K> = Arc<dyn Fn(&K) + Send + Sync>;

/// Per-step options. Unset reasons and messages default to
/// `<Type>Succeeded`, `<Type> Succeeded`, `<Type>Failed` and `<Type> Failed`.
pub struct StepOptions<K> {
  pub(crate) set_processing: bool,
  pub(crate) success_reason: Option<String>,
  pub(crate) success_message: Option<String>,
  pub(crate) default_fail_reason: Option<String>,
  pub(crate) default_fail_message_prefix: Option<String>,
  pub(crate) after_condition_set: Option<AfterConditionSet<K>>,
  pub(crate) fail_callback: Option<FailCallback<K>>,
  pub(crate) fail_result: Option<ReconcileResult>,
}

impl<K> Default for StepOptions<K> {
  fn default() -> Self {
    Self {
      set_processing: false,
      success_reason: None,
      success_message: None,
      default_fail_reason: None,
      default_fail_message_prefix: None,
      after_condition_set: None,
      fail_callback: None,
      fail_result: None,
    }
  }
}

impl<K> StepOptions<K> {
  pub fn new() -> Self {
    Self::default()
  }

  /// Persist an Unknown/"Processing" condition before running the step.
  pub fn set_processing(mut self) -> Self {
    self.set_processing = true;
    self
  }

  pub fn success_reason(mut self, reason: impl Into<String>) -> Self {
    self.success_reason = Some(reason.into());
    self
  }

  pub fn success_message(mut self, message: impl Into<String>) -> Self {
    self.success_message = Some(message.into());
    self
  }

  pub fn default_fail_reason(mut self, reason: impl Into<String>) -> Self {
    self.default_fail_reason = Some(reason.into());
    self
  }

  pub fn default_fail_message_prefix(mut self, prefix: impl Into<String>) -> Self {
    self.default_fail_message_prefix = Some(prefix.into());
    self
  }

  pub fn after_condition_set(mut self, f: impl Fn(&mut K) -> anyhow::Result<()> + Send + Sync + 'static) -> Self {
    self.after_condition_set = Some(Arc::new(f));
    self
  }

  pub fn fail_callback(mut self, f: impl Fn(&K) + Send + Sync + 'static) -> Self {
    self.fail_callback = Some(Arc::new(f));
    self
  }

  /// Result returned when this step fails or exits, ahead of the engine default.
  pub fn fail_result(mut self, result: ReconcileResult) -> Self {
    self.fail_result = Some(result);
    self
  }
}

/// A registered step with every option resolved. Immutable once built.
pub struct Step<K> {
  pub condition_type: String,
  pub set_processing: bool,
  pub success_reason: String,
  pub success_message: String,
  pub default_fail_reason: String,
  pub default_fail_message_prefix: String,
  pub fail_result: Option<ReconcileResult>,
  pub(crate) transition: TransitionFn<K>,
  pub(crate) after_condition_set: Option<AfterConditionSet<K>>,
  pub(crate) fail_callback: Option<FailCallback<K>>,
}

impl<K> Step<K> {
  pub(crate) fn new(condition_type: String, transition: TransitionFn<K>, options: StepOptions<K>) -> Self {
    Self {
      success_reason: options
        .success_reason
        .unwrap_or_else(|| format!("{}Succeeded", condition_type)),
      success_message: options
        .success_message
        .unwrap_or_else(|| format!("{} Succeeded", condition_type)),
      default_fail_reason: options
        .default_fail_reason
        .unwrap_or_else(|| format!("{}Failed", condition_type)),
      default_fail_message_prefix: options
        .default_fail_message_prefix
        .unwrap_or_else(|| format!("{} Failed", condition_type)),
      set_processing: options.set_processing,
      fail_result: options.fail_result,
      transition,
      after_condition_set: options.after_condition_set,
      fail_callback: options.fail_callback,
      condition_type,
    }
  }

  pub fn processing_reason(&self) -> String {
    format!("{}Processing", self.condition_type)
  }

  pub(crate) fn run_after_condition_set(&self, obj: &mut K) -> anyhow::Result<()> {
    match &self.after_condition_set {
      Some(f) => f(obj),
      None => Ok(()),
    }
  }
}

// Closures don't implement Debug, so only report whether they are set.
impl<K> std::fmt::Debug for Step<K> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Step")
      .field("condition_type", &self.condition_type)
      .field("set_processing", &self.set_processing)
      .field("success_reason", &self.success_reason)
      .field("default_fail_reason", &self.default_fail_reason)
      .field("fail_result", &self.fail_result)
      .field("after_condition_set_present", &self.after_condition_set.is_some())
      .field("fail_callback_present", &self.fail_callback.is_some())
      .finish()
  }
}
