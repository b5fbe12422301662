// reconstep/src/engine/builder.rs

//! Fluent construction of a `StepEngine`.
//!
//! Contract violations (empty condition type, invalid reasons, registering a
//! skipper or finalizer twice) are recorded as they happen and reported by
//! `build()`, so a misconfigured engine never reaches `run`.

use super::{AfterDeletion, FinalizerRegistration, Skipper, StepEngine, StepSkipper};
use crate::client::{EventSink, ObjectKey, Resource, ResourceClient};
use crate::condition::{is_valid_reason, Condition, StepResult};
use crate::config::EngineConfig;
use crate::core::control::ReconcileResult;
use crate::core::object_cell::ObjectCell;
use crate::core::step::{Step, StepFuture, StepOptions, TransitionFn};
use crate::error::ConfigError;
use crate::finalizer::{CleanupFuture, DeletionCallback};
use std::future::Future;
use std::sync::Arc;
use tracing::{event, Level};

pub struct StepEngineBuilder<K, C>
where
  K: Resource,
  C: ResourceClient<K> + ?Sized,
{
  engine: StepEngine<K, C>,
  error: Option<ConfigError>,
}

impl<K, C> StepEngineBuilder<K, C>
where
  K: Resource,
  C: ResourceClient<K> + ?Sized,
{
  pub fn new(client: Arc<C>) -> Self {
    Self {
      engine: StepEngine {
        client,
        steps: Vec::new(),
        skipper: None,
        pre_finalize_skipper: None,
        step_skipper: None,
        finalizer: None,
        after_deletion: None,
        event_sink: None,
        config: EngineConfig::default(),
      },
      error: None,
    }
  }

  fn fail(&mut self, err: ConfigError) {
    if self.error.is_none() {
      event!(Level::ERROR, error = %err, "Invalid step engine configuration.");
      self.error = Some(err);
    }
  }

  pub fn with_config(mut self, config: EngineConfig) -> Self {
    self.engine.config = config;
    self
  }

  /// Result returned when a step fails and it has no `fail_result` of its own.
  pub fn with_default_fail_result(mut self, result: ReconcileResult) -> Self {
    self.engine.config.default_fail_result = result;
    self
  }

  pub fn with_event_sink(mut self, sink: Arc<dyn EventSink<K>>) -> Self {
    self.engine.event_sink = Some(sink);
    self
  }

  /// Evaluated after the finalizer protocol; `true` skips every step.
  pub fn with_skipper(mut self, f: impl Fn(&K) -> bool + Send + Sync + 'static) -> Self {
    if self.engine.skipper.is_some() {
      self.fail(ConfigError::DuplicateRegistration { what: "skipper" });
      return self;
    }
    self.engine.skipper = Some(Arc::new(f) as Skipper<K>);
    self
  }

  /// Evaluated before the finalizer protocol; `true` skips finalizing and every step.
  pub fn with_pre_finalize_skipper(mut self, f: impl Fn(&K) -> bool + Send + Sync + 'static) -> Self {
    if self.engine.pre_finalize_skipper.is_some() {
      self.fail(ConfigError::DuplicateRegistration {
        what: "pre-finalize skipper",
      });
      return self;
    }
    self.engine.pre_finalize_skipper = Some(Arc::new(f) as Skipper<K>);
    self
  }

  /// Evaluated before every step with the step's current condition; `true` skips that step.
  pub fn with_step_skipper(
    mut self,
    f: impl Fn(&Step<K>, Option<&Condition>) -> bool + Send + Sync + 'static,
  ) -> Self {
    if self.engine.step_skipper.is_some() {
      self.fail(ConfigError::DuplicateRegistration { what: "step skipper" });
      return self;
    }
    self.engine.step_skipper = Some(Arc::new(f) as StepSkipper<K>);
    self
  }

  /// Keeps `finalizer` on the resource and runs `callback` once it is marked for deletion.
  pub fn with_finalizer<F, Fut>(self, finalizer: impl Into<String>, callback: F) -> Self
  where
    F: Fn(ObjectCell<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
  {
    let callback: DeletionCallback<K> = Arc::new(move |cell| -> CleanupFuture { Box::pin(callback(cell)) });
    self.register_finalizer(finalizer.into(), Some(callback))
  }

  /// Keeps `finalizer` on the resource without any cleanup work.
  pub fn with_finalizer_token(self, finalizer: impl Into<String>) -> Self {
    self.register_finalizer(finalizer.into(), None)
  }

  fn register_finalizer(mut self, name: String, callback: Option<DeletionCallback<K>>) -> Self {
    if self.engine.finalizer.is_some() {
      self.fail(ConfigError::DuplicateRegistration { what: "finalizer" });
      return self;
    }
    if name.is_empty() {
      self.fail(ConfigError::EmptyFinalizer);
      return self;
    }
    self.engine.finalizer = Some(FinalizerRegistration { name, callback });
    self
  }

  /// Called when an invocation finds the resource already gone.
  pub fn with_after_deletion(mut self, f: impl Fn(&ObjectKey) + Send + Sync + 'static) -> Self {
    if self.engine.after_deletion.is_some() {
      self.fail(ConfigError::DuplicateRegistration { what: "after deletion" });
      return self;
    }
    self.engine.after_deletion = Some(Arc::new(f) as AfterDeletion);
    self
  }

  /// Registers a step with default options.
  pub fn step<F, Fut>(self, condition_type: impl Into<String>, transition: F) -> Self
  where
    F: Fn(ObjectCell<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StepResult> + Send + 'static,
  {
    self.step_with(condition_type, transition, StepOptions::default())
  }

  /// Registers a step. Steps run in registration order.
  pub fn step_with<F, Fut>(mut self, condition_type: impl Into<String>, transition: F, options: StepOptions<K>) -> Self
  where
    F: Fn(ObjectCell<K>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = StepResult> + Send + 'static,
  {
    let condition_type = condition_type.into();
    if condition_type.is_empty() {
      self.fail(ConfigError::EmptyConditionType);
      return self;
    }
    let transition: TransitionFn<K> = Arc::new(move |cell| -> StepFuture { Box::pin(transition(cell)) });
    let step = Step::new(condition_type, transition, options);

    let processing_reason = step.processing_reason();
    let reasons = [&step.success_reason, &step.default_fail_reason, &processing_reason];
    if let Some(bad) = reasons.into_iter().find(|r| !is_valid_reason(r)) {
      let reason = bad.clone();
      self.fail(ConfigError::InvalidReason { reason });
      return self;
    }

    event!(Level::DEBUG, condition_type = %step.condition_type, "Step registered.");
    self.engine.steps.push(step);
    self
  }

  pub fn build(self) -> Result<StepEngine<K, C>, ConfigError> {
    match self.error {
      Some(err) => Err(err),
      None => Ok(self.engine),
    }
  }
}
