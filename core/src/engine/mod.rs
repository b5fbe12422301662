// reconstep/src/engine/mod.rs

//! The `StepEngine`: runs registered steps in order against one resource,
//! recording each step's outcome as a status condition.
//!
//! One invocation goes through:
//! fetch → pre-finalize skip check → finalizer protocol → skip check → steps.
//! Nothing is remembered between invocations; the conditions and phase on the
//! resource are the only state.

pub mod builder;
mod record;
pub mod run;
pub mod single;

use crate::client::{EventSink, ObjectKey, Resource, ResourceClient};
use crate::condition::Condition;
use crate::config::EngineConfig;
use crate::core::step::Step;
use crate::finalizer::DeletionCallback;
use std::sync::Arc;

pub use builder::StepEngineBuilder;
pub use single::patch_with_condition;

/// Predicate over the fetched object; `true` means skip.
pub type Skipper<K> = Arc<dyn Fn(&K) -> bool + Send + Sync>;

/// Per-step predicate, given the step and its current condition; `true` skips the step.
pub type StepSkipper<K> = Arc<dyn Fn(&Step<K>, Option<&Condition>) -> bool + Send + Sync>;

/// Called when an invocation finds the resource gone.
pub type AfterDeletion = Arc<dyn Fn(&ObjectKey) + Send + Sync>;

/// Condition type recorded when the deletion callback fails.
pub const FINALIZING_CONDITION: &str = "Finalizing";
pub const FINALIZATION_FAILED_REASON: &str = "FinalizationFailed";

pub(crate) struct FinalizerRegistration<K> {
  pub(crate) name: String,
  pub(crate) callback: Option<DeletionCallback<K>>,
}

/// Ordered, condition-tracking reconcile steps for resources of type `K`.
///
/// Build one with `StepEngine::builder` and call `run` once per trigger.
pub struct StepEngine<K, C>
where
  K: Resource,
  C: ResourceClient<K> + ?Sized,
{
  pub(crate) client: Arc<C>,
  pub(crate) steps: Vec<Step<K>>,
  pub(crate) skipper: Option<Skipper<K>>,
  pub(crate) pre_finalize_skipper: Option<Skipper<K>>,
  pub(crate) step_skipper: Option<StepSkipper<K>>,
  pub(crate) finalizer: Option<FinalizerRegistration<K>>,
  pub(crate) after_deletion: Option<AfterDeletion>,
  pub(crate) event_sink: Option<Arc<dyn EventSink<K>>>,
  pub(crate) config: EngineConfig,
}

impl<K, C> StepEngine<K, C>
where
  K: Resource,
  C: ResourceClient<K> + ?Sized,
{
  pub fn builder(client: Arc<C>) -> StepEngineBuilder<K, C> {
    StepEngineBuilder::new(client)
  }

  pub fn steps(&self) -> &[Step<K>] {
    &self.steps
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }
}

impl<K, C> std::fmt::Debug for StepEngine<K, C>
where
  K: Resource,
  C: ResourceClient<K> + ?Sized,
{
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("StepEngine")
      .field("steps", &self.steps)
      .field("finalizer", &self.finalizer.as_ref().map(|f| f.name.as_str()))
      .field("skipper_present", &self.skipper.is_some())
      .field("pre_finalize_skipper_present", &self.pre_finalize_skipper.is_some())
      .field("step_skipper_present", &self.step_skipper.is_some())
      .field("event_sink_present", &self.event_sink.is_some())
      .field("config", &self.config)
      .finish()
  }
}
