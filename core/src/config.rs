// reconstep/src/config.rs

use crate::core::control::ReconcileResult;
use crate::error::ConfigError;
use std::env;
use std::time::Duration;

/// Set to `false` to let transition-function panics propagate (debugging).
pub const ENV_CATCH_PANICS: &str = "RECONSTEP_CATCH_PANICS";
/// Requeue delay, in seconds, of the default failure result.
pub const ENV_DEFAULT_REQUEUE_SECS: &str = "RECONSTEP_DEFAULT_REQUEUE_SECS";

pub const DEFAULT_FAIL_REQUEUE_AFTER: Duration = Duration::from_secs(30);

/// Engine-wide settings shared by every invocation of a `StepEngine`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
  /// Convert panics inside transition functions into failed conditions.
  pub catch_panics: bool,
  /// Returned when a step fails and neither the step nor its result says otherwise.
  pub default_fail_result: ReconcileResult,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      catch_panics: true,
      default_fail_result: ReconcileResult::requeue_after(DEFAULT_FAIL_REQUEUE_AFTER),
    }
  }
}

impl EngineConfig {
  /// Defaults overridden by `RECONSTEP_*` environment variables.
  pub fn from_env() -> Result<Self, ConfigError> {
    Self::from_lookup(|var| env::var(var).ok())
  }

  pub(crate) fn from_lookup(lookup: impl Fn(&'static str) -> Option<String>) -> Result<Self, ConfigError> {
    let mut config = Self::default();

    if let Some(value) = lookup(ENV_CATCH_PANICS) {
      config.catch_panics = value.trim().parse::<bool>().map_err(|_| ConfigError::InvalidEnv {
        var: ENV_CATCH_PANICS,
        value: value.clone(),
      })?;
    }

    if let Some(value) = lookup(ENV_DEFAULT_REQUEUE_SECS) {
      let secs = value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnv {
        var: ENV_DEFAULT_REQUEUE_SECS,
        value: value.clone(),
      })?;
      config.default_fail_result = ReconcileResult::requeue_after(Duration::from_secs(secs));
    }

    tracing::debug!(?config, "Engine configuration loaded.");
    Ok(config)
  }
}
