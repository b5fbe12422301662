// reconstep/src/error.rs
use anyhow::Error as AnyhowError;
use thiserror::Error;

use crate::client::ObjectKey;

/// Errors surfaced by a `ResourceClient` implementation.
#[derive(Debug, Error)]
pub enum ClientError {
  #[error("Object not found: {key}")]
  NotFound { key: ObjectKey },

  #[error("Conflict while writing {key}: {message}")]
  Conflict { key: ObjectKey, message: String },

  #[error("Failed to (de)serialize object. Source: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("Resource store error. Source: {0}")]
  Other(#[from] AnyhowError),
}

impl ClientError {
  pub fn is_not_found(&self) -> bool {
    matches!(self, ClientError::NotFound { .. })
  }

  pub fn is_conflict(&self) -> bool {
    matches!(self, ClientError::Conflict { .. })
  }
}

/// Fatal errors of a single reconcile invocation.
///
/// Business failures never show up here: they are folded into conditions
/// and the returned `ReconcileResult`.
#[derive(Debug, Error)]
pub enum ReconcileError {
  #[error(transparent)]
  Client(#[from] ClientError),

  #[error("Failed to convert object into a field map. Source: {0}")]
  Convert(#[from] serde_json::Error),

  #[error("Mutation cannot change object identity (was {before}, now {after})")]
  IdentityChanged { before: ObjectKey, after: ObjectKey },

  #[error("Deletion callback for finalizer '{finalizer}' failed. Source: {source}")]
  Finalize {
    finalizer: String,
    #[source]
    source: AnyhowError,
  },

  #[error("After-condition-set hook failed. Source: {0:#}")]
  AfterConditionSet(#[source] AnyhowError),

  #[error("Invalid configuration: {0}")]
  Config(#[from] ConfigError),
}

/// Construction-time contract violations reported by `StepEngineBuilder::build`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
  #[error("Step condition type cannot be empty")]
  EmptyConditionType,

  #[error("Finalizer name cannot be empty")]
  EmptyFinalizer,

  #[error("Reason '{reason}' must be a single token without whitespace")]
  InvalidReason { reason: String },

  #[error("{what} already set")]
  DuplicateRegistration { what: &'static str },

  #[error("Invalid value '{value}' for environment variable {var}")]
  InvalidEnv { var: &'static str, value: String },
}

pub type Result<T, E = ReconcileError> = std::result::Result<T, E>;
