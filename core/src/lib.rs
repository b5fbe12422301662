// src/lib.rs

//! Reconstep: a condition-tracking step engine for Kubernetes-style reconcilers.
//!
//! A `StepEngine` applies an ordered list of idempotent steps to one resource
//! per invocation and records each step's outcome as a status condition:
//!  - Every step runs inside one optimistic patch cycle; main fields and the
//!    status subtree are persisted through separate, minimal merge patches.
//!  - Steps can return a `ConditionResult` to control the recorded condition,
//!    the phase, early exit and the requeue policy.
//!  - Panics inside transition functions become failed conditions.
//!  - An optional finalizer blocks deletion until cleanup succeeds.
//!  - No state is kept between invocations; conditions and phase on the
//!    resource are the only memory.

pub mod client;
pub mod condition;
pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod finalizer;
pub mod patch;

// --- Re-exports for the Public API ---

// Resource model and store seams
pub use crate::client::{
  EventSeverity, EventSink, MemoryClient, ObjectKey, ObjectMeta, RecordingEventSink, Resource, ResourceClient,
};

// Conditions, phase and the structured step result
pub use crate::condition::{
  Condition, ConditionPhase, ConditionResult, ConditionStatus, Phase, StepError, StepResult,
};

pub use crate::core::control::{OperationResult, ReconcileResult};
pub use crate::core::object_cell::ObjectCell;
pub use crate::core::step::{Step, StepOptions};

// The engine and its builder
pub use crate::engine::{patch_with_condition, StepEngine, StepEngineBuilder};

// Standalone helpers
pub use crate::finalizer::finalize;
pub use crate::patch::{patch, PatchCycle, Patched};

pub use crate::config::EngineConfig;
pub use crate::error::{ClientError, ConfigError, ReconcileError, Result};
