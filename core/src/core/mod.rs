pub mod control;
pub mod object_cell;
pub mod step;

// Re-export key types for easier access from other modules (and lib.rs)
pub use control::{OperationResult, ReconcileResult, StepControl};
pub use object_cell::ObjectCell;
pub use step::{Step, StepFuture, StepOptions, TransitionFn};
