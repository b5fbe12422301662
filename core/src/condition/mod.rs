// reconstep/src/condition/mod.rs

//! Condition/phase bookkeeping and the structured `ConditionResult` a step
//! can return instead of a plain error.

pub mod result;
pub mod types;

pub use result::{truncate_chars, ConditionResult, StepError, StepResult, MAX_ERROR_LEN, MAX_MESSAGE_LEN};
pub use types::{is_valid_reason, Condition, ConditionPhase, ConditionStatus, Phase};
