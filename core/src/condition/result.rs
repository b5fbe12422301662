// reconstep/src/condition/result.rs

//! `ConditionResult`, the structured value a transition function returns to
//! drive condition fields, phase, early exit and requeue policy, and
//! `StepError`, the tagged failure type that carries it.

use super::types::{assert_valid_reason, Condition, ConditionStatus, Phase};
use crate::core::control::ReconcileResult;
use anyhow::Error as AnyhowError;
use std::fmt;

/// Cap for condition messages built from text.
pub const MAX_MESSAGE_LEN: usize = 10_000;
/// Cap for the rendered error of a `ConditionResult`.
pub const MAX_ERROR_LEN: usize = 20_000;

/// Truncates `s` to at most `max` characters.
pub fn truncate_chars(s: &str, max: usize) -> String {
  match s.char_indices().nth(max) {
    Some((idx, _)) => s[..idx].to_string(),
    None => s.to_string(),
  }
}

/// A condition outcome produced by a transition function.
///
/// Created by one of `fail`, `fail_with`, `success` or `unknown`, refined
/// with the `with_*` modifiers and returned as `Err(result.into())`.
#[derive(Debug)]
pub struct ConditionResult {
  condition_type: Option<String>,
  status: ConditionStatus,
  reason: String,
  message: String,
  phase: Option<Phase>,
  exit: bool,
  result: Option<ReconcileResult>,
  source: Option<AnyhowError>,
  suppress_event: bool,
}

impl ConditionResult {
  fn new(status: ConditionStatus, reason: impl Into<String>, message: String, source: Option<AnyhowError>) -> Self {
    let reason = reason.into();
    assert_valid_reason(&reason);
    Self {
      condition_type: None,
      status,
      reason,
      message,
      phase: None,
      exit: false,
      result: None,
      source,
      suppress_event: false,
    }
  }

  /// A failed condition with a plain message, capped at `MAX_MESSAGE_LEN` chars.
  pub fn fail(reason: impl Into<String>, message: impl AsRef<str>) -> Self {
    let message = truncate_chars(message.as_ref(), MAX_MESSAGE_LEN);
    Self::new(ConditionStatus::False, reason, message, None)
  }

  /// A failed condition wrapping an error; the message is the error chain,
  /// capped at `MAX_ERROR_LEN` chars.
  pub fn fail_with(reason: impl Into<String>, err: impl Into<AnyhowError>) -> Self {
    let err = err.into();
    let message = truncate_chars(&format!("{:#}", err), MAX_ERROR_LEN);
    Self::new(ConditionStatus::False, reason, message, Some(err))
  }

  /// Like `fail_with`, but prefixes the error with a context message
  /// (capped at `MAX_MESSAGE_LEN` chars).
  pub fn fail_context(reason: impl Into<String>, err: impl Into<AnyhowError>, context: impl AsRef<str>) -> Self {
    let context = truncate_chars(context.as_ref(), MAX_MESSAGE_LEN);
    Self::fail_with(reason, err.into().context(context))
  }

  pub fn success(reason: impl Into<String>, message: impl Into<String>) -> Self {
    Self::new(ConditionStatus::True, reason, message.into(), None)
  }

  pub fn unknown(reason: impl Into<String>, message: impl Into<String>) -> Self {
    Self::new(ConditionStatus::Unknown, reason, message.into(), None)
  }

  /// Stop the step loop after this condition is recorded.
  pub fn with_exit(mut self) -> Self {
    self.exit = true;
    self
  }

  /// Stop the step loop and return `result` from the invocation.
  pub fn with_exit_result(mut self, result: ReconcileResult) -> Self {
    self.exit = true;
    self.result = Some(result);
    self
  }

  /// Record the condition under `condition_type` instead of the step's own type.
  pub fn with_type(mut self, condition_type: impl Into<String>) -> Self {
    self.condition_type = Some(condition_type.into());
    self
  }

  pub fn with_phase(mut self, phase: impl Into<Phase>) -> Self {
    self.phase = Some(phase.into());
    self
  }

  pub fn without_event(mut self) -> Self {
    self.suppress_event = true;
    self
  }

  pub fn status(&self) -> ConditionStatus {
    self.status
  }

  pub fn reason(&self) -> &str {
    &self.reason
  }

  pub fn message(&self) -> &str {
    &self.message
  }

  pub fn phase(&self) -> Option<&Phase> {
    self.phase.as_ref()
  }

  pub fn exit(&self) -> bool {
    self.exit
  }

  pub fn result(&self) -> Option<ReconcileResult> {
    self.result
  }

  pub fn suppress_event(&self) -> bool {
    self.suppress_event
  }

  pub fn source(&self) -> Option<&AnyhowError> {
    self.source.as_ref()
  }

  /// The condition to record, falling back to `default_type` when no type
  /// override (or an empty one) was set.
  pub fn as_condition(&self, default_type: &str) -> Condition {
    let condition_type = self
      .condition_type
      .as_deref()
      .filter(|t| !t.is_empty())
      .unwrap_or(default_type);
    let message = match (&self.message, &self.source) {
      (m, Some(err)) if m.is_empty() => truncate_chars(&format!("{:#}", err), MAX_ERROR_LEN),
      (m, _) => m.clone(),
    };
    Condition::new(condition_type, self.status, self.reason.clone(), message)
  }
}

impl fmt::Display for ConditionResult {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let rendered = match &self.source {
      Some(err) => format!("{:#}", err),
      None => self.message.clone(),
    };
    f.write_str(&truncate_chars(&rendered, MAX_ERROR_LEN))
  }
}

/// Failure returned by a transition function.
///
/// `?` converts both `ConditionResult`s and any `std::error::Error` into it.
/// Wrap an `anyhow::Error` with `StepError::Other`.
#[derive(Debug)]
pub enum StepError {
  /// Structured instructions for the engine.
  Condition(ConditionResult),
  /// Generic failure; the step's default fail reason and message prefix apply.
  Other(AnyhowError),
}

impl StepError {
  pub fn msg(message: impl fmt::Display + fmt::Debug + Send + Sync + 'static) -> Self {
    StepError::Other(AnyhowError::msg(message))
  }
}

impl fmt::Display for StepError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StepError::Condition(c) => fmt::Display::fmt(c, f),
      StepError::Other(e) => write!(f, "{:#}", e),
    }
  }
}

impl From<ConditionResult> for StepError {
  fn from(c: ConditionResult) -> Self {
    StepError::Condition(c)
  }
}

impl<E> From<E> for StepError
where
  E: std::error::Error + Send + Sync + 'static,
{
  fn from(e: E) -> Self {
    StepError::Other(AnyhowError::new(e))
  }
}

pub type StepResult = Result<(), StepError>;
