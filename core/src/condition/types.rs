// reconstep/src/condition/types.rs

//! Status conditions, the derived phase label and the `ConditionPhase`
//! container persisted inside a resource's status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionStatus {
  True,
  False,
  Unknown,
}

impl fmt::Display for ConditionStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      ConditionStatus::True => "True",
      ConditionStatus::False => "False",
      ConditionStatus::Unknown => "Unknown",
    };
    f.write_str(s)
  }
}

/// A reason is a single non-empty token without whitespace.
pub fn is_valid_reason(reason: &str) -> bool {
  !reason.is_empty() && !reason.chars().any(char::is_whitespace)
}

/// Panics if `reason` is not a single whitespace-free token.
pub(crate) fn assert_valid_reason(reason: &str) {
  assert!(
    is_valid_reason(reason),
    "condition reason {:?} must be a non-empty token without whitespace",
    reason
  );
}

/// Named status record kept on the resource, one per `condition_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
  #[serde(rename = "type")]
  pub condition_type: String,
  pub status: ConditionStatus,
  pub reason: String,
  #[serde(default)]
  pub message: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub last_transition_time: Option<DateTime<Utc>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub observed_generation: Option<i64>,
}

impl Condition {
  /// Builds a condition without a transition time; `set_condition` stamps it.
  ///
  /// Panics on an empty type or a reason containing whitespace.
  pub fn new(
    condition_type: impl Into<String>,
    status: ConditionStatus,
    reason: impl Into<String>,
    message: impl Into<String>,
  ) -> Self {
    let condition_type = condition_type.into();
    let reason = reason.into();
    assert!(!condition_type.is_empty(), "condition type cannot be empty");
    assert_valid_reason(&reason);
    Self {
      condition_type,
      status,
      reason,
      message: message.into(),
      last_transition_time: None,
      observed_generation: None,
    }
  }

  pub fn with_observed_generation(mut self, generation: i64) -> Self {
    self.observed_generation = Some(generation);
    self
  }

  pub fn is_true(&self) -> bool {
    self.status == ConditionStatus::True
  }

  pub fn is_false(&self) -> bool {
    self.status == ConditionStatus::False
  }
}

/// Coarse lifecycle label derived from conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Phase(Cow<'static, str>);

impl Phase {
  pub const INITIALIZING: Phase = Phase::from_static("Initializing");
  pub const PENDING: Phase = Phase::from_static("Pending");
  pub const FINALIZING: Phase = Phase::from_static("Finalizing");
  pub const IDLE: Phase = Phase::from_static("Idle");

  pub const ERROR: Phase = Phase::from_static("Error");
  pub const INVALID: Phase = Phase::from_static("Invalid");
  pub const FINALIZATION_ERROR: Phase = Phase::from_static("FinalizationError");

  pub const READY: Phase = Phase::from_static("Ready");
  pub const RUNNING: Phase = Phase::from_static("Running");
  pub const COMPLETED: Phase = Phase::from_static("Completed");

  pub const fn from_static(s: &'static str) -> Self {
    Phase(Cow::Borrowed(s))
  }

  pub fn new(s: impl Into<String>) -> Self {
    Phase(Cow::Owned(s.into()))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  /// Ready, Running and Completed count as healthy phases.
  pub fn is_success(&self) -> bool {
    *self == Phase::READY || *self == Phase::RUNNING || *self == Phase::COMPLETED
  }
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for Phase {
  fn from(s: &str) -> Self {
    Phase::new(s)
  }
}

impl From<String> for Phase {
  fn from(s: String) -> Self {
    Phase::new(s)
  }
}

/// Conditions plus phase, embedded in a resource's status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionPhase {
  /// Status of each reconcile step, or any special status that needs a message attached.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub conditions: Vec<Condition>,
  #[serde(default, skip_serializing_if = "Phase::is_empty")]
  pub phase: Phase,
}

impl ConditionPhase {
  pub fn find_condition(&self, condition_type: &str) -> Option<&Condition> {
    self.conditions.iter().find(|c| c.condition_type == condition_type)
  }

  /// Inserts or updates the condition of the same type.
  ///
  /// The transition time only moves when the status changes; reason,
  /// message and observed generation always take the new values.
  pub fn set_condition(&mut self, new: Condition) {
    let now = Utc::now();
    match self
      .conditions
      .iter_mut()
      .find(|c| c.condition_type == new.condition_type)
    {
      Some(existing) => {
        if existing.status != new.status {
          existing.status = new.status;
          existing.last_transition_time = Some(new.last_transition_time.unwrap_or(now));
        }
        existing.reason = new.reason;
        existing.message = new.message;
        existing.observed_generation = new.observed_generation;
      }
      None => {
        let mut new = new;
        new.last_transition_time.get_or_insert(now);
        self.conditions.push(new);
      }
    }
  }

  /// Returns `true` if a condition of that type was removed.
  pub fn remove_condition(&mut self, condition_type: &str) -> bool {
    let before = self.conditions.len();
    self.conditions.retain(|c| c.condition_type != condition_type);
    before != self.conditions.len()
  }

  pub fn is_condition_true(&self, condition_type: &str) -> bool {
    self.find_condition(condition_type).is_some_and(Condition::is_true)
  }

  /// Sets the phase to `ok_phase` (Ready if `None`) when every considered
  /// condition is True. An empty `for_conditions` considers all of them.
  pub fn check_ready(&mut self, ok_phase: Option<Phase>, for_conditions: &[&str]) {
    let all_true = self
      .conditions
      .iter()
      .filter(|c| for_conditions.is_empty() || for_conditions.contains(&c.condition_type.as_str()))
      .all(Condition::is_true);
    if all_true {
      self.phase = ok_phase.unwrap_or(Phase::READY);
    }
  }

  pub fn last_transition_time(&self) -> Option<DateTime<Utc>> {
    self.conditions.iter().filter_map(|c| c.last_transition_time).max()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  #[test]
  fn set_condition_keeps_one_entry_per_type() {
    let mut cp = ConditionPhase::default();
    cp.set_condition(Condition::new("Deploy", ConditionStatus::Unknown, "DeployProcessing", "Processing"));
    cp.set_condition(Condition::new("Deploy", ConditionStatus::False, "DeployFailed", "boom"));
    cp.set_condition(Condition::new("Other", ConditionStatus::True, "OtherSucceeded", ""));
    cp.set_condition(Condition::new("Deploy", ConditionStatus::True, "DeploySucceeded", "ok"));

    assert_eq!(cp.conditions.len(), 2);
    let deploy = cp.find_condition("Deploy").unwrap();
    assert_eq!(deploy.status, ConditionStatus::True);
    assert_eq!(deploy.reason, "DeploySucceeded");
    assert_eq!(deploy.message, "ok");
  }

  #[test]
  fn transition_time_moves_only_on_status_change() {
    let mut cp = ConditionPhase::default();
    let earlier = Utc::now() - Duration::hours(1);
    let mut first = Condition::new("A", ConditionStatus::True, "Ok", "first");
    first.last_transition_time = Some(earlier);
    cp.set_condition(first);

    cp.set_condition(Condition::new("A", ConditionStatus::True, "StillOk", "second"));
    assert_eq!(cp.find_condition("A").unwrap().last_transition_time, Some(earlier));

    cp.set_condition(Condition::new("A", ConditionStatus::False, "Broken", "third"));
    let t = cp.find_condition("A").unwrap().last_transition_time.unwrap();
    assert!(t > earlier);
    assert_eq!(cp.last_transition_time(), Some(t));
  }

  #[test]
  #[should_panic(expected = "without whitespace")]
  fn reason_with_space_panics() {
    let _ = Condition::new("A", ConditionStatus::True, "Not Valid", "");
  }

  #[test]
  fn check_ready_respects_filter() {
    let mut cp = ConditionPhase::default();
    cp.set_condition(Condition::new("A", ConditionStatus::True, "Ok", ""));
    cp.set_condition(Condition::new("B", ConditionStatus::False, "Bad", ""));

    cp.check_ready(None, &[]);
    assert!(cp.phase.is_empty());

    cp.check_ready(Some(Phase::RUNNING), &["A"]);
    assert_eq!(cp.phase, Phase::RUNNING);
    assert!(cp.phase.is_success());
  }

  #[test]
  fn serializes_with_kubernetes_field_names() {
    let mut cp = ConditionPhase::default();
    cp.set_condition(Condition::new("A", ConditionStatus::True, "Ok", "fine"));
    cp.phase = Phase::READY;
    let value = serde_json::to_value(&cp).unwrap();
    assert_eq!(value["phase"], "Ready");
    assert_eq!(value["conditions"][0]["type"], "A");
    assert_eq!(value["conditions"][0]["status"], "True");
    assert!(value["conditions"][0]["lastTransitionTime"].is_string());

    let back: ConditionPhase = serde_json::from_value(value).unwrap();
    assert_eq!(back, cp);
  }
}
