// reconstep/src/patch/merge.rs

//! JSON merge-patch (RFC 7386) helpers over `serde_json::Value` field maps.

use serde::Serialize;
use serde_json::{Map, Value};

/// Top-level key holding the status subtree.
pub const STATUS_KEY: &str = "status";

/// Computes the merge patch that turns `original` into `modified`.
///
/// Removed keys become `null`, nested objects are diffed recursively and
/// anything else (arrays included) is replaced wholesale. Identical inputs
/// yield an empty object.
pub fn create_merge_patch(original: &Value, modified: &Value) -> Value {
  match (original, modified) {
    (Value::Object(orig), Value::Object(modi)) => Value::Object(diff_objects(orig, modi)),
    _ if original == modified => Value::Object(Map::new()),
    _ => modified.clone(),
  }
}

fn diff_objects(orig: &Map<String, Value>, modi: &Map<String, Value>) -> Map<String, Value> {
  let mut patch = Map::new();
  for key in orig.keys() {
    if !modi.contains_key(key) {
      patch.insert(key.clone(), Value::Null);
    }
  }
  for (key, new_value) in modi {
    match orig.get(key) {
      None => {
        patch.insert(key.clone(), new_value.clone());
      }
      Some(old_value) if old_value == new_value => {}
      Some(Value::Object(old_obj)) => match new_value {
        Value::Object(new_obj) => {
          patch.insert(key.clone(), Value::Object(diff_objects(old_obj, new_obj)));
        }
        _ => {
          patch.insert(key.clone(), new_value.clone());
        }
      },
      Some(_) => {
        patch.insert(key.clone(), new_value.clone());
      }
    }
  }
  patch
}

/// Applies a merge patch to `target` in place.
pub fn apply_merge_patch(target: &mut Value, patch: &Value) {
  let Value::Object(patch_obj) = patch else {
    *target = patch.clone();
    return;
  };
  if !target.is_object() {
    *target = Value::Object(Map::new());
  }
  if let Value::Object(target_obj) = target {
    for (key, value) in patch_obj {
      if value.is_null() {
        target_obj.remove(key);
      } else {
        let slot = target_obj.entry(key.clone()).or_insert(Value::Null);
        apply_merge_patch(slot, value);
      }
    }
  }
}

/// Whether a merge patch would change nothing.
pub fn is_empty_patch(patch: &Value) -> bool {
  matches!(patch, Value::Object(map) if map.is_empty())
}

/// Field map of an object with its status subtree split off.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSnapshot {
  pub main: Value,
  pub status: Option<Value>,
}

impl FieldSnapshot {
  pub fn capture<T: Serialize>(obj: &T) -> serde_json::Result<Self> {
    let mut main = serde_json::to_value(obj)?;
    let status = match &mut main {
      Value::Object(map) => map.remove(STATUS_KEY),
      _ => None,
    };
    Ok(Self { main, status })
  }

  pub fn has_status(&self) -> bool {
    self.status.is_some()
  }
}
