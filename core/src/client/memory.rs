// reconstep/src/client/memory.rs

//! In-process `ResourceClient` with optimistic concurrency and status
//! subresource semantics, plus an `EventSink` that records what it gets.
//! Useful for tests, demos and dry runs.

use super::{EventSeverity, EventSink, ObjectKey, Resource, ResourceClient};
use crate::error::ClientError;
use crate::patch::merge::{apply_merge_patch, create_merge_patch, FieldSnapshot, STATUS_KEY};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use tracing::{event, Level};

/// Client verbs, used for call counting and failure injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
  Get,
  Update,
  UpdateStatus,
  Patch,
  PatchStatus,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
  pub get: usize,
  pub update: usize,
  pub update_status: usize,
  pub patch: usize,
  pub patch_status: usize,
}

impl CallCounts {
  /// Number of write calls of any kind.
  pub fn writes(&self) -> usize {
    self.update + self.update_status + self.patch + self.patch_status
  }
}

#[derive(Default)]
struct Store {
  objects: HashMap<ObjectKey, Value>,
  next_version: u64,
  calls: CallCounts,
  failing: HashSet<Verb>,
}

impl Store {
  fn record(&mut self, verb: Verb, key: &ObjectKey) -> Result<(), ClientError> {
    match verb {
      Verb::Get => self.calls.get += 1,
      Verb::Update => self.calls.update += 1,
      Verb::UpdateStatus => self.calls.update_status += 1,
      Verb::Patch => self.calls.patch += 1,
      Verb::PatchStatus => self.calls.patch_status += 1,
    }
    if self.failing.contains(&verb) {
      return Err(ClientError::Other(anyhow::anyhow!("injected {:?} failure for {}", verb, key)));
    }
    Ok(())
  }

  fn bump(&mut self) -> String {
    self.next_version += 1;
    self.next_version.to_string()
  }

  fn stored(&self, key: &ObjectKey) -> Result<&Value, ClientError> {
    self.objects.get(key).ok_or_else(|| ClientError::NotFound { key: key.clone() })
  }

  fn check_version(&self, key: &ObjectKey, expected: Option<&str>) -> Result<(), ClientError> {
    let current = version_of(self.stored(key)?);
    match expected {
      Some(expected) if current.as_deref() != Some(expected) => Err(ClientError::Conflict {
        key: key.clone(),
        message: format!(
          "the object has been modified (expected version {}, found {})",
          expected,
          current.unwrap_or_default()
        ),
      }),
      _ => Ok(()),
    }
  }

  /// Stores `value` under `key` with a fresh version, dropping the object
  /// instead if it is marked for deletion and no finalizers remain.
  fn commit(&mut self, key: &ObjectKey, mut value: Value) -> Value {
    let version = self.bump();
    if let Some(meta) = value.get_mut("metadata").and_then(Value::as_object_mut) {
      meta.insert("resourceVersion".to_string(), Value::String(version));
    }
    if is_released(&value) {
      event!(Level::DEBUG, %key, "Last finalizer removed, deleting object.");
      self.objects.remove(key);
    } else {
      self.objects.insert(key.clone(), value.clone());
    }
    value
  }
}

fn version_of(value: &Value) -> Option<String> {
  value
    .pointer("/metadata/resourceVersion")
    .and_then(Value::as_str)
    .map(str::to_string)
}

fn is_released(value: &Value) -> bool {
  let marked = value
    .pointer("/metadata/deletionTimestamp")
    .is_some_and(|v| !v.is_null());
  let no_finalizers = value
    .pointer("/metadata/finalizers")
    .and_then(Value::as_array)
    .map_or(true, |f| f.is_empty());
  marked && no_finalizers
}

fn set_status(value: &mut Value, status: Option<Value>) {
  if let Value::Object(map) = value {
    match status {
      Some(status) => {
        map.insert(STATUS_KEY.to_string(), status);
      }
      None => {
        map.remove(STATUS_KEY);
      }
    }
  }
}

/// A `ResourceClient` over an in-memory map of JSON documents.
pub struct MemoryClient<K: Resource> {
  store: Mutex<Store>,
  _phantom: PhantomData<fn() -> K>,
}

impl<K: Resource> Default for MemoryClient<K> {
  fn default() -> Self {
    Self::new()
  }
}

impl<K: Resource> MemoryClient<K> {
  pub fn new() -> Self {
    Self {
      store: Mutex::new(Store::default()),
      _phantom: PhantomData,
    }
  }

  /// Creates or overwrites an object, returning it as stored.
  pub fn insert(&self, obj: K) -> Result<K, ClientError> {
    let key = obj.key();
    let value = serde_json::to_value(&obj)?;
    let stored = self.store.lock().commit(&key, value);
    Ok(serde_json::from_value(stored)?)
  }

  /// Reads an object without counting a `get` call.
  pub fn peek(&self, key: &ObjectKey) -> Option<K> {
    let store = self.store.lock();
    let value = store.objects.get(key)?.clone();
    serde_json::from_value(value).ok()
  }

  pub fn contains(&self, key: &ObjectKey) -> bool {
    self.store.lock().objects.contains_key(key)
  }

  /// Requests deletion: objects with finalizers only get the deletion
  /// marker, others are removed right away.
  pub fn delete(&self, key: &ObjectKey) -> Result<(), ClientError> {
    let mut store = self.store.lock();
    let mut value = store.stored(key)?.clone();
    if let Some(meta) = value.get_mut("metadata").and_then(Value::as_object_mut) {
      meta
        .entry("deletionTimestamp")
        .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));
    }
    store.commit(key, value);
    Ok(())
  }

  pub fn calls(&self) -> CallCounts {
    self.store.lock().calls
  }

  pub fn reset_calls(&self) {
    self.store.lock().calls = CallCounts::default();
  }

  /// Makes every subsequent call of `verb` fail until `clear_failures`.
  pub fn fail_on(&self, verb: Verb) {
    self.store.lock().failing.insert(verb);
  }

  pub fn clear_failures(&self) {
    self.store.lock().failing.clear();
  }
}

#[async_trait]
impl<K: Resource> ResourceClient<K> for MemoryClient<K> {
  async fn get(&self, key: &ObjectKey) -> Result<K, ClientError> {
    let value = {
      let mut store = self.store.lock();
      store.record(Verb::Get, key)?;
      store.stored(key)?.clone()
    };
    Ok(serde_json::from_value(value)?)
  }

  async fn update(&self, obj: &mut K) -> Result<(), ClientError> {
    let key = obj.key();
    let mut incoming = serde_json::to_value(&*obj)?;
    let committed = {
      let mut store = self.store.lock();
      store.record(Verb::Update, &key)?;
      store.check_version(&key, obj.meta().resource_version.as_deref())?;
      let stored_status = store.stored(&key)?.get(STATUS_KEY).cloned();
      set_status(&mut incoming, stored_status);
      store.commit(&key, incoming)
    };
    *obj = serde_json::from_value(committed)?;
    Ok(())
  }

  async fn update_status(&self, obj: &mut K) -> Result<(), ClientError> {
    let key = obj.key();
    let incoming = FieldSnapshot::capture(&*obj)?;
    let committed = {
      let mut store = self.store.lock();
      store.record(Verb::UpdateStatus, &key)?;
      store.check_version(&key, obj.meta().resource_version.as_deref())?;
      let mut value = store.stored(&key)?.clone();
      set_status(&mut value, incoming.status);
      store.commit(&key, value)
    };
    *obj = serde_json::from_value(committed)?;
    Ok(())
  }

  async fn patch(&self, obj: &mut K, base: &K) -> Result<(), ClientError> {
    let key = obj.key();
    let before = FieldSnapshot::capture(base)?;
    let after = FieldSnapshot::capture(&*obj)?;
    let patch = create_merge_patch(&before.main, &after.main);
    let committed = {
      let mut store = self.store.lock();
      store.record(Verb::Patch, &key)?;
      store.check_version(&key, base.meta().resource_version.as_deref())?;
      let mut value = store.stored(&key)?.clone();
      apply_merge_patch(&mut value, &patch);
      store.commit(&key, value)
    };
    *obj = serde_json::from_value(committed)?;
    Ok(())
  }

  async fn patch_status(&self, obj: &mut K, base: &K) -> Result<(), ClientError> {
    let key = obj.key();
    let before = FieldSnapshot::capture(base)?;
    let after = FieldSnapshot::capture(&*obj)?;
    let committed = {
      let mut store = self.store.lock();
      store.record(Verb::PatchStatus, &key)?;
      store.check_version(&key, base.meta().resource_version.as_deref())?;
      let mut value = store.stored(&key)?.clone();
      match (&before.status, after.status) {
        (Some(old), Some(new)) => {
          let mut status = value.get(STATUS_KEY).cloned().unwrap_or(Value::Null);
          apply_merge_patch(&mut status, &create_merge_patch(old, &new));
          set_status(&mut value, Some(status));
        }
        (_, new) => set_status(&mut value, new),
      }
      store.commit(&key, value)
    };
    *obj = serde_json::from_value(committed)?;
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
  pub key: ObjectKey,
  pub severity: EventSeverity,
  pub reason: String,
  pub message: String,
}

/// An `EventSink` that keeps every event in memory.
#[derive(Debug, Default)]
pub struct RecordingEventSink {
  events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingEventSink {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn events(&self) -> Vec<RecordedEvent> {
    self.events.lock().clone()
  }
}

impl<K: Resource> EventSink<K> for RecordingEventSink {
  fn event(&self, obj: &K, severity: EventSeverity, reason: &str, message: &str) {
    self.events.lock().push(RecordedEvent {
      key: obj.key(),
      severity,
      reason: reason.to_string(),
      message: message.to_string(),
    });
  }
}
