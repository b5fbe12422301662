// reconstep/src/client/mod.rs

//! The seams between the engine and the outside world: the resource model,
//! the `ResourceClient` store abstraction and the optional `EventSink`.

pub mod memory;

use crate::condition::ConditionPhase;
use crate::error::ClientError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use memory::{MemoryClient, RecordingEventSink};

/// Namespace/name pair identifying one resource in the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
  pub namespace: String,
  pub name: String,
}

impl ObjectKey {
  pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      namespace: namespace.into(),
      name: name.into(),
    }
  }
}

impl fmt::Display for ObjectKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.namespace.is_empty() {
      write!(f, "{}", self.name)
    } else {
      write!(f, "{}/{}", self.namespace, self.name)
    }
  }
}

/// Object metadata the engine relies on. Serialized under `metadata`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
  pub name: String,
  #[serde(default, skip_serializing_if = "String::is_empty")]
  pub namespace: String,
  /// Optimistic-concurrency token, owned by the store.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub resource_version: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub generation: Option<i64>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub finalizers: Vec<String>,
  /// Pending-deletion marker.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
  pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      namespace: namespace.into(),
      ..Default::default()
    }
  }
}

/// A structured resource the engine can reconcile.
///
/// The serialized form must carry the metadata under `metadata` and the
/// condition/phase bookkeeping somewhere inside the top-level `status` key,
/// since the status subtree is what gets patched through the status
/// subresource.
pub trait Resource: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
  fn meta(&self) -> &ObjectMeta;
  fn meta_mut(&mut self) -> &mut ObjectMeta;

  fn condition_phase(&self) -> &ConditionPhase;
  fn condition_phase_mut(&mut self) -> &mut ConditionPhase;

  fn key(&self) -> ObjectKey {
    let meta = self.meta();
    ObjectKey::new(meta.namespace.clone(), meta.name.clone())
  }

  fn is_terminating(&self) -> bool {
    self.meta().deletion_timestamp.is_some()
  }

  fn has_finalizer(&self, finalizer: &str) -> bool {
    self.meta().finalizers.iter().any(|f| f == finalizer)
  }

  /// Returns `true` if the finalizer was not present and got added.
  fn add_finalizer(&mut self, finalizer: &str) -> bool {
    if self.has_finalizer(finalizer) {
      return false;
    }
    self.meta_mut().finalizers.push(finalizer.to_string());
    true
  }

  /// Returns `true` if the finalizer was present and got removed.
  fn remove_finalizer(&mut self, finalizer: &str) -> bool {
    let finalizers = &mut self.meta_mut().finalizers;
    let before = finalizers.len();
    finalizers.retain(|f| f != finalizer);
    before != finalizers.len()
  }
}

/// Backing store for resources of type `K`.
///
/// Every write method refreshes `obj` with what the store persisted
/// (including a new resource version). The status subresource is written
/// independently from the main fields: `update`/`patch` ignore `status`,
/// `update_status`/`patch_status` touch nothing else.
#[async_trait]
pub trait ResourceClient<K: Resource>: Send + Sync {
  async fn get(&self, key: &ObjectKey) -> Result<K, ClientError>;

  async fn update(&self, obj: &mut K) -> Result<(), ClientError>;

  async fn update_status(&self, obj: &mut K) -> Result<(), ClientError>;

  /// Merge-patch the main fields of `obj`, using `base` as the snapshot the
  /// patch is computed against. `base` carries the concurrency token.
  async fn patch(&self, obj: &mut K, base: &K) -> Result<(), ClientError>;

  /// Merge-patch the status subtree of `obj` against `base`.
  async fn patch_status(&self, obj: &mut K, base: &K) -> Result<(), ClientError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSeverity {
  Normal,
  Warning,
}

/// Receives human-facing events about condition changes.
pub trait EventSink<K: Resource>: Send + Sync {
  fn event(&self, obj: &K, severity: EventSeverity, reason: &str, message: &str);
}
