// reconstep/src/finalizer.rs

//! Cleanup-before-delete protocol tying a finalizer token to the resource's
//! pending-deletion marker.

use crate::client::{Resource, ResourceClient};
use crate::core::object_cell::ObjectCell;
use crate::error::{ReconcileError, Result};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tracing::{event, Level};

/// Async cleanup run while the resource is terminating.
pub type DeletionCallback<K> = Arc<dyn Fn(ObjectCell<K>) -> CleanupFuture + Send + Sync>;

pub type CleanupFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// Drives the finalizer protocol for the object held in `cell`.
///
/// - Not terminating: makes sure `finalizer` is present, persisting it with an
///   update if it had to be added. Returns `Ok(false)`.
/// - Terminating: runs `callback` first; only if it succeeds is the token
///   removed and persisted. Returns `Ok(true)`, meaning the caller must stop
///   processing this invocation. A failing callback leaves the token in place
///   so deletion stays blocked until a later invocation succeeds.
pub async fn finalize<K, C>(
  client: &C,
  cell: &ObjectCell<K>,
  finalizer: &str,
  callback: Option<&DeletionCallback<K>>,
) -> Result<bool>
where
  K: Resource,
  C: ResourceClient<K> + ?Sized,
{
  let terminating = cell.read().is_terminating();

  if terminating {
    if let Some(callback) = callback {
      callback(cell.clone()).await.map_err(|source| ReconcileError::Finalize {
        finalizer: finalizer.to_string(),
        source,
      })?;
    }
    let mut obj = cell.snapshot();
    if obj.remove_finalizer(finalizer) {
      client.update(&mut obj).await?;
      cell.replace(obj);
      event!(Level::DEBUG, %finalizer, "Removed finalizer from object.");
    }
    return Ok(true);
  }

  let mut obj = cell.snapshot();
  if obj.add_finalizer(finalizer) {
    client.update(&mut obj).await?;
    cell.replace(obj);
    event!(Level::DEBUG, %finalizer, "Added finalizer to object.");
  }
  Ok(false)
}
