// reconstep/src/patch/engine.rs

//! One optimistic fetch → mutate → diff → patch cycle, with main fields and
//! the status subtree persisted through separate merge patches.

use super::merge::{FieldSnapshot, STATUS_KEY};
use crate::client::{Resource, ResourceClient};
use crate::core::control::OperationResult;
use crate::core::object_cell::ObjectCell;
use crate::error::{ReconcileError, Result};
use serde_json::Value;
use std::future::Future;
use tracing::{event, instrument, Level};

/// Outcome of a patch cycle. A mutation error does not prevent patching
/// unless the cycle aborts on mutation errors, so both can be present.
#[derive(Debug)]
pub struct Patched<E> {
  pub operation: OperationResult,
  pub mutate_error: Option<E>,
}

impl<E> Patched<E> {
  pub fn into_result(self) -> std::result::Result<OperationResult, E> {
    match self.mutate_error {
      Some(e) => Err(e),
      None => Ok(self.operation),
    }
  }
}

type OnChange<'a, K> = Box<dyn FnOnce(&mut K) + Send + 'a>;

/// Builder for a single patch cycle against `cell`.
///
/// ```ignore
/// let patched = PatchCycle::new(&client, &cell)
///   .run(|| async { cell.write().spec.replicas = 3; Ok::<_, anyhow::Error>(()) })
///   .await?;
/// ```
pub struct PatchCycle<'a, K, C>
where
  K: Resource,
  C: ResourceClient<K> + ?Sized,
{
  client: &'a C,
  cell: &'a ObjectCell<K>,
  abort_on_mutate_error: bool,
  on_change: Option<OnChange<'a, K>>,
}

impl<'a, K, C> PatchCycle<'a, K, C>
where
  K: Resource,
  C: ResourceClient<K> + ?Sized,
{
  pub fn new(client: &'a C, cell: &'a ObjectCell<K>) -> Self {
    Self {
      client,
      cell,
      abort_on_mutate_error: true,
      on_change: None,
    }
  }

  /// Keep diffing and patching whatever the mutation managed to change
  /// before it failed, then hand the error back with the outcome.
  pub fn persist_on_mutate_error(mut self) -> Self {
    self.abort_on_mutate_error = false;
    self
  }

  /// Runs once if the mutation changed anything, to layer further changes
  /// on top before the patches are computed.
  pub fn on_change(mut self, f: impl FnOnce(&mut K) + Send + 'a) -> Self {
    self.on_change = Some(Box::new(f));
    self
  }

  #[instrument(name = "PatchCycle::run", skip_all, fields(key = %self.cell.read().key()))]
  pub async fn run<F, Fut, E>(self, mutate: F) -> Result<Patched<E>>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<(), E>>,
  {
    let key = self.cell.read().key();
    let fetched = self.client.get(&key).await?;
    self.cell.replace(fetched);

    let base = self.cell.snapshot();
    let before = FieldSnapshot::capture(&base)?;

    let mutate_error = mutate().await.err();
    let mutated_key = self.cell.read().key();
    if mutated_key != key {
      return Err(ReconcileError::IdentityChanged {
        before: key,
        after: mutated_key,
      });
    }
    if mutate_error.is_some() && self.abort_on_mutate_error {
      event!(Level::DEBUG, "Mutation failed, aborting without patch.");
      return Ok(Patched {
        operation: OperationResult::NoChange,
        mutate_error,
      });
    }

    let mut after = FieldSnapshot::capture(&*self.cell.read())?;
    if after != before {
      if let Some(on_change) = self.on_change {
        on_change(&mut *self.cell.write());
        after = FieldSnapshot::capture(&*self.cell.read())?;
      }
    }

    let mut operation = OperationResult::NoChange;
    let mut current = self.cell.snapshot();

    if before.main != after.main {
      event!(Level::DEBUG, "Main fields changed, patching.");
      self.client.patch(&mut current, &base).await?;
      self.cell.replace(current.clone());
      operation = OperationResult::Updated;
    }

    if before.status != after.status {
      let status_base = if operation == OperationResult::Updated {
        // The main patch handed back the stored status; diff the status
        // against the post-patch object and put our status back on it.
        let status_base = with_status(&current, before.status.as_ref())?;
        current = with_status(&current, after.status.as_ref())?;
        status_base
      } else {
        base
      };
      event!(Level::DEBUG, "Status changed, patching status subresource.");
      self.client.patch_status(&mut current, &status_base).await?;
      self.cell.replace(current);
      operation = match operation {
        OperationResult::Updated => OperationResult::UpdatedStatus,
        _ => OperationResult::UpdatedStatusOnly,
      };
    }

    event!(Level::DEBUG, ?operation, mutate_failed = mutate_error.is_some(), "Patch cycle finished.");
    Ok(Patched { operation, mutate_error })
  }
}

/// Replaces (or removes) the status subtree of `obj`.
fn with_status<K: Resource>(obj: &K, status: Option<&Value>) -> Result<K> {
  let mut value = serde_json::to_value(obj)?;
  if let Value::Object(map) = &mut value {
    match status {
      Some(status) => {
        map.insert(STATUS_KEY.to_string(), status.clone());
      }
      None => {
        map.remove(STATUS_KEY);
      }
    }
  }
  Ok(serde_json::from_value(value)?)
}

/// Fetches the latest state into `cell`, applies `mutate` and persists the
/// difference, aborting without any write if `mutate` fails.
pub async fn patch<K, C, F, Fut, E>(client: &C, cell: &ObjectCell<K>, mutate: F) -> Result<Patched<E>>
where
  K: Resource,
  C: ResourceClient<K> + ?Sized,
  F: FnOnce() -> Fut,
  Fut: Future<Output = std::result::Result<(), E>>,
{
  PatchCycle::new(client, cell).run(mutate).await
}
