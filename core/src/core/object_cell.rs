// reconstep/src/core/object_cell.rs
use parking_lot::{MappedRwLockReadGuard, MappedRwLockWriteGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

/// The live copy of the resource being reconciled, shared between the engine
/// and the transition functions of one invocation.
///
/// The engine refreshes the contents from the store before every step, so a
/// transition function always sees the latest persisted state plus whatever
/// earlier code in the same cycle changed.
///
/// IMPORTANT: guards are blocking and MUST be dropped before any `.await`.
#[derive(Debug)]
pub struct ObjectCell<K>(Arc<RwLock<K>>);

impl<K: Send + Sync + 'static> ObjectCell<K> {
  pub fn new(obj: K) -> Self {
    ObjectCell(Arc::new(RwLock::new(obj)))
  }

  pub fn read(&self) -> RwLockReadGuard<'_, K> {
    self.0.read()
  }

  pub fn write(&self) -> RwLockWriteGuard<'_, K> {
    self.0.write()
  }

  /// Guard over one part of the object, e.g. `cell.map_read(|o| &o.spec)`.
  pub fn map_read<F, U: ?Sized>(&self, f: F) -> MappedRwLockReadGuard<'_, U>
  where
    F: FnOnce(&K) -> &U,
  {
    RwLockReadGuard::map(self.read(), f)
  }

  pub fn map_write<F, U: ?Sized>(&self, f: F) -> MappedRwLockWriteGuard<'_, U>
  where
    F: FnOnce(&mut K) -> &mut U,
  {
    RwLockWriteGuard::map(self.write(), f)
  }

  /// Swaps in a new object, returning the old one.
  pub fn replace(&self, obj: K) -> K {
    std::mem::replace(&mut *self.write(), obj)
  }
}

impl<K: Clone + Send + Sync + 'static> ObjectCell<K> {
  /// An owned deep copy of the current contents.
  pub fn snapshot(&self) -> K {
    self.read().clone()
  }
}

impl<K: Send + Sync + 'static> Clone for ObjectCell<K> {
  fn clone(&self) -> Self {
    ObjectCell(Arc::clone(&self.0))
  }
}
