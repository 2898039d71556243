//! Per-group write serialization.

use std::{
  collections::HashMap,
  sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

type Entries = HashMap<Uuid, Arc<AsyncMutex<()>>>;

/// One async mutex per group. Mutations of a group hold its guard for their
/// whole duration; different groups never contend.
///
/// An entry lives only while someone holds or waits for it, so requests for
/// groups that do not exist leave nothing behind.
#[derive(Debug, Default)]
pub struct GroupLocks {
  inner: Mutex<Entries>,
}

/// Exclusive access to one group. Dropping it releases the lock.
pub struct GroupGuard<'a> {
  locks:    &'a GroupLocks,
  group_id: Uuid,
  guard:    Option<OwnedMutexGuard<()>>,
}

impl GroupLocks {
  pub fn new() -> Self { Self::default() }

  pub async fn lock(&self, group_id: Uuid) -> GroupGuard<'_> {
    let mutex = self.entries().entry(group_id).or_default().clone();
    GroupGuard {
      locks: self,
      group_id,
      guard: Some(mutex.lock_owned().await),
    }
  }

  fn entries(&self) -> std::sync::MutexGuard<'_, Entries> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }

  #[cfg(test)]
  pub(crate) fn len(&self) -> usize { self.entries().len() }
}

impl Drop for GroupGuard<'_> {
  fn drop(&mut self) {
    drop(self.guard.take());
    let mut entries = self.locks.entries();
    // Waiters clone the Arc under this same map lock, so a count of one
    // means the map holds the only reference.
    if entries
      .get(&self.group_id)
      .is_some_and(|m| Arc::strong_count(m) == 1)
    {
      entries.remove(&self.group_id);
    }
  }
}
