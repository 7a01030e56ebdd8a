//! In-flight lock table
//!
//! Serializes work per key within one registry. The first caller for a key
//! holds its slot; later callers wait on the slot and then observe whatever
//! the holder published before releasing it. Slots are dropped from the
//! table once nobody holds or waits on them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slot<T> = Arc<AsyncMutex<Option<T>>>;

pub struct InflightTable<T> {
    slots: Mutex<HashMap<String, Slot<T>>>,
}

impl<T> Default for InflightTable<T> {
    fn default() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
        }
    }
}

impl<T: Clone> InflightTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until the slot for `key` is free and take it
    pub async fn acquire(&self, key: &str) -> InflightGuard<'_, T> {
        let slot = self.slots().entry(key.to_string()).or_default().clone();
        let guard = slot.lock_owned().await;

        InflightGuard {
            table: self,
            key: key.to_string(),
            guard,
        }
    }

    /// Number of keys currently held or waited on
    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot<T>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive hold on one key
pub struct InflightGuard<'a, T: Clone> {
    table: &'a InflightTable<T>,
    key: String,
    guard: OwnedMutexGuard<Option<T>>,
}

impl<T: Clone> InflightGuard<'_, T> {
    /// Outcome published by a previous holder of this slot
    pub fn settled(&self) -> Option<T> {
        (*self.guard).clone()
    }

    /// Publish an outcome for callers waiting on this slot
    pub fn publish(&mut self, value: T) {
        *self.guard = Some(value);
    }
}

impl<T: Clone> Drop for InflightGuard<'_, T> {
    fn drop(&mut self) {
        let mut slots = self.table.slots();
        let slot = OwnedMutexGuard::mutex(&self.guard);

        // One reference is the table's, one is ours: nobody is waiting
        if Arc::strong_count(slot) == 2
            && slots.get(&self.key).is_some_and(|s| Arc::ptr_eq(s, slot))
        {
            slots.remove(&self.key);
        }
    }
}
