//! Per-key async mutexes.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Serializes work per key (a source or output artifact id).
///
/// Unused entries are dropped the next time any key is locked.
#[derive(Debug, Default)]
pub struct KeyedLocks {
  locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
  pub fn new() -> Self {
    Self::default()
  }

  /// Wait for exclusive access to `key`.
  pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
    let mutex = {
      let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
      // Only the map holds a reference: nobody is waiting on or holding it
      locks.retain(|k, m| k == key || Arc::strong_count(m) > 1);
      locks.entry(key.to_string()).or_default().clone()
    };
    mutex.lock_owned().await
  }

  /// Lock several keys in sorted order so overlapping sets cannot deadlock.
  pub async fn lock_all<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Vec<OwnedMutexGuard<()>> {
    let mut keys: Vec<&str> = keys.into_iter().collect();
    keys.sort_unstable();
    keys.dedup();
    let mut guards = Vec::with_capacity(keys.len());
    for key in keys {
      guards.push(self.lock(key).await);
    }
    guards
  }

  /// Keys currently held or awaited.
  pub fn len(&self) -> usize {
    self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
