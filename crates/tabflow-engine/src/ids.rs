//! Id generation for descriptions and their error handles.

use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out unique ids.
pub trait IdGenerator: Send + Sync {
  fn next_id(&self, prefix: &str) -> String;
}

/// Counter-based ids: `error-1`, `transformation-2`, ... Deterministic.
#[derive(Debug, Default)]
pub struct SequentialIds {
  next: AtomicU64,
}

impl SequentialIds {
  pub fn new() -> Self {
    Self::default()
  }
}

impl IdGenerator for SequentialIds {
  fn next_id(&self, prefix: &str) -> String {
    let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
    format!("{}-{}", prefix, n)
  }
}

/// Random v4 uuids.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIds;

impl IdGenerator for UuidIds {
  fn next_id(&self, prefix: &str) -> String {
    format!("{}-{}", prefix, uuid::Uuid::new_v4())
  }
}
