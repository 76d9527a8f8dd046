use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tabflow_dataset::{ContextSchema, Row, RowId};
use tabflow_host::{ChangeCategory, ContextChange, HostNotification};
use tracing::debug;

/// Hit and miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
  pub hits: u64,
  pub misses: u64,
}

#[derive(Default)]
struct Stores {
  schemas: HashMap<String, ContextSchema>,
  row_sets: HashMap<String, Vec<Row>>,
  /// Row ids are only unique within a context.
  rows: HashMap<String, HashMap<RowId, Row>>,
  /// Bumped whenever anything cached for a context is invalidated.
  generations: HashMap<String, u64>,
}

impl Stores {
  fn bump(&mut self, context: &str) {
    *self.generations.entry(context.to_string()).or_default() += 1;
  }

  fn insert_rows<'a>(&mut self, context: &str, rows: impl IntoIterator<Item = &'a Row>) {
    let cached = self.rows.entry(context.to_string()).or_default();
    for row in rows {
      cached.insert(row.id, row.clone());
    }
  }
}

/// Memoized host reads, invalidated by notification category.
pub struct ResultCache {
  stores: RwLock<Stores>,
  hits: AtomicU64,
  misses: AtomicU64,
}

impl ResultCache {
  pub fn new() -> Self {
    Self {
      stores: RwLock::new(Stores::default()),
      hits: AtomicU64::new(0),
      misses: AtomicU64::new(0),
    }
  }

  fn read(&self) -> RwLockReadGuard<'_, Stores> {
    self.stores.read().unwrap_or_else(|e| e.into_inner())
  }

  fn write(&self) -> RwLockWriteGuard<'_, Stores> {
    self.stores.write().unwrap_or_else(|e| e.into_inner())
  }

  fn record<T>(&self, found: Option<T>) -> Option<T> {
    let counter = if found.is_some() {
      &self.hits
    } else {
      &self.misses
    };
    counter.fetch_add(1, Ordering::Relaxed);
    found
  }

  pub fn stats(&self) -> CacheStats {
    CacheStats {
      hits: self.hits.load(Ordering::Relaxed),
      misses: self.misses.load(Ordering::Relaxed),
    }
  }

  /// Current invalidation generation of a context.
  ///
  /// Take it before a host read and hand it to [`ResultCache::fill`] so a
  /// result that raced with an invalidation is discarded.
  pub fn generation(&self, context: &str) -> u64 {
    self.read().generations.get(context).copied().unwrap_or(0)
  }

  pub fn get_schema(&self, context: &str) -> Option<ContextSchema> {
    let found = self.read().schemas.get(context).cloned();
    self.record(found)
  }

  pub fn set_schema(&self, context: &str, schema: ContextSchema) {
    self.write().schemas.insert(context.to_string(), schema);
  }

  pub fn get_rows(&self, context: &str) -> Option<Vec<Row>> {
    let found = self.read().row_sets.get(context).cloned();
    self.record(found)
  }

  /// Cache the full row list of a context. Each row is cached individually too.
  pub fn set_rows(&self, context: &str, rows: Vec<Row>) {
    let mut stores = self.write();
    stores.insert_rows(context, &rows);
    stores.row_sets.insert(context.to_string(), rows);
  }

  pub fn get_row(&self, context: &str, row: RowId) -> Option<Row> {
    let found = self
      .read()
      .rows
      .get(context)
      .and_then(|rows| rows.get(&row))
      .cloned();
    self.record(found)
  }

  pub fn set_row(&self, context: &str, row: Row) {
    self.write().insert_rows(context, [&row]);
  }

  /// Store a schema and row list read from the host, unless the context was
  /// invalidated after `generation` was taken. Returns whether it was stored.
  pub fn fill(&self, context: &str, generation: u64, schema: ContextSchema, rows: Vec<Row>) -> bool {
    let mut stores = self.write();
    if stores.generations.get(context).copied().unwrap_or(0) != generation {
      debug!(context, "discarding cache fill that raced with an invalidation");
      return false;
    }
    stores.insert_rows(context, &rows);
    stores.schemas.insert(context.to_string(), schema);
    stores.row_sets.insert(context.to_string(), rows);
    true
  }

  /// Store a single row read from the host, subject to the same generation check.
  pub fn fill_row(&self, context: &str, generation: u64, row: Row) -> bool {
    let mut stores = self.write();
    if stores.generations.get(context).copied().unwrap_or(0) != generation {
      return false;
    }
    stores.insert_rows(context, [&row]);
    true
  }

  /// Purge everything cached for a context.
  pub fn invalidate_context(&self, context: &str) {
    let mut stores = self.write();
    stores.schemas.remove(context);
    stores.row_sets.remove(context);
    stores.rows.remove(context);
    stores.bump(context);
  }

  pub fn invalidate_schema(&self, context: &str) {
    let mut stores = self.write();
    stores.schemas.remove(context);
    stores.bump(context);
  }

  /// Drop the ordered row list of a context, keeping individual rows.
  pub fn invalidate_row_set(&self, context: &str) {
    let mut stores = self.write();
    stores.row_sets.remove(context);
    stores.bump(context);
  }

  pub fn invalidate_row(&self, context: &str, row: RowId) {
    let mut stores = self.write();
    if let Some(rows) = stores.rows.get_mut(context) {
      rows.remove(&row);
    }
    stores.bump(context);
  }

  /// Drop the row list and every individual row of a context.
  pub fn invalidate_all_rows_in(&self, context: &str) {
    let mut stores = self.write();
    stores.row_sets.remove(context);
    stores.rows.remove(context);
    stores.bump(context);
  }

  /// Apply the invalidation policy for one host notification.
  pub fn apply_notification(&self, notification: &HostNotification) {
    match notification {
      HostNotification::ContextChanged {
        context, change, ..
      } => {
        debug!(context = %context, ?change, "invalidating cached reads");
        match (change.category(), change) {
          (
            ChangeCategory::Rows,
            ContextChange::UpdateCases { ids: Some(ids) } | ContextChange::DeleteCases { ids: Some(ids) },
          ) => {
            self.invalidate_row_set(context);
            for id in ids {
              self.invalidate_row(context, *id);
            }
          }
          (ChangeCategory::Rows, ContextChange::UpdateCases { ids: None } | ContextChange::DeleteCases { ids: None }) => {
            self.invalidate_all_rows_in(context);
          }
          // Creating or moving rows leaves existing rows intact
          (ChangeCategory::Rows, _) => self.invalidate_row_set(context),
          // Attribute and collection changes touch every row and the schema
          (ChangeCategory::Columns | ChangeCategory::Collections, _) => {
            self.invalidate_schema(context);
            self.invalidate_all_rows_in(context);
          }
          (ChangeCategory::Metadata, _) => self.invalidate_schema(context),
        }
      }
      HostNotification::ContextDeleted { context } => {
        debug!(context = %context, "purging deleted context from cache");
        self.invalidate_context(context);
      }
      HostNotification::TitleChanged { artifact } => self.invalidate_schema(artifact),
      HostNotification::TextDeleted { .. } => {}
    }
  }
}

impl Default for ResultCache {
  fn default() -> Self {
    Self::new()
  }
}
