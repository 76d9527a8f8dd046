use std::sync::Arc;

use async_trait::async_trait;
use tabflow_dataset::{DataSet, Row, RowId};
use tabflow_host::{HostBridge, HostError, HostNotification};
use tracing::trace;

use crate::cache::ResultCache;

/// A [`HostBridge`] that serves dataset and row reads from a [`ResultCache`].
///
/// Writes go straight to the host and drop whatever they could have changed.
/// Host notifications must be fed in through [`CachedHost::observe`] before
/// they are acted upon.
pub struct CachedHost {
  host: Arc<dyn HostBridge>,
  cache: Arc<ResultCache>,
}

impl CachedHost {
  pub fn new(host: Arc<dyn HostBridge>) -> Self {
    Self::with_cache(host, Arc::new(ResultCache::new()))
  }

  pub fn with_cache(host: Arc<dyn HostBridge>, cache: Arc<ResultCache>) -> Self {
    Self { host, cache }
  }

  pub fn cache(&self) -> &ResultCache {
    &self.cache
  }

  /// The uncached bridge underneath.
  pub fn inner(&self) -> &Arc<dyn HostBridge> {
    &self.host
  }

  /// Apply the invalidation policy for a host notification.
  pub fn observe(&self, notification: &HostNotification) {
    self.cache.apply_notification(notification);
  }
}

#[async_trait]
impl HostBridge for CachedHost {
  async fn get_context_and_dataset(&self, context: &str) -> Result<DataSet, HostError> {
    if let (Some(schema), Some(rows)) = (self.cache.get_schema(context), self.cache.get_rows(context)) {
      trace!(context, "dataset served from cache");
      return Ok(DataSet::new(schema, rows));
    }

    let generation = self.cache.generation(context);
    let dataset = self.host.get_context_and_dataset(context).await?;
    self
      .cache
      .fill(context, generation, dataset.schema.clone(), dataset.rows.clone());
    Ok(dataset)
  }

  async fn get_row(&self, context: &str, row: RowId) -> Result<Row, HostError> {
    if let Some(cached) = self.cache.get_row(context, row) {
      return Ok(cached);
    }

    let generation = self.cache.generation(context);
    let fetched = self.host.get_row(context, row).await?;
    self.cache.fill_row(context, generation, fetched.clone());
    Ok(fetched)
  }

  async fn create_context_with_dataset(&self, dataset: DataSet) -> Result<String, HostError> {
    let name = self.host.create_context_with_dataset(dataset).await?;
    self.cache.invalidate_context(&name);
    Ok(name)
  }

  async fn update_context_with_dataset(
    &self,
    context: &str,
    dataset: DataSet,
  ) -> Result<(), HostError> {
    let result = self.host.update_context_with_dataset(context, dataset).await;
    // A failed write may still have been partially applied
    self.cache.invalidate_context(context);
    result
  }

  async fn delete_context(&self, context: &str) -> Result<(), HostError> {
    let result = self.host.delete_context(context).await;
    self.cache.invalidate_context(context);
    result
  }

  async fn create_text(&self, title: &str, content: &str) -> Result<String, HostError> {
    self.host.create_text(title, content).await
  }

  async fn update_text(&self, text: &str, content: &str) -> Result<(), HostError> {
    self.host.update_text(text, content).await
  }

  async fn get_context_title(&self, context: &str) -> Result<String, HostError> {
    self.host.get_context_title(context).await
  }

  async fn get_component_title(&self, component: &str) -> Result<String, HostError> {
    self.host.get_component_title(component).await
  }

  async fn set_context_title(&self, context: &str, title: &str) -> Result<(), HostError> {
    let result = self.host.set_context_title(context, title).await;
    self.cache.invalidate_schema(context);
    result
  }

  async fn set_context_description(
    &self,
    context: &str,
    description: &str,
  ) -> Result<(), HostError> {
    let result = self.host.set_context_description(context, description).await;
    self.cache.invalidate_schema(context);
    result
  }

  async fn set_component_title(&self, component: &str, title: &str) -> Result<(), HostError> {
    self.host.set_component_title(component, title).await
  }
}
