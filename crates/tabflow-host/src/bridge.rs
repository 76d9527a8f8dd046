use async_trait::async_trait;
use tabflow_dataset::{DataSet, Row, RowId};

use crate::error::HostError;

/// Request/response surface of the host application.
///
/// Data contexts are identified by their name, text components by the id the
/// host assigned on creation. Every call is a round trip to the host; callers
/// that read repeatedly should go through a caching wrapper.
#[async_trait]
pub trait HostBridge: Send + Sync {
  /// Read the schema and all rows of a data context.
  async fn get_context_and_dataset(&self, context: &str) -> Result<DataSet, HostError>;

  /// Read a single row of a data context.
  async fn get_row(&self, context: &str, row: RowId) -> Result<Row, HostError>;

  /// Create a new data context. Returns the identifier the host assigned,
  /// which may differ from the requested name if that name is taken.
  async fn create_context_with_dataset(&self, dataset: DataSet) -> Result<String, HostError>;

  /// Replace the collections and rows of an existing context in place.
  ///
  /// The context keeps its identifier, title and description.
  async fn update_context_with_dataset(
    &self,
    context: &str,
    dataset: DataSet,
  ) -> Result<(), HostError>;

  /// Delete a data context.
  async fn delete_context(&self, context: &str) -> Result<(), HostError>;

  /// Create a text component. Returns its identifier.
  async fn create_text(&self, title: &str, content: &str) -> Result<String, HostError>;

  /// Replace the content of an existing text component.
  async fn update_text(&self, text: &str, content: &str) -> Result<(), HostError>;

  /// Display title of a data context.
  async fn get_context_title(&self, context: &str) -> Result<String, HostError>;

  /// Display title of a component (text or otherwise).
  async fn get_component_title(&self, component: &str) -> Result<String, HostError>;

  async fn set_context_title(&self, context: &str, title: &str) -> Result<(), HostError>;

  async fn set_context_description(
    &self,
    context: &str,
    description: &str,
  ) -> Result<(), HostError>;

  async fn set_component_title(&self, component: &str, title: &str) -> Result<(), HostError>;
}
