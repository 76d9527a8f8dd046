//! In-process host.
//!
//! [`MemoryHost`] keeps data contexts and text components in memory, answers
//! [`HostBridge`] calls against them and emits the notifications a real host
//! would emit. Methods outside the trait simulate edits made by a person in
//! the host and are tagged [`ChangeOrigin::User`].

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tabflow_dataset::{Attribute, DataSet, Row, RowId};
use tokio::sync::mpsc;
use tracing::debug;

use crate::bridge::HostBridge;
use crate::error::HostError;
use crate::protocol::{ChangeOrigin, ContextChange, Envelope, HostNotification};

/// A host call as recorded by [`MemoryHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
  GetDataSet(String),
  GetRow(String, RowId),
  CreateContext(String),
  UpdateContext(String),
  DeleteContext(String),
  CreateText(String),
  UpdateText(String),
  GetTitle(String),
  SetTitle(String),
  SetDescription(String),
}

/// A text component held by the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextComponent {
  pub title: String,
  pub content: String,
}

#[derive(Default)]
struct Inner {
  contexts: BTreeMap<String, DataSet>,
  texts: BTreeMap<String, TextComponent>,
  next_row_id: RowId,
  next_text_id: u64,
  calls: Vec<HostCall>,
  rejected: HashSet<String>,
  subscribers: Vec<mpsc::UnboundedSender<Envelope>>,
}

impl Inner {
  fn emit(&mut self, notification: HostNotification) {
    debug!(?notification, "host notification");
    let envelope = Envelope::new(notification);
    // Drop subscribers whose receiver is gone
    self
      .subscribers
      .retain(|sender| sender.send(envelope.clone()).is_ok());
  }

  fn check_writable(&self, id: &str, operation: &str) -> Result<(), HostError> {
    if self.rejected.contains(id) {
      return Err(HostError::Rejected {
        operation: operation.to_string(),
        message: format!("writes to '{}' are refused", id),
      });
    }
    Ok(())
  }

  fn fresh_row_ids(&mut self, rows: &mut [Row]) {
    for row in rows {
      self.next_row_id += 1;
      row.id = self.next_row_id;
    }
  }

  fn unique_context_name(&self, requested: &str) -> String {
    if !self.contexts.contains_key(requested) {
      return requested.to_string();
    }
    (2..)
      .map(|n| format!("{} {}", requested, n))
      .find(|candidate| !self.contexts.contains_key(candidate))
      .unwrap_or_else(|| requested.to_string())
  }

  fn context_mut(&mut self, context: &str) -> Result<&mut DataSet, HostError> {
    self
      .contexts
      .get_mut(context)
      .ok_or_else(|| HostError::ContextNotFound(context.to_string()))
  }
}

/// An in-memory [`HostBridge`] implementation.
#[derive(Default)]
pub struct MemoryHost {
  inner: Mutex<Inner>,
}

impl MemoryHost {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, Inner> {
    self.inner.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Register a channel that receives every notification the host emits.
  pub fn connect(&self, sender: mpsc::UnboundedSender<Envelope>) {
    self.lock().subscribers.push(sender);
  }

  /// Subscribe through a fresh channel.
  pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Envelope> {
    let (sender, receiver) = mpsc::unbounded_channel();
    self.connect(sender);
    receiver
  }

  /// Load a context as-is, keeping its row ids. Emits nothing.
  pub fn seed_context(&self, dataset: DataSet) {
    let mut inner = self.lock();
    let max_id = dataset.rows.iter().map(|r| r.id).max().unwrap_or(0);
    inner.next_row_id = inner.next_row_id.max(max_id);
    inner.contexts.insert(dataset.schema.name.clone(), dataset);
  }

  /// Make every write to `id` fail with [`HostError::Rejected`].
  pub fn reject_writes(&self, id: &str) {
    self.lock().rejected.insert(id.to_string());
  }

  pub fn context(&self, context: &str) -> Option<DataSet> {
    self.lock().contexts.get(context).cloned()
  }

  pub fn context_names(&self) -> Vec<String> {
    self.lock().contexts.keys().cloned().collect()
  }

  pub fn contexts(&self) -> BTreeMap<String, DataSet> {
    self.lock().contexts.clone()
  }

  pub fn text(&self, text: &str) -> Option<TextComponent> {
    self.lock().texts.get(text).cloned()
  }

  pub fn texts(&self) -> BTreeMap<String, TextComponent> {
    self.lock().texts.clone()
  }

  /// Calls made through the bridge so far.
  pub fn calls(&self) -> Vec<HostCall> {
    self.lock().calls.clone()
  }

  pub fn clear_calls(&self) {
    self.lock().calls.clear();
  }

  /// Add rows as a person would. Returns the new row ids.
  pub fn create_rows(
    &self,
    context: &str,
    values: Vec<Map<String, Value>>,
  ) -> Result<Vec<RowId>, HostError> {
    let mut inner = self.lock();
    let mut rows: Vec<Row> = values.into_iter().map(|v| Row::new(0, v)).collect();
    inner.fresh_row_ids(&mut rows);
    let ids: Vec<RowId> = rows.iter().map(|r| r.id).collect();
    inner.context_mut(context)?.rows.extend(rows);
    inner.emit(HostNotification::ContextChanged {
      context: context.to_string(),
      change: ContextChange::CreateCases { ids: ids.clone() },
      origin: ChangeOrigin::User,
    });
    Ok(ids)
  }

  /// Overwrite values of existing rows as a person would.
  pub fn update_rows(&self, context: &str, updates: Vec<Row>) -> Result<(), HostError> {
    let mut inner = self.lock();
    let dataset = inner.context_mut(context)?;
    let mut ids = Vec::with_capacity(updates.len());
    for update in updates {
      let row = dataset
        .rows
        .iter_mut()
        .find(|r| r.id == update.id)
        .ok_or_else(|| HostError::RowNotFound {
          context: context.to_string(),
          row: update.id,
        })?;
      row.values.extend(update.values);
      ids.push(update.id);
    }
    inner.emit(HostNotification::ContextChanged {
      context: context.to_string(),
      change: ContextChange::UpdateCases { ids: Some(ids) },
      origin: ChangeOrigin::User,
    });
    Ok(())
  }

  /// Remove rows as a person would.
  pub fn delete_rows(&self, context: &str, ids: &[RowId]) -> Result<(), HostError> {
    let mut inner = self.lock();
    inner
      .context_mut(context)?
      .rows
      .retain(|r| !ids.contains(&r.id));
    inner.emit(HostNotification::ContextChanged {
      context: context.to_string(),
      change: ContextChange::DeleteCases {
        ids: Some(ids.to_vec()),
      },
      origin: ChangeOrigin::User,
    });
    Ok(())
  }

  /// Append an attribute to the last (child-most) collection.
  pub fn create_attribute(&self, context: &str, attribute: Attribute) -> Result<(), HostError> {
    let mut inner = self.lock();
    let dataset = inner.context_mut(context)?;
    match dataset.schema.collections.last_mut() {
      Some(collection) => collection.attributes.push(attribute),
      None => {
        return Err(HostError::Rejected {
          operation: "createAttribute".to_string(),
          message: format!("data context '{}' has no collections", context),
        });
      }
    }
    inner.emit(HostNotification::ContextChanged {
      context: context.to_string(),
      change: ContextChange::CreateAttributes,
      origin: ChangeOrigin::User,
    });
    Ok(())
  }

  /// Delete a context as a person would.
  pub fn remove_context(&self, context: &str) -> Result<(), HostError> {
    let mut inner = self.lock();
    inner
      .contexts
      .remove(context)
      .ok_or_else(|| HostError::ContextNotFound(context.to_string()))?;
    inner.emit(HostNotification::ContextDeleted {
      context: context.to_string(),
    });
    Ok(())
  }

  /// Delete a text component as a person would.
  pub fn remove_text(&self, text: &str) -> Result<(), HostError> {
    let mut inner = self.lock();
    inner
      .texts
      .remove(text)
      .ok_or_else(|| HostError::TextNotFound(text.to_string()))?;
    inner.emit(HostNotification::TextDeleted {
      text: text.to_string(),
    });
    Ok(())
  }

  /// Retitle a context as a person would.
  pub fn rename_context(&self, context: &str, title: &str) -> Result<(), HostError> {
    let mut inner = self.lock();
    inner.context_mut(context)?.schema.title = title.to_string();
    inner.emit(HostNotification::TitleChanged {
      artifact: context.to_string(),
    });
    Ok(())
  }
}

#[async_trait]
impl HostBridge for MemoryHost {
  async fn get_context_and_dataset(&self, context: &str) -> Result<DataSet, HostError> {
    let mut inner = self.lock();
    inner.calls.push(HostCall::GetDataSet(context.to_string()));
    inner
      .contexts
      .get(context)
      .cloned()
      .ok_or_else(|| HostError::ContextNotFound(context.to_string()))
  }

  async fn get_row(&self, context: &str, row: RowId) -> Result<Row, HostError> {
    let mut inner = self.lock();
    inner.calls.push(HostCall::GetRow(context.to_string(), row));
    let dataset = inner
      .contexts
      .get(context)
      .ok_or_else(|| HostError::ContextNotFound(context.to_string()))?;
    dataset
      .row(row)
      .cloned()
      .ok_or_else(|| HostError::RowNotFound {
        context: context.to_string(),
        row,
      })
  }

  async fn create_context_with_dataset(&self, mut dataset: DataSet) -> Result<String, HostError> {
    let mut inner = self.lock();
    let name = inner.unique_context_name(&dataset.schema.name);
    inner.calls.push(HostCall::CreateContext(name.clone()));
    if dataset.schema.title.is_empty() || dataset.schema.title == dataset.schema.name {
      dataset.schema.title = name.clone();
    }
    dataset.schema.name = name.clone();
    inner.fresh_row_ids(&mut dataset.rows);
    inner.contexts.insert(name.clone(), dataset);
    Ok(name)
  }

  async fn update_context_with_dataset(
    &self,
    context: &str,
    dataset: DataSet,
  ) -> Result<(), HostError> {
    let mut inner = self.lock();
    inner.calls.push(HostCall::UpdateContext(context.to_string()));
    inner.check_writable(context, "updateContextWithDataSet")?;
    let mut rows = dataset.rows;
    inner.fresh_row_ids(&mut rows);
    let existing = inner.context_mut(context)?;
    existing.schema.collections = dataset.schema.collections;
    existing.rows = rows;
    inner.emit(HostNotification::ContextChanged {
      context: context.to_string(),
      change: ContextChange::UpdateCollection,
      origin: ChangeOrigin::Plugin,
    });
    Ok(())
  }

  async fn delete_context(&self, context: &str) -> Result<(), HostError> {
    let mut inner = self.lock();
    inner.calls.push(HostCall::DeleteContext(context.to_string()));
    inner.check_writable(context, "deleteContext")?;
    inner
      .contexts
      .remove(context)
      .ok_or_else(|| HostError::ContextNotFound(context.to_string()))?;
    inner.emit(HostNotification::ContextDeleted {
      context: context.to_string(),
    });
    Ok(())
  }

  async fn create_text(&self, title: &str, content: &str) -> Result<String, HostError> {
    let mut inner = self.lock();
    inner.next_text_id += 1;
    let id = format!("text-{}", inner.next_text_id);
    inner.calls.push(HostCall::CreateText(id.clone()));
    inner.texts.insert(
      id.clone(),
      TextComponent {
        title: title.to_string(),
        content: content.to_string(),
      },
    );
    Ok(id)
  }

  async fn update_text(&self, text: &str, content: &str) -> Result<(), HostError> {
    let mut inner = self.lock();
    inner.calls.push(HostCall::UpdateText(text.to_string()));
    inner.check_writable(text, "updateText")?;
    let component = inner
      .texts
      .get_mut(text)
      .ok_or_else(|| HostError::TextNotFound(text.to_string()))?;
    component.content = content.to_string();
    Ok(())
  }

  async fn get_context_title(&self, context: &str) -> Result<String, HostError> {
    let mut inner = self.lock();
    inner.calls.push(HostCall::GetTitle(context.to_string()));
    inner
      .contexts
      .get(context)
      .map(|d| d.schema.title.clone())
      .ok_or_else(|| HostError::ContextNotFound(context.to_string()))
  }

  async fn get_component_title(&self, component: &str) -> Result<String, HostError> {
    let mut inner = self.lock();
    inner.calls.push(HostCall::GetTitle(component.to_string()));
    inner
      .texts
      .get(component)
      .map(|t| t.title.clone())
      .ok_or_else(|| HostError::TextNotFound(component.to_string()))
  }

  async fn set_context_title(&self, context: &str, title: &str) -> Result<(), HostError> {
    let mut inner = self.lock();
    inner.calls.push(HostCall::SetTitle(context.to_string()));
    inner.check_writable(context, "setContextTitle")?;
    inner.context_mut(context)?.schema.title = title.to_string();
    inner.emit(HostNotification::TitleChanged {
      artifact: context.to_string(),
    });
    Ok(())
  }

  async fn set_context_description(
    &self,
    context: &str,
    description: &str,
  ) -> Result<(), HostError> {
    let mut inner = self.lock();
    inner.calls.push(HostCall::SetDescription(context.to_string()));
    inner.check_writable(context, "setContextDescription")?;
    inner.context_mut(context)?.schema.description = description.to_string();
    inner.emit(HostNotification::ContextChanged {
      context: context.to_string(),
      change: ContextChange::UpdateDataContext,
      origin: ChangeOrigin::Plugin,
    });
    Ok(())
  }

  async fn set_component_title(&self, component: &str, title: &str) -> Result<(), HostError> {
    let mut inner = self.lock();
    inner.calls.push(HostCall::SetTitle(component.to_string()));
    inner.check_writable(component, "setComponentTitle")?;
    let text = inner
      .texts
      .get_mut(component)
      .ok_or_else(|| HostError::TextNotFound(component.to_string()))?;
    text.title = title.to_string();
    inner.emit(HostNotification::TitleChanged {
      artifact: component.to_string(),
    });
    Ok(())
  }
}
