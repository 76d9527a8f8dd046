//! Per-description error messages for display.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tokio::sync::broadcast;

/// A change to the message shown under one error handle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorUpdate {
  pub error_id: String,
  /// `None` when the error was cleared.
  pub message: Option<String>,
}

/// Current messages by error handle, plus a broadcast of every change.
pub struct ErrorBoard {
  messages: RwLock<BTreeMap<String, String>>,
  updates: broadcast::Sender<ErrorUpdate>,
}

impl ErrorBoard {
  pub fn new() -> Self {
    let (updates, _) = broadcast::channel(64);
    Self {
      messages: RwLock::new(BTreeMap::new()),
      updates,
    }
  }

  fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, String>> {
    self.messages.read().unwrap_or_else(|e| e.into_inner())
  }

  fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, String>> {
    self.messages.write().unwrap_or_else(|e| e.into_inner())
  }

  pub fn subscribe(&self) -> broadcast::Receiver<ErrorUpdate> {
    self.updates.subscribe()
  }

  pub fn set(&self, error_id: &str, message: impl Into<String>) {
    let message = message.into();
    self.write().insert(error_id.to_string(), message.clone());
    // No subscribers is fine
    let _ = self.updates.send(ErrorUpdate {
      error_id: error_id.to_string(),
      message: Some(message),
    });
  }

  /// Clear a message. Only announced if there was one.
  pub fn clear(&self, error_id: &str) {
    if self.write().remove(error_id).is_some() {
      let _ = self.updates.send(ErrorUpdate {
        error_id: error_id.to_string(),
        message: None,
      });
    }
  }

  pub fn get(&self, error_id: &str) -> Option<String> {
    self.read().get(error_id).cloned()
  }

  pub fn all(&self) -> BTreeMap<String, String> {
    self.read().clone()
  }
}

impl Default for ErrorBoard {
  fn default() -> Self {
    Self::new()
  }
}
