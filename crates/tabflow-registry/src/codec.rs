//! Save-state blob handed to and from the host.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::description::TransformationDescription;
use crate::error::CodecError;
use crate::registry::Registry;

/// Output ids a person edited after they were created.
pub type EditedOutputs = BTreeSet<String>;

/// Persisted shape of the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedState {
  /// Each tracked description once.
  #[serde(default)]
  pub active_transformations: Vec<TransformationDescription>,
  #[serde(default)]
  pub edited_outputs: Vec<String>,
}

impl SavedState {
  pub fn capture(registry: &Registry, edited: &EditedOutputs) -> Self {
    Self {
      active_transformations: registry.serialize(),
      edited_outputs: edited.iter().cloned().collect(),
    }
  }

  pub fn encode(&self) -> Value {
    // Plain data; serializing to a Value cannot fail
    serde_json::to_value(self).unwrap_or(Value::Null)
  }

  /// Decode a blob. `null` is an empty state.
  pub fn decode(value: Value) -> Result<Self, CodecError> {
    if value.is_null() {
      return Ok(Self::default());
    }
    let state: SavedState = serde_json::from_value(value)?;
    state.check_ids()?;
    Ok(state)
  }

  fn check_ids(&self) -> Result<(), CodecError> {
    for (index, description) in self.active_transformations.iter().enumerate() {
      let conflicting = self.active_transformations[..index]
        .iter()
        .any(|earlier| earlier.id == description.id && earlier != description);
      if conflicting {
        return Err(CodecError::ConflictingId(description.id.clone()));
      }
    }
    Ok(())
  }

  /// Rebuild the registry and edited set.
  pub fn restore(self) -> (Registry, EditedOutputs) {
    let mut unique: Vec<TransformationDescription> = Vec::new();
    for description in self.active_transformations {
      if !unique.iter().any(|d| d.id == description.id) {
        unique.push(description);
      }
    }
    (
      Registry::deserialize(unique),
      self.edited_outputs.into_iter().collect(),
    )
  }
}
