use std::collections::{BTreeMap, HashSet};

use serde_json::Value;
use tabflow_catalog::TransformState;

use crate::description::TransformationDescription;
use crate::error::RegistryError;

/// Changes to apply to a full-override description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DescriptionDelta {
  /// Replaces the extra dependencies when present.
  pub extra_dependencies: Option<Vec<String>>,
  /// Shallow-merged over the stored state when present.
  pub state: Option<TransformState>,
}

/// Source artifact id to the descriptions that read it.
///
/// A description with several inputs sits in every one of their buckets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Registry {
  buckets: BTreeMap<String, Vec<TransformationDescription>>,
}

impl Registry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append `description` to the bucket of each of its inputs.
  pub fn add(&mut self, description: TransformationDescription) {
    for input in &description.inputs {
      self
        .buckets
        .entry(input.clone())
        .or_default()
        .push(description.clone());
    }
  }

  /// Apply a delta to the full-override description `id` wherever it is
  /// indexed. Returns the edited description.
  pub fn edit(
    &mut self,
    id: &str,
    delta: DescriptionDelta,
  ) -> Result<TransformationDescription, RegistryError> {
    let current = self
      .find(id)
      .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
    if !current.is_full_override() {
      return Err(RegistryError::NotEditable {
        id: id.to_string(),
        transformer: current.transformer_name.clone(),
      });
    }

    let mut edited = current.clone();
    if let Some(extra) = delta.extra_dependencies {
      edited.extra_dependencies = extra;
    }
    if let Some(state) = delta.state {
      for (key, value) in state {
        edited.state.insert(key, value);
      }
    }

    for bucket in self.buckets.values_mut() {
      for slot in bucket.iter_mut().filter(|d| d.id == id) {
        *slot = edited.clone();
      }
    }
    Ok(edited)
  }

  /// Drop `description` from the buckets of its inputs. Returns whether anything was removed.
  pub fn remove(&mut self, description: &TransformationDescription) -> bool {
    let mut removed = false;
    for input in &description.inputs {
      if let Some(bucket) = self.buckets.get_mut(input) {
        let before = bucket.len();
        bucket.retain(|d| d.id != description.id);
        removed |= bucket.len() != before;
        if bucket.is_empty() {
          self.buckets.remove(input);
        }
      }
    }
    removed
  }

  /// Swap the whole index.
  pub fn replace_all(&mut self, other: Registry) {
    *self = other;
  }

  /// A copy of this registry without the descriptions invalidated by
  /// deleting `artifact`, plus those descriptions (each once).
  pub fn without_dependents(&self, artifact: &str) -> (Registry, Vec<TransformationDescription>) {
    let mut kept = Registry::new();
    let mut dropped: Vec<TransformationDescription> = Vec::new();
    for (key, bucket) in &self.buckets {
      for description in bucket {
        if description.depends_on(artifact) {
          if !dropped.iter().any(|d| d.id == description.id) {
            dropped.push(description.clone());
          }
        } else {
          kept
            .buckets
            .entry(key.clone())
            .or_default()
            .push(description.clone());
        }
      }
    }
    (kept, dropped)
  }

  /// Every tracked description exactly once, in bucket order.
  pub fn serialize(&self) -> Vec<TransformationDescription> {
    let mut seen = HashSet::new();
    self
      .buckets
      .values()
      .flatten()
      .filter(|d| seen.insert(d.id.clone()))
      .cloned()
      .collect()
  }

  /// Rebuild buckets by indexing each description under all of its inputs.
  pub fn deserialize(descriptions: Vec<TransformationDescription>) -> Registry {
    let mut registry = Registry::new();
    for description in descriptions {
      registry.add(description);
    }
    registry
  }

  pub fn bucket(&self, artifact: &str) -> &[TransformationDescription] {
    self
      .buckets
      .get(artifact)
      .map(Vec::as_slice)
      .unwrap_or_default()
  }

  pub fn buckets(&self) -> impl Iterator<Item = (&str, &[TransformationDescription])> {
    self
      .buckets
      .iter()
      .map(|(key, bucket)| (key.as_str(), bucket.as_slice()))
  }

  pub fn find(&self, id: &str) -> Option<&TransformationDescription> {
    self.buckets.values().flatten().find(|d| d.id == id)
  }

  /// Descriptions that write to `artifact`, each once.
  pub fn writers_of(&self, artifact: &str) -> Vec<&TransformationDescription> {
    let mut seen = HashSet::new();
    self
      .buckets
      .values()
      .flatten()
      .filter(|d| d.writes_to(artifact) && seen.insert(d.id.as_str()))
      .collect()
  }

  /// Whether `artifact` is read or written by any tracked description.
  pub fn tracks(&self, artifact: &str) -> bool {
    self.buckets.contains_key(artifact) || !self.writers_of(artifact).is_empty()
  }

  pub fn is_empty(&self) -> bool {
    self.buckets.is_empty()
  }

  /// Number of distinct descriptions.
  pub fn len(&self) -> usize {
    self.serialize().len()
  }

  /// Bucket diagram as JSON: artifact id to the ids of its descriptions.
  pub fn diagram(&self) -> Value {
    Value::Object(
      self
        .buckets
        .iter()
        .map(|(key, bucket)| {
          let ids = bucket.iter().map(|d| Value::String(d.id.clone())).collect();
          (key.clone(), Value::Array(ids))
        })
        .collect(),
    )
  }
}
