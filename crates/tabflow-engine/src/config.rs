use serde::{Deserialize, Serialize};

/// What happens to the dependents of a deleted artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionPolicy {
  /// Retitle the outputs with a suffix and a note, then stop tracking them.
  #[default]
  Freeze,
  /// Stop tracking without touching the outputs.
  Remove,
}

/// What the propagator does with an output a person edited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditedOutputPolicy {
  /// Recompute anyway and forget the edit.
  #[default]
  Overwrite,
  /// Leave the output alone and say so on the description's error handle.
  Skip,
}

/// Engine configuration. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  pub deletion_policy: DeletionPolicy,
  pub edited_output_policy: EditedOutputPolicy,
  /// Appended to the titles of frozen outputs.
  pub fixed_suffix: String,
  /// Change notifications propagated at the same time by the runner.
  pub max_concurrent_updates: usize,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      deletion_policy: DeletionPolicy::Freeze,
      edited_output_policy: EditedOutputPolicy::Overwrite,
      fixed_suffix: " [fixed]".to_string(),
      max_concurrent_updates: 100,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_partial_config_fills_defaults() {
    let config: EngineConfig =
      serde_json::from_value(json!({ "deletion_policy": "remove" })).unwrap();

    assert_eq!(config.deletion_policy, DeletionPolicy::Remove);
    assert_eq!(config.edited_output_policy, EditedOutputPolicy::Overwrite);
    assert_eq!(config.fixed_suffix, " [fixed]");
    assert_eq!(config.max_concurrent_updates, 100);
  }
}
