use serde::{Deserialize, Serialize};
use tabflow_catalog::{OutputType, TransformState};

/// Stable identity of a description, kept across edits.
pub type DescriptionId = String;

/// A tracked transformation: what it reads, what it writes and how to rerun it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationDescription {
  pub id: DescriptionId,
  /// Source artifacts, in the order the transformer reads them.
  pub inputs: Vec<String>,
  /// Auxiliary artifacts whose deletion also invalidates this description.
  #[serde(default)]
  pub extra_dependencies: Vec<String>,
  /// Handle for the error message shown for this description.
  pub error_id: String,
  pub transformer_name: String,
  #[serde(default)]
  pub state: TransformState,
  #[serde(flatten)]
  pub kind: DescriptionKind,
}

/// The two kinds of tracked transformation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DescriptionKind {
  /// Output is recomputed from `state` and written over `output`.
  #[serde(rename_all = "camelCase")]
  DatasetCreator {
    output_type: OutputType,
    output: String,
    /// Text artifact listing rows with missing results.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    missing_value_report: Option<String>,
  },
  /// The transformer maintains its outputs itself and reports state changes.
  FullOverride,
}

impl TransformationDescription {
  pub fn dataset_creator(
    id: impl Into<String>,
    error_id: impl Into<String>,
    transformer_name: impl Into<String>,
    inputs: Vec<String>,
    state: TransformState,
    output_type: OutputType,
    output: impl Into<String>,
  ) -> Self {
    Self {
      id: id.into(),
      inputs,
      extra_dependencies: Vec::new(),
      error_id: error_id.into(),
      transformer_name: transformer_name.into(),
      state,
      kind: DescriptionKind::DatasetCreator {
        output_type,
        output: output.into(),
        missing_value_report: None,
      },
    }
  }

  pub fn full_override(
    id: impl Into<String>,
    error_id: impl Into<String>,
    transformer_name: impl Into<String>,
    inputs: Vec<String>,
    state: TransformState,
  ) -> Self {
    Self {
      id: id.into(),
      inputs,
      extra_dependencies: Vec::new(),
      error_id: error_id.into(),
      transformer_name: transformer_name.into(),
      state,
      kind: DescriptionKind::FullOverride,
    }
  }

  pub fn with_extra_dependencies(mut self, extra: Vec<String>) -> Self {
    self.extra_dependencies = extra;
    self
  }

  /// Record a missing-value report. Also listed as an extra dependency.
  pub fn with_missing_value_report(mut self, report: impl Into<String>) -> Self {
    let report = report.into();
    if let DescriptionKind::DatasetCreator {
      missing_value_report,
      ..
    } = &mut self.kind
    {
      if !self.extra_dependencies.contains(&report) {
        self.extra_dependencies.push(report.clone());
      }
      *missing_value_report = Some(report);
    }
    self
  }

  pub fn is_full_override(&self) -> bool {
    matches!(self.kind, DescriptionKind::FullOverride)
  }

  /// Artifacts this description writes to.
  ///
  /// Full-override outputs are tracked as extra dependencies.
  pub fn outputs(&self) -> Vec<&str> {
    match &self.kind {
      DescriptionKind::DatasetCreator { output, .. } => vec![output.as_str()],
      DescriptionKind::FullOverride => self.extra_dependencies.iter().map(String::as_str).collect(),
    }
  }

  /// Whether deleting `artifact` invalidates this description.
  pub fn depends_on(&self, artifact: &str) -> bool {
    self.inputs.iter().any(|i| i == artifact) || self.extra_dependencies.iter().any(|e| e == artifact)
  }

  pub fn writes_to(&self, artifact: &str) -> bool {
    self.outputs().contains(&artifact)
  }
}
