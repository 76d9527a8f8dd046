use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tabflow_dataset::{DataSet, RowId};
use tabflow_host::HostBridge;

use crate::error::TransformError;

/// Serializable snapshot of a transformer's configuration.
pub type TransformState = Map<String, Value>;

/// Kind of artifact a dataset creator writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutputType {
  Context,
  Text,
}

impl fmt::Display for OutputType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      OutputType::Context => write!(f, "dataset"),
      OutputType::Text => write!(f, "text"),
    }
  }
}

/// What a dataset creator computed.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
  DataSet(DataSet),
  Value(Value),
}

impl Payload {
  pub fn output_type(&self) -> OutputType {
    match self {
      Payload::DataSet(_) => OutputType::Context,
      Payload::Value(_) => OutputType::Text,
    }
  }
}

/// Result of running a dataset creator.
#[derive(Debug, Clone, PartialEq)]
pub struct CreatorOutput {
  pub payload: Payload,
  /// Source rows whose result was missing or undefined.
  pub missing_values: Vec<RowId>,
}

impl CreatorOutput {
  pub fn dataset(dataset: DataSet) -> Self {
    Self {
      payload: Payload::DataSet(dataset),
      missing_values: Vec::new(),
    }
  }

  pub fn value(value: Value) -> Self {
    Self {
      payload: Payload::Value(value),
      missing_values: Vec::new(),
    }
  }

  pub fn with_missing_values(mut self, rows: Vec<RowId>) -> Self {
    self.missing_values = rows;
    self
  }

  /// Fail unless the payload has the `expected` shape.
  pub fn expect_shape(&self, expected: OutputType) -> Result<(), TransformError> {
    let found = self.payload.output_type();
    if found != expected {
      return Err(TransformError::OutputShapeMismatch { expected, found });
    }
    Ok(())
  }
}

/// Outcome of a full-override transformer's first application.
#[derive(Debug, Clone, PartialEq)]
pub struct FullOverrideCreated {
  /// Complete state to store, including what the transformer created.
  pub state: TransformState,
  pub extra_dependencies: Vec<String>,
}

/// How a full-override transformer's stored description must change after an update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FullOverrideDelta {
  pub extra_dependencies: Option<Vec<String>>,
  /// Keys to shallow-merge into the stored state.
  pub state: Option<TransformState>,
  /// Outputs that no longer correspond to anything in the source. The caller
  /// deletes them once the delta has been recorded.
  pub retired_outputs: Vec<String>,
}

/// A stateless transformer: output is a function of the stored state.
#[async_trait]
pub trait DatasetCreator: Send + Sync {
  /// The shape every result of this transformer has.
  fn output_type(&self) -> OutputType;

  /// Check a configuration and return the source contexts it reads.
  ///
  /// Runs before any host call.
  fn validate(&self, state: &TransformState) -> Result<Vec<String>, TransformError>;

  /// Compute the output from the current source data.
  async fn apply(
    &self,
    host: &dyn HostBridge,
    state: &TransformState,
  ) -> Result<CreatorOutput, TransformError>;
}

/// A stateful transformer that creates and maintains its own outputs.
#[async_trait]
pub trait FullOverrideTransformer: Send + Sync {
  /// Check a configuration and return the source contexts it reads.
  fn validate(&self, state: &TransformState) -> Result<Vec<String>, TransformError>;

  /// First application: create the outputs.
  async fn create(
    &self,
    host: &dyn HostBridge,
    state: &TransformState,
  ) -> Result<FullOverrideCreated, TransformError>;

  /// Bring existing outputs in line with the current source data.
  async fn update(
    &self,
    host: &dyn HostBridge,
    state: &TransformState,
  ) -> Result<FullOverrideDelta, TransformError>;
}

/// A catalog entry.
#[derive(Clone)]
pub enum Transformer {
  Creator(Arc<dyn DatasetCreator>),
  FullOverride(Arc<dyn FullOverrideTransformer>),
}

impl Transformer {
  pub fn validate(&self, state: &TransformState) -> Result<Vec<String>, TransformError> {
    match self {
      Transformer::Creator(creator) => creator.validate(state),
      Transformer::FullOverride(transformer) => transformer.validate(state),
    }
  }
}

impl fmt::Debug for Transformer {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Transformer::Creator(creator) => f
        .debug_struct("Creator")
        .field("output_type", &creator.output_type())
        .finish(),
      Transformer::FullOverride(_) => f.debug_struct("FullOverride").finish(),
    }
  }
}

/// Read a required, non-empty string from a configuration.
pub fn required_str<'a>(
  state: &'a TransformState,
  key: &str,
  transformer: &str,
) -> Result<&'a str, TransformError> {
  match state.get(key).and_then(Value::as_str) {
    Some(value) if !value.trim().is_empty() => Ok(value),
    _ => Err(TransformError::InvalidState {
      transformer: transformer.to_string(),
      message: format!("'{}' must be chosen", key),
    }),
  }
}

/// Render a value for a text artifact.
pub fn display_text(value: &Value) -> String {
  match value {
    Value::Null => String::new(),
    Value::String(s) => s.clone(),
    Value::Number(n) => match n.as_f64() {
      Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
      Some(f) => format!("{}", f),
      None => n.to_string(),
    },
    Value::Array(items) => items
      .iter()
      .map(display_text)
      .collect::<Vec<_>>()
      .join(", "),
    other => other.to_string(),
  }
}
