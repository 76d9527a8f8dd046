//! Stateless built-in transformers.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tabflow_dataset::{ContextSchema, DataSet, Row, as_number};
use tabflow_host::HostBridge;
use tracing::debug;

use crate::error::TransformError;
use crate::transformer::{
  CreatorOutput, DatasetCreator, OutputType, TransformState, required_str,
};

pub(crate) async fn read_with_attribute(
  host: &dyn HostBridge,
  input: &str,
  attribute: &str,
) -> Result<DataSet, TransformError> {
  let dataset = host.get_context_and_dataset(input).await?;
  if !dataset.schema.has_attribute(attribute) {
    return Err(TransformError::MissingAttribute {
      context: input.to_string(),
      attribute: attribute.to_string(),
    });
  }
  Ok(dataset)
}

/// Duplicates a context.
#[derive(Debug, Clone, Default)]
pub struct Duplicate;

#[async_trait]
impl DatasetCreator for Duplicate {
  fn output_type(&self) -> OutputType {
    OutputType::Context
  }

  fn validate(&self, state: &TransformState) -> Result<Vec<String>, TransformError> {
    Ok(vec![required_str(state, "input", "Copy")?.to_string()])
  }

  async fn apply(
    &self,
    host: &dyn HostBridge,
    state: &TransformState,
  ) -> Result<CreatorOutput, TransformError> {
    let input = required_str(state, "input", "Copy")?;
    let mut dataset = host.get_context_and_dataset(input).await?;
    dataset.schema.title = format!("Copy of {}", dataset.schema.title);
    dataset.schema.name = format!("Copy of {}", input);
    Ok(CreatorOutput::dataset(dataset))
  }
}

/// Counts rows per distinct value of an attribute.
#[derive(Debug, Clone, Default)]
pub struct Count;

#[async_trait]
impl DatasetCreator for Count {
  fn output_type(&self) -> OutputType {
    OutputType::Context
  }

  fn validate(&self, state: &TransformState) -> Result<Vec<String>, TransformError> {
    required_str(state, "attribute", "Count")?;
    Ok(vec![required_str(state, "input", "Count")?.to_string()])
  }

  async fn apply(
    &self,
    host: &dyn HostBridge,
    state: &TransformState,
  ) -> Result<CreatorOutput, TransformError> {
    let input = required_str(state, "input", "Count")?;
    let attribute = required_str(state, "attribute", "Count")?;
    let dataset = read_with_attribute(host, input, attribute).await?;

    let rows = dataset
      .distinct_values(attribute)
      .into_iter()
      .enumerate()
      .map(|(index, value)| {
        let count = dataset.column(attribute).filter(|v| **v == value).count();
        let mut values = Map::new();
        values.insert(attribute.to_string(), value);
        values.insert("count".to_string(), json!(count));
        Row::new(index as u64 + 1, values)
      })
      .collect();

    let name = format!("Count of {} in {}", attribute, input);
    Ok(CreatorOutput::dataset(DataSet::new(
      ContextSchema::flat(name, &[attribute, "count"]),
      rows,
    )))
  }
}

/// Arithmetic mean of an attribute, rendered as text.
///
/// Rows whose value is not numeric are reported as missing.
#[derive(Debug, Clone, Default)]
pub struct Mean;

#[async_trait]
impl DatasetCreator for Mean {
  fn output_type(&self) -> OutputType {
    OutputType::Text
  }

  fn validate(&self, state: &TransformState) -> Result<Vec<String>, TransformError> {
    required_str(state, "attribute", "Mean")?;
    Ok(vec![required_str(state, "input", "Mean")?.to_string()])
  }

  async fn apply(
    &self,
    host: &dyn HostBridge,
    state: &TransformState,
  ) -> Result<CreatorOutput, TransformError> {
    let input = required_str(state, "input", "Mean")?;
    let attribute = required_str(state, "attribute", "Mean")?;
    let dataset = read_with_attribute(host, input, attribute).await?;

    let mut sum = 0.0;
    let mut count = 0usize;
    let mut missing = Vec::new();
    for row in &dataset.rows {
      match as_number(row.get(attribute)) {
        Some(n) => {
          sum += n;
          count += 1;
        }
        None => missing.push(row.id),
      }
    }

    if count == 0 {
      return Err(TransformError::Compute {
        transformer: "Mean".to_string(),
        message: format!("'{}' has no numeric values", attribute),
      });
    }

    let mean = sum / count as f64;
    debug!(input, attribute, mean, missing = missing.len(), "computed mean");
    let value = serde_json::Number::from_f64(mean)
      .map(Value::Number)
      .unwrap_or(Value::Null);
    Ok(CreatorOutput::value(value).with_missing_values(missing))
  }
}
