//! The partitioning transformer.
//!
//! Splits a context into one output context per distinct value of an
//! attribute. The stored state maps each value seen so far to the context
//! created for it:
//!
//! ```json
//! { "input": "Sales", "attribute": "Region",
//!   "outputs": { "West": "Sales (West)", "East": "Sales (East)" } }
//! ```
//!
//! On update, existing outputs are rewritten in place, values that appeared
//! since the last run get a new context, and outputs for values that
//! disappeared are retired.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tabflow_dataset::DataSet;
use tabflow_host::HostBridge;
use tracing::{debug, info};

use crate::builtin::read_with_attribute;
use crate::error::TransformError;
use crate::transformer::{
  FullOverrideCreated, FullOverrideDelta, FullOverrideTransformer, TransformState, display_text,
  required_str,
};

/// Catalog name of the partitioning transformer.
pub const PARTITION: &str = "Partition";

#[derive(Debug, Clone, Default)]
pub struct Partition;

fn outputs_of(state: &TransformState) -> BTreeMap<String, String> {
  state
    .get("outputs")
    .and_then(Value::as_object)
    .map(|outputs| {
      outputs
        .iter()
        .filter_map(|(key, id)| id.as_str().map(|id| (key.clone(), id.to_string())))
        .collect()
    })
    .unwrap_or_default()
}

fn outputs_value(outputs: &BTreeMap<String, String>) -> Value {
  Value::Object(
    outputs
      .iter()
      .map(|(key, id)| (key.clone(), Value::String(id.clone())))
      .collect(),
  )
}

/// Rows of `source` grouped by the display key of `attribute`, in order of first appearance.
fn split(source: &DataSet, attribute: &str) -> Vec<(String, DataSet)> {
  let mut groups: Vec<(String, DataSet)> = Vec::new();
  for row in &source.rows {
    let key = display_text(row.get(attribute));
    let index = match groups.iter().position(|(k, _)| *k == key) {
      Some(index) => index,
      None => {
        let mut schema = source.schema.clone();
        schema.name = format!("{} ({})", source.schema.name, key);
        schema.title = format!("{} ({})", source.schema.title, key);
        groups.push((key, DataSet::new(schema, Vec::new())));
        groups.len() - 1
      }
    };
    groups[index].1.rows.push(row.clone());
  }
  groups
}

#[async_trait]
impl FullOverrideTransformer for Partition {
  fn validate(&self, state: &TransformState) -> Result<Vec<String>, TransformError> {
    required_str(state, "attribute", PARTITION)?;
    Ok(vec![required_str(state, "input", PARTITION)?.to_string()])
  }

  async fn create(
    &self,
    host: &dyn HostBridge,
    state: &TransformState,
  ) -> Result<FullOverrideCreated, TransformError> {
    let input = required_str(state, "input", PARTITION)?;
    let attribute = required_str(state, "attribute", PARTITION)?;
    let source = read_with_attribute(host, input, attribute).await?;

    let mut outputs = BTreeMap::new();
    for (key, dataset) in split(&source, attribute) {
      let id = host.create_context_with_dataset(dataset).await?;
      debug!(input, key = %key, output = %id, "created partition");
      outputs.insert(key, id);
    }

    let mut stored = state.clone();
    stored.insert("outputs".to_string(), outputs_value(&outputs));
    Ok(FullOverrideCreated {
      extra_dependencies: outputs.values().cloned().collect(),
      state: stored,
    })
  }

  async fn update(
    &self,
    host: &dyn HostBridge,
    state: &TransformState,
  ) -> Result<FullOverrideDelta, TransformError> {
    let input = required_str(state, "input", PARTITION)?;
    let attribute = required_str(state, "attribute", PARTITION)?;
    let source = read_with_attribute(host, input, attribute).await?;

    let mut previous = outputs_of(state);
    let mut outputs = BTreeMap::new();
    for (key, dataset) in split(&source, attribute) {
      let id = match previous.remove(&key) {
        Some(id) => {
          host.update_context_with_dataset(&id, dataset).await?;
          id
        }
        None => {
          let id = host.create_context_with_dataset(dataset).await?;
          info!(input, key = %key, output = %id, "new partition value");
          id
        }
      };
      outputs.insert(key, id);
    }

    let retired_outputs: Vec<String> = previous.into_values().collect();
    if !retired_outputs.is_empty() {
      info!(input, retired = ?retired_outputs, "partition values disappeared");
    }

    let mut delta_state = Map::new();
    delta_state.insert("outputs".to_string(), outputs_value(&outputs));
    Ok(FullOverrideDelta {
      extra_dependencies: Some(outputs.values().cloned().collect()),
      state: Some(delta_state),
      retired_outputs,
    })
  }
}
