use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::ContextSchema;

/// Host-assigned identifier of a row (case).
pub type RowId = u64;

/// One row of a data context, keyed by attribute name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
  pub id: RowId,
  #[serde(default)]
  pub values: Map<String, Value>,
}

impl Row {
  pub fn new(id: RowId, values: Map<String, Value>) -> Self {
    Self { id, values }
  }

  /// Value of an attribute; missing attributes read as `Null`.
  pub fn get(&self, attribute: &str) -> &Value {
    self.values.get(attribute).unwrap_or(&Value::Null)
  }
}

/// A complete snapshot of a data context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSet {
  pub schema: ContextSchema,
  #[serde(default)]
  pub rows: Vec<Row>,
}

impl DataSet {
  pub fn new(schema: ContextSchema, rows: Vec<Row>) -> Self {
    Self { schema, rows }
  }

  pub fn row(&self, id: RowId) -> Option<&Row> {
    self.rows.iter().find(|r| r.id == id)
  }

  /// Values of one attribute in row order.
  pub fn column<'a>(&'a self, attribute: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
    self.rows.iter().map(move |r| r.get(attribute))
  }

  /// Distinct values of an attribute in order of first appearance.
  pub fn distinct_values(&self, attribute: &str) -> Vec<Value> {
    let mut seen: Vec<Value> = Vec::new();
    for value in self.column(attribute) {
      if !seen.contains(value) {
        seen.push(value.clone());
      }
    }
    seen
  }
}

/// Numeric reading of a cell: numbers, and strings that parse as numbers.
pub fn as_number(value: &Value) -> Option<f64> {
  match value {
    Value::Number(n) => n.as_f64(),
    Value::String(s) => s.trim().parse::<f64>().ok(),
    _ => None,
  }
}
