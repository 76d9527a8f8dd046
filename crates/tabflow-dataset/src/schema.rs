use serde::{Deserialize, Serialize};

/// A single attribute (column) of a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  /// Formula text, if the host computes this attribute.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub formula: Option<String>,
  #[serde(default)]
  pub hidden: bool,
}

impl Attribute {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      title: None,
      formula: None,
      hidden: false,
    }
  }
}

/// A grouping level of a data context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Collection {
  pub name: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  /// Name of the parent collection, `None` for the top level.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub parent: Option<String>,
  #[serde(default)]
  pub attributes: Vec<Attribute>,
}

impl Collection {
  pub fn new(name: impl Into<String>, attributes: Vec<Attribute>) -> Self {
    Self {
      name: name.into(),
      title: None,
      parent: None,
      attributes,
    }
  }
}

/// Structure of a data context: its identity, display metadata and collections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSchema {
  pub name: String,
  pub title: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub collections: Vec<Collection>,
}

impl ContextSchema {
  /// Schema with a single flat collection holding the given attributes.
  pub fn flat(name: impl Into<String>, attributes: &[&str]) -> Self {
    let name = name.into();
    Self {
      title: name.clone(),
      description: String::new(),
      collections: vec![Collection::new(
        name.clone(),
        attributes.iter().map(|a| Attribute::new(*a)).collect(),
      )],
      name,
    }
  }

  /// All attribute names, parent collections first.
  pub fn attribute_names(&self) -> Vec<&str> {
    self
      .collections
      .iter()
      .flat_map(|c| c.attributes.iter().map(|a| a.name.as_str()))
      .collect()
  }

  /// Find an attribute and the collection that owns it.
  pub fn find_attribute(&self, name: &str) -> Option<(&Collection, &Attribute)> {
    self
      .collections
      .iter()
      .find_map(|c| c.attributes.iter().find(|a| a.name == name).map(|a| (c, a)))
  }

  pub fn has_attribute(&self, name: &str) -> bool {
    self.find_attribute(name).is_some()
  }
}
