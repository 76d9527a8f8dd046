use std::collections::BTreeMap;
use std::sync::Arc;

use crate::builtin::{Count, Duplicate, Mean};
use crate::error::TransformError;
use crate::partition::{PARTITION, Partition};
use crate::transformer::{DatasetCreator, FullOverrideTransformer, Transformer};

/// Name-keyed transformer lookup.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
  transformers: BTreeMap<String, Transformer>,
}

impl Catalog {
  /// An empty catalog.
  pub fn new() -> Self {
    Self::default()
  }

  /// A catalog holding the built-in transformers.
  pub fn with_builtins() -> Self {
    let mut catalog = Self::new();
    catalog.register_creator("Copy", Duplicate);
    catalog.register_creator("Count", Count);
    catalog.register_creator("Mean", Mean);
    catalog.register_full_override(PARTITION, Partition);
    catalog
  }

  pub fn register_creator(&mut self, name: impl Into<String>, creator: impl DatasetCreator + 'static) {
    self
      .transformers
      .insert(name.into(), Transformer::Creator(Arc::new(creator)));
  }

  pub fn register_full_override(
    &mut self,
    name: impl Into<String>,
    transformer: impl FullOverrideTransformer + 'static,
  ) {
    self
      .transformers
      .insert(name.into(), Transformer::FullOverride(Arc::new(transformer)));
  }

  pub fn get(&self, name: &str) -> Result<&Transformer, TransformError> {
    self
      .transformers
      .get(name)
      .ok_or_else(|| TransformError::UnknownTransformer(name.to_string()))
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.transformers.keys().map(String::as_str)
  }
}
