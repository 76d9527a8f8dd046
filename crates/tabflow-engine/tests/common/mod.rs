//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tabflow_catalog::{
  Catalog, CreatorOutput, DatasetCreator, Duplicate, Mean, OutputType, TransformError,
  TransformState,
};
use tabflow_dataset::{ContextSchema, DataSet, Row};
use tabflow_engine::{EngineConfig, NotificationRunner, SequentialIds, TransformEngine};
use tabflow_host::{HostBridge, MemoryHost};

pub fn state(value: Value) -> TransformState {
  value.as_object().cloned().expect("state must be an object")
}

pub fn values(value: Value) -> Map<String, Value> {
  state(value)
}

/// Sales: rows 1..=3 with Region and Revenue.
pub fn sales() -> DataSet {
  DataSet::new(
    ContextSchema::flat("Sales", &["Region", "Revenue"]),
    vec![
      Row::new(1, values(json!({ "Region": "West", "Revenue": 10 }))),
      Row::new(2, values(json!({ "Region": "East", "Revenue": 20 }))),
      Row::new(3, values(json!({ "Region": "West", "Revenue": 30 }))),
    ],
  )
}

pub struct Harness {
  pub host: Arc<MemoryHost>,
  pub engine: Arc<TransformEngine>,
  pub runner: NotificationRunner,
}

impl Harness {
  pub fn new(catalog: Catalog, config: EngineConfig) -> Self {
    let host = Arc::new(MemoryHost::new());
    host.seed_context(sales());
    let engine = Arc::new(
      TransformEngine::builder(host.clone())
        .catalog(catalog)
        .config(config)
        .ids(Arc::new(SequentialIds::new()))
        .build(),
    );
    let runner = NotificationRunner::new(engine.clone());
    host.connect(runner.sender());
    Self {
      host,
      engine,
      runner,
    }
  }

  pub fn builtins() -> Self {
    Self::new(Catalog::with_builtins(), EngineConfig::default())
  }

  pub async fn settle(&mut self) -> usize {
    self.runner.settle().await
  }
}

/// A creator that records every state it is applied with.
pub struct Recording<C> {
  pub inner: C,
  pub calls: Arc<Mutex<Vec<TransformState>>>,
}

impl<C> Recording<C> {
  pub fn new(inner: C) -> (Self, Arc<Mutex<Vec<TransformState>>>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    (
      Self {
        inner,
        calls: calls.clone(),
      },
      calls,
    )
  }
}

#[async_trait]
impl<C: DatasetCreator> DatasetCreator for Recording<C> {
  fn output_type(&self) -> OutputType {
    self.inner.output_type()
  }

  fn validate(&self, state: &TransformState) -> Result<Vec<String>, TransformError> {
    self.inner.validate(state)
  }

  async fn apply(
    &self,
    host: &dyn HostBridge,
    state: &TransformState,
  ) -> Result<CreatorOutput, TransformError> {
    self.calls.lock().expect("calls lock").push(state.clone());
    self.inner.apply(host, state).await
  }
}

/// Copies its input until told to fail.
pub struct Flaky {
  pub failing: Arc<AtomicBool>,
}

#[async_trait]
impl DatasetCreator for Flaky {
  fn output_type(&self) -> OutputType {
    OutputType::Context
  }

  fn validate(&self, state: &TransformState) -> Result<Vec<String>, TransformError> {
    Duplicate.validate(state)
  }

  async fn apply(
    &self,
    host: &dyn HostBridge,
    state: &TransformState,
  ) -> Result<CreatorOutput, TransformError> {
    if self.failing.load(Ordering::SeqCst) {
      return Err(TransformError::Compute {
        transformer: "Flaky".to_string(),
        message: "formula could not be evaluated".to_string(),
      });
    }
    let mut output = Duplicate.apply(host, state).await?;
    if let tabflow_catalog::Payload::DataSet(dataset) = &mut output.payload {
      dataset.schema.name = "Flaky output".to_string();
      dataset.schema.title = "Flaky output".to_string();
    }
    Ok(output)
  }
}

/// Declares a text result; returns a dataset once switched.
pub struct Shifty {
  pub switched: Arc<AtomicBool>,
}

#[async_trait]
impl DatasetCreator for Shifty {
  fn output_type(&self) -> OutputType {
    OutputType::Text
  }

  fn validate(&self, state: &TransformState) -> Result<Vec<String>, TransformError> {
    Mean.validate(state)
  }

  async fn apply(
    &self,
    host: &dyn HostBridge,
    state: &TransformState,
  ) -> Result<CreatorOutput, TransformError> {
    if self.switched.load(Ordering::SeqCst) {
      return Duplicate.apply(host, state).await;
    }
    Mean.apply(host, state).await
  }
}

/// Copies its input slowly, noting whether two applications ever overlapped.
pub struct Slow {
  pub running: Arc<AtomicUsize>,
  pub overlapped: Arc<AtomicBool>,
}

impl Slow {
  pub fn new() -> (Self, Arc<AtomicBool>) {
    let overlapped = Arc::new(AtomicBool::new(false));
    (
      Self {
        running: Arc::new(AtomicUsize::new(0)),
        overlapped: overlapped.clone(),
      },
      overlapped,
    )
  }
}

#[async_trait]
impl DatasetCreator for Slow {
  fn output_type(&self) -> OutputType {
    OutputType::Context
  }

  fn validate(&self, state: &TransformState) -> Result<Vec<String>, TransformError> {
    Duplicate.validate(state)
  }

  async fn apply(
    &self,
    host: &dyn HostBridge,
    state: &TransformState,
  ) -> Result<CreatorOutput, TransformError> {
    if self.running.fetch_add(1, Ordering::SeqCst) > 0 {
      self.overlapped.store(true, Ordering::SeqCst);
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    let output = Duplicate.apply(host, state).await;
    self.running.fetch_sub(1, Ordering::SeqCst);
    output
  }
}
