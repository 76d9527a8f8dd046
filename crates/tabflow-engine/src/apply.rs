//! First application of a transformer: validate, compute, create the
//! outputs and start tracking.

use std::sync::Arc;

use serde::Deserialize;
use tabflow_catalog::{Catalog, OutputType, Payload, TransformState, Transformer, display_text};
use tabflow_host::HostBridge;
use tabflow_registry::{RegistryAction, RegistryStore, TransformationDescription};
use tracing::{info, instrument};

use crate::error::EngineError;
use crate::ids::IdGenerator;
use crate::propagator::missing_value_text;

/// A request to apply a transformer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyRequest {
  pub transformer: String,
  #[serde(default)]
  pub state: TransformState,
  /// The kind of output the caller expects. Checked against the transformer.
  #[serde(default)]
  pub output_type: Option<OutputType>,
}

impl ApplyRequest {
  pub fn new(transformer: impl Into<String>, state: TransformState) -> Self {
    Self {
      transformer: transformer.into(),
      state,
      output_type: None,
    }
  }

  pub fn expecting(mut self, output_type: OutputType) -> Self {
    self.output_type = Some(output_type);
    self
  }
}

/// Creates outputs for new transformations and registers them.
pub struct Applier {
  host: Arc<dyn HostBridge>,
  catalog: Arc<Catalog>,
  store: Arc<RegistryStore>,
  ids: Arc<dyn IdGenerator>,
}

impl Applier {
  pub(crate) fn new(
    host: Arc<dyn HostBridge>,
    catalog: Arc<Catalog>,
    store: Arc<RegistryStore>,
    ids: Arc<dyn IdGenerator>,
  ) -> Self {
    Self {
      host,
      catalog,
      store,
      ids,
    }
  }

  /// Check a request without touching the host. Returns the source ids it reads.
  pub fn validate(&self, request: &ApplyRequest) -> Result<Vec<String>, EngineError> {
    let transformer = self
      .catalog
      .get(&request.transformer)
      .map_err(|e| EngineError::validation(e.to_string()))?;

    let declared = transformer
      .validate(&request.state)
      .map_err(|e| EngineError::validation(e.to_string()))?;
    let mut inputs: Vec<String> = Vec::with_capacity(declared.len());
    for input in declared {
      if !inputs.contains(&input) {
        inputs.push(input);
      }
    }
    if inputs.is_empty() {
      return Err(EngineError::validation(format!(
        "'{}' reads no source data",
        request.transformer
      )));
    }

    match (transformer, request.output_type) {
      (Transformer::Creator(creator), Some(expected)) if creator.output_type() != expected => {
        Err(EngineError::validation(format!(
          "'{}' produces a {} but a {} was requested",
          request.transformer,
          creator.output_type(),
          expected
        )))
      }
      (Transformer::FullOverride(_), Some(_)) => Err(EngineError::validation(format!(
        "'{}' creates its own outputs and takes no output type",
        request.transformer
      ))),
      _ => Ok(inputs),
    }
  }

  /// Apply a transformer and track the result. Errors are returned to the
  /// caller; nothing is tracked unless every step succeeded.
  #[instrument(skip(self, request), fields(transformer = %request.transformer))]
  pub async fn apply(&self, request: ApplyRequest) -> Result<TransformationDescription, EngineError> {
    let inputs = self.validate(&request)?;
    let transformer = self.catalog.get(&request.transformer)?.clone();
    let id = self.ids.next_id("transformation");
    let error_id = self.ids.next_id("error");

    let description = match transformer {
      Transformer::Creator(creator) => {
        let result = creator.apply(self.host.as_ref(), &request.state).await?;
        let output_type = creator.output_type();
        result.expect_shape(output_type)?;

        let (output, output_title) = match result.payload {
          Payload::DataSet(dataset) => {
            let title = dataset.schema.title.clone();
            (self.host.create_context_with_dataset(dataset).await?, title)
          }
          Payload::Value(value) => {
            let title = format!("{} of {}", request.transformer, inputs.join(", "));
            (self.host.create_text(&title, &display_text(&value)).await?, title)
          }
        };

        let mut description = TransformationDescription::dataset_creator(
          id,
          error_id,
          request.transformer.clone(),
          inputs,
          request.state,
          output_type,
          output,
        );
        if !result.missing_values.is_empty() {
          let report = self
            .host
            .create_text(
              &format!("Missing values in {}", output_title),
              &missing_value_text(&result.missing_values),
            )
            .await?;
          description = description.with_missing_value_report(report);
        }
        description
      }
      Transformer::FullOverride(transformer) => {
        let created = transformer.create(self.host.as_ref(), &request.state).await?;
        TransformationDescription::full_override(
          id,
          error_id,
          request.transformer.clone(),
          inputs,
          created.state,
        )
        .with_extra_dependencies(created.extra_dependencies)
      }
    };

    info!(
      description_id = %description.id,
      inputs = ?description.inputs,
      outputs = ?description.outputs(),
      "tracking new transformation"
    );
    self.store.dispatch(RegistryAction::Add(description.clone()))?;
    Ok(description)
  }
}
