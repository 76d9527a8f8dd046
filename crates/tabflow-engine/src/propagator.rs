//! Reruns the transformations that read a changed artifact.

use std::sync::Arc;

use tabflow_catalog::{Catalog, OutputType, Payload, TransformError, Transformer, display_text};
use tabflow_dataset::RowId;
use tabflow_host::HostBridge;
use tabflow_registry::{
  DescriptionDelta, DescriptionKind, RegistryAction, RegistryStore, TransformationDescription,
};
use tracing::{debug, info, instrument, warn};

use crate::config::{EditedOutputPolicy, EngineConfig};
use crate::error::EngineError;
use crate::error_board::ErrorBoard;
use crate::events::{PropagationEvent, PropagationNotifier};
use crate::locks::KeyedLocks;

/// Text written into a missing-value report.
pub(crate) fn missing_value_text(rows: &[RowId]) -> String {
  if rows.is_empty() {
    return "No missing values.".to_string();
  }
  let ids: Vec<String> = rows.iter().map(|r| r.to_string()).collect();
  format!(
    "{} row(s) produced no value: {}",
    rows.len(),
    ids.join(", ")
  )
}

/// Which descriptions of one bucket were updated, failed or skipped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropagationReport {
  pub source: String,
  pub updated: Vec<String>,
  pub failed: Vec<String>,
  pub skipped: Vec<String>,
}

enum Outcome {
  Updated(Vec<String>),
  Skipped(String),
}

/// Reacts to "artifact changed" by rerunning every description in its bucket.
///
/// A bucket is processed one description at a time while holding a lock on
/// the source id. Each write additionally holds a lock on the output ids it
/// touches, so descriptions in different buckets sharing an output never
/// interleave.
pub struct UpdatePropagator {
  host: Arc<dyn HostBridge>,
  catalog: Arc<Catalog>,
  store: Arc<RegistryStore>,
  errors: Arc<ErrorBoard>,
  notifier: Arc<dyn PropagationNotifier>,
  bucket_locks: KeyedLocks,
  output_locks: Arc<KeyedLocks>,
  config: EngineConfig,
}

impl UpdatePropagator {
  pub(crate) fn new(
    host: Arc<dyn HostBridge>,
    catalog: Arc<Catalog>,
    store: Arc<RegistryStore>,
    errors: Arc<ErrorBoard>,
    notifier: Arc<dyn PropagationNotifier>,
    output_locks: Arc<KeyedLocks>,
    config: EngineConfig,
  ) -> Self {
    Self {
      host,
      catalog,
      store,
      errors,
      notifier,
      bucket_locks: KeyedLocks::new(),
      output_locks,
      config,
    }
  }

  /// Rerun the bucket of `source`. Failures are recorded per description and
  /// never stop the rest of the bucket.
  #[instrument(skip(self))]
  pub async fn artifact_changed(&self, source: &str) -> PropagationReport {
    let mut report = PropagationReport {
      source: source.to_string(),
      ..Default::default()
    };

    let _bucket_guard = self.bucket_locks.lock(source).await;
    let bucket = self.store.bucket(source);
    if bucket.is_empty() {
      return report;
    }

    info!(descriptions = bucket.len(), "propagating change");
    self.notifier.notify(PropagationEvent::BucketStarted {
      source: source.to_string(),
      descriptions: bucket.len(),
    });

    for queued in bucket {
      // Earlier descriptions may have edited or removed this one
      let Some(description) = self.store.find(&queued.id) else {
        continue;
      };

      self.errors.clear(&description.error_id);
      match self.rerun(&description).await {
        Ok(Outcome::Updated(outputs)) => {
          debug!(description_id = %description.id, ?outputs, "description updated");
          self.notifier.notify(PropagationEvent::DescriptionUpdated {
            source: source.to_string(),
            description_id: description.id.clone(),
            outputs,
          });
          report.updated.push(description.id);
        }
        Ok(Outcome::Skipped(reason)) => {
          info!(description_id = %description.id, reason = %reason, "description skipped");
          self.errors.set(&description.error_id, reason.clone());
          self.notifier.notify(PropagationEvent::DescriptionSkipped {
            source: source.to_string(),
            description_id: description.id.clone(),
            reason,
          });
          report.skipped.push(description.id);
        }
        Err(e) => {
          let message = format!("{}: {}", self.output_title(&description).await, e);
          warn!(
            description_id = %description.id,
            transformer = %description.transformer_name,
            error = %e,
            "description failed"
          );
          self.errors.set(&description.error_id, message.clone());
          self.notifier.notify(PropagationEvent::DescriptionFailed {
            source: source.to_string(),
            description_id: description.id.clone(),
            error_id: description.error_id.clone(),
            error: message,
          });
          report.failed.push(description.id);
        }
      }
    }

    info!(
      updated = report.updated.len(),
      failed = report.failed.len(),
      skipped = report.skipped.len(),
      "change propagated"
    );
    self.notifier.notify(PropagationEvent::BucketFinished {
      source: source.to_string(),
      updated: report.updated.len(),
      failed: report.failed.len(),
      skipped: report.skipped.len(),
    });
    report
  }

  async fn rerun(&self, description: &TransformationDescription) -> Result<Outcome, EngineError> {
    let outputs: Vec<String> = description.outputs().into_iter().map(str::to_string).collect();
    let edited: Vec<&String> = outputs.iter().filter(|o| self.store.is_edited(o)).collect();
    if !edited.is_empty() {
      match self.config.edited_output_policy {
        EditedOutputPolicy::Skip => {
          return Ok(Outcome::Skipped(format!(
            "'{}' was edited by hand and is no longer updated automatically",
            edited[0]
          )));
        }
        EditedOutputPolicy::Overwrite => {
          for output in &edited {
            warn!(output = %output, description_id = %description.id, "overwriting hand-edited output");
          }
        }
      }
    }

    let mut keys = outputs.clone();
    keys.extend(description.extra_dependencies.iter().cloned());
    let _output_guards = self.output_locks.lock_all(keys.iter().map(String::as_str)).await;

    let updated = match &description.kind {
      DescriptionKind::DatasetCreator {
        output_type,
        output,
        missing_value_report,
      } => {
        self
          .rerun_creator(description, *output_type, output, missing_value_report.as_deref())
          .await?;
        outputs.clone()
      }
      DescriptionKind::FullOverride => self.rerun_full_override(description).await?,
    };

    // Only a successful rerun replaces the hand edit
    for output in edited {
      self.store.clear_edited(output);
    }
    Ok(Outcome::Updated(updated))
  }

  async fn rerun_creator(
    &self,
    description: &TransformationDescription,
    output_type: OutputType,
    output: &str,
    missing_value_report: Option<&str>,
  ) -> Result<(), EngineError> {
    let Transformer::Creator(creator) = self.catalog.get(&description.transformer_name)? else {
      return Err(mismatched_kind(description).into());
    };

    let result = creator.apply(self.host.as_ref(), &description.state).await?;
    result.expect_shape(output_type)?;

    match result.payload {
      Payload::DataSet(dataset) => self.host.update_context_with_dataset(output, dataset).await?,
      Payload::Value(value) => self.host.update_text(output, &display_text(&value)).await?,
    }

    if let Some(report) = missing_value_report {
      self
        .host
        .update_text(report, &missing_value_text(&result.missing_values))
        .await?;
    }
    Ok(())
  }

  async fn rerun_full_override(
    &self,
    description: &TransformationDescription,
  ) -> Result<Vec<String>, EngineError> {
    let Transformer::FullOverride(transformer) = self.catalog.get(&description.transformer_name)? else {
      return Err(mismatched_kind(description).into());
    };

    let delta = transformer.update(self.host.as_ref(), &description.state).await?;
    let edited = self
      .store
      .dispatch(RegistryAction::Edit {
        id: description.id.clone(),
        delta: DescriptionDelta {
          extra_dependencies: delta.extra_dependencies,
          state: delta.state,
        },
      })?
      .unwrap_or_else(|| description.clone());

    // Only after the edit, so the deletions find no dependents
    for retired in &delta.retired_outputs {
      info!(output = %retired, description_id = %description.id, "deleting retired output");
      if let Err(e) = self.host.delete_context(retired).await {
        warn!(output = %retired, error = %e, "could not delete retired output");
      }
    }

    Ok(edited.outputs().into_iter().map(str::to_string).collect())
  }

  /// Human-readable name of what a description writes, falling back to its id.
  async fn output_title(&self, description: &TransformationDescription) -> String {
    let (id, lookup) = match &description.kind {
      DescriptionKind::DatasetCreator {
        output_type: OutputType::Context,
        output,
        ..
      } => (output.as_str(), self.host.get_context_title(output).await),
      DescriptionKind::DatasetCreator { output, .. } => {
        (output.as_str(), self.host.get_component_title(output).await)
      }
      DescriptionKind::FullOverride => {
        let input = description.inputs.first().map(String::as_str).unwrap_or_default();
        (input, self.host.get_context_title(input).await)
      }
    };
    lookup.unwrap_or_else(|_| id.to_string())
  }
}

fn mismatched_kind(description: &TransformationDescription) -> TransformError {
  let expected = if description.is_full_override() {
    "a full-override transformer"
  } else {
    "a dataset creator"
  };
  TransformError::InvalidState {
    transformer: description.transformer_name.clone(),
    message: format!("catalog entry is not {}", expected),
  }
}
