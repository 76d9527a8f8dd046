//! Stops tracking descriptions whose sources or by-products were deleted.

use std::sync::Arc;

use tabflow_catalog::OutputType;
use tabflow_host::{HostBridge, HostError};
use tabflow_registry::{DescriptionKind, RegistryStore, TransformationDescription};
use tracing::{info, instrument, warn};

use crate::config::{DeletionPolicy, EngineConfig};
use crate::error_board::ErrorBoard;
use crate::events::{PropagationEvent, PropagationNotifier};
use crate::locks::KeyedLocks;

/// Reacts to "artifact deleted".
///
/// With [`DeletionPolicy::Freeze`] every remaining output of an affected
/// description is retitled with the configured suffix and, for datasets,
/// given a note explaining why it no longer updates. Both policies then drop
/// the description from every bucket in one registry swap.
pub struct DeletionReconciler {
  host: Arc<dyn HostBridge>,
  store: Arc<RegistryStore>,
  errors: Arc<ErrorBoard>,
  notifier: Arc<dyn PropagationNotifier>,
  output_locks: Arc<KeyedLocks>,
  config: EngineConfig,
}

impl DeletionReconciler {
  pub(crate) fn new(
    host: Arc<dyn HostBridge>,
    store: Arc<RegistryStore>,
    errors: Arc<ErrorBoard>,
    notifier: Arc<dyn PropagationNotifier>,
    output_locks: Arc<KeyedLocks>,
    config: EngineConfig,
  ) -> Self {
    Self {
      host,
      store,
      errors,
      notifier,
      output_locks,
      config,
    }
  }

  /// Reconcile the deletion of `artifact`. Returns the descriptions no longer tracked.
  #[instrument(skip(self))]
  pub async fn artifact_deleted(&self, artifact: &str) -> Vec<TransformationDescription> {
    let (_, affected) = self.store.registry().without_dependents(artifact);
    if affected.is_empty() {
      return affected;
    }

    if self.config.deletion_policy == DeletionPolicy::Freeze {
      for description in &affected {
        let frozen = self.freeze(artifact, description).await;
        self.notifier.notify(PropagationEvent::DescriptionFrozen {
          artifact: artifact.to_string(),
          description_id: description.id.clone(),
          outputs: frozen,
        });
      }
    }

    let removed = self.store.remove_dependents(artifact);
    for description in &removed {
      info!(description_id = %description.id, transformer = %description.transformer_name, "stopped tracking");
      self.errors.clear(&description.error_id);
      self.notifier.notify(PropagationEvent::DescriptionRemoved {
        artifact: artifact.to_string(),
        description_id: description.id.clone(),
      });
    }
    removed
  }

  /// Retitle the surviving outputs of `description`. Returns those retitled.
  async fn freeze(&self, deleted: &str, description: &TransformationDescription) -> Vec<String> {
    let output_type = match &description.kind {
      DescriptionKind::DatasetCreator { output_type, .. } => *output_type,
      DescriptionKind::FullOverride => OutputType::Context,
    };
    let outputs: Vec<&str> = description
      .outputs()
      .into_iter()
      .filter(|o| *o != deleted)
      .collect();
    let _output_guards = self.output_locks.lock_all(outputs.iter().copied()).await;

    let mut frozen = Vec::new();
    for output in outputs {
      match self.freeze_output(output, output_type, deleted).await {
        Ok(true) => frozen.push(output.to_string()),
        Ok(false) => {}
        Err(e) => warn!(output, error = %e, "could not freeze output"),
      }
    }
    frozen
  }

  async fn freeze_output(
    &self,
    output: &str,
    output_type: OutputType,
    deleted: &str,
  ) -> Result<bool, HostError> {
    let suffix = &self.config.fixed_suffix;
    match output_type {
      OutputType::Context => {
        let title = self.host.get_context_title(output).await?;
        if title.ends_with(suffix.as_str()) {
          return Ok(false);
        }
        self
          .host
          .set_context_title(output, &format!("{}{}", title, suffix))
          .await?;
        let note = format!(
          "This dataset is no longer updated because '{}' was deleted.",
          deleted
        );
        self.host.set_context_description(output, &note).await?;
      }
      OutputType::Text => {
        let title = self.host.get_component_title(output).await?;
        if title.ends_with(suffix.as_str()) {
          return Ok(false);
        }
        self
          .host
          .set_component_title(output, &format!("{}{}", title, suffix))
          .await?;
      }
    }
    info!(output, "froze output");
    Ok(true)
  }
}
