//! Shared registry with action dispatch and change observers.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::codec::{EditedOutputs, SavedState};
use crate::description::{DescriptionId, TransformationDescription};
use crate::error::{CodecError, RegistryError};
use crate::registry::{DescriptionDelta, Registry};

/// Mutations accepted by [`RegistryStore::dispatch`].
///
/// `Add` and `Delete` come from the user; `Edit` and `Set` are issued by
/// propagation, reconciliation and loading.
#[derive(Debug, Clone)]
pub enum RegistryAction {
  Add(TransformationDescription),
  Edit {
    id: DescriptionId,
    delta: DescriptionDelta,
  },
  Delete(DescriptionId),
  Set(Registry),
}

impl RegistryAction {
  fn name(&self) -> &'static str {
    match self {
      RegistryAction::Add(_) => "add",
      RegistryAction::Edit { .. } => "edit",
      RegistryAction::Delete(_) => "delete",
      RegistryAction::Set(_) => "set",
    }
  }
}

/// What observers see after every change: enough to draw a dependency diagram.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
  /// Source artifact to the ids of the descriptions that read it.
  pub buckets: BTreeMap<String, Vec<DescriptionId>>,
  pub transformations: Vec<TransformationDescription>,
  pub edited_outputs: Vec<String>,
}

/// Receives a snapshot after each registry change.
pub trait RegistryObserver: Send + Sync {
  fn notify(&self, snapshot: RegistrySnapshot);
}

/// Discards snapshots.
#[derive(Debug, Clone, Default)]
pub struct NoopObserver;

impl RegistryObserver for NoopObserver {
  fn notify(&self, _snapshot: RegistrySnapshot) {}
}

/// Forwards snapshots to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
  sender: mpsc::UnboundedSender<RegistrySnapshot>,
}

impl ChannelObserver {
  pub fn new(sender: mpsc::UnboundedSender<RegistrySnapshot>) -> Self {
    Self { sender }
  }
}

impl RegistryObserver for ChannelObserver {
  fn notify(&self, snapshot: RegistrySnapshot) {
    // Receiver may have been dropped
    let _ = self.sender.send(snapshot);
  }
}

#[derive(Default)]
struct Tracked {
  registry: Registry,
  edited: EditedOutputs,
}

impl Tracked {
  fn snapshot(&self) -> RegistrySnapshot {
    RegistrySnapshot {
      buckets: self
        .registry
        .buckets()
        .map(|(key, bucket)| (key.to_string(), bucket.iter().map(|d| d.id.clone()).collect()))
        .collect(),
      transformations: self.registry.serialize(),
      edited_outputs: self.edited.iter().cloned().collect(),
    }
  }
}

/// The registry and edited-output set behind one lock.
///
/// Reads hand out clones so no lock is held across host calls.
pub struct RegistryStore {
  tracked: RwLock<Tracked>,
  observer: Arc<dyn RegistryObserver>,
}

impl RegistryStore {
  pub fn new(observer: Arc<dyn RegistryObserver>) -> Self {
    Self {
      tracked: RwLock::new(Tracked::default()),
      observer,
    }
  }

  fn read(&self) -> RwLockReadGuard<'_, Tracked> {
    self.tracked.read().unwrap_or_else(|e| e.into_inner())
  }

  fn write(&self) -> RwLockWriteGuard<'_, Tracked> {
    self.tracked.write().unwrap_or_else(|e| e.into_inner())
  }

  /// Apply an action and notify the observer.
  ///
  /// Returns the description affected by `Add`, `Edit` and `Delete`.
  pub fn dispatch(
    &self,
    action: RegistryAction,
  ) -> Result<Option<TransformationDescription>, RegistryError> {
    let name = action.name();
    let (affected, snapshot) = {
      let mut tracked = self.write();
      let affected = match action {
        RegistryAction::Add(description) => {
          tracked.registry.add(description.clone());
          Some(description)
        }
        RegistryAction::Edit { id, delta } => Some(tracked.registry.edit(&id, delta)?),
        RegistryAction::Delete(id) => {
          let description = tracked
            .registry
            .find(&id)
            .cloned()
            .ok_or(RegistryError::NotFound(id))?;
          tracked.registry.remove(&description);
          Some(description)
        }
        RegistryAction::Set(registry) => {
          tracked.registry.replace_all(registry);
          None
        }
      };
      (affected, tracked.snapshot())
    };
    debug!(action = name, tracked = snapshot.transformations.len(), "registry changed");
    self.observer.notify(snapshot);
    Ok(affected)
  }

  /// Drop every description invalidated by deleting `artifact` and swap in
  /// the remaining registry. Returns the dropped descriptions.
  pub fn remove_dependents(&self, artifact: &str) -> Vec<TransformationDescription> {
    let (dropped, snapshot) = {
      let mut tracked = self.write();
      let (kept, dropped) = tracked.registry.without_dependents(artifact);
      if dropped.is_empty() {
        return dropped;
      }
      tracked.registry.replace_all(kept);
      for description in &dropped {
        for output in description.outputs() {
          tracked.edited.remove(output);
        }
      }
      (dropped, tracked.snapshot())
    };
    debug!(artifact, dropped = dropped.len(), "registry changed");
    self.observer.notify(snapshot);
    dropped
  }

  /// Re-send the current snapshot, e.g. after an artifact was retitled.
  pub fn refresh(&self) {
    let snapshot = self.read().snapshot();
    self.observer.notify(snapshot);
  }

  pub fn snapshot(&self) -> RegistrySnapshot {
    self.read().snapshot()
  }

  /// A copy of the current registry.
  pub fn registry(&self) -> Registry {
    self.read().registry.clone()
  }

  pub fn bucket(&self, artifact: &str) -> Vec<TransformationDescription> {
    self.read().registry.bucket(artifact).to_vec()
  }

  pub fn find(&self, id: &str) -> Option<TransformationDescription> {
    self.read().registry.find(id).cloned()
  }

  pub fn writers_of(&self, artifact: &str) -> Vec<TransformationDescription> {
    self
      .read()
      .registry
      .writers_of(artifact)
      .into_iter()
      .cloned()
      .collect()
  }

  pub fn tracks(&self, artifact: &str) -> bool {
    self.read().registry.tracks(artifact)
  }

  /// Remember that a person edited `output`. Returns whether it was newly marked.
  pub fn mark_edited(&self, output: &str) -> bool {
    self.write().edited.insert(output.to_string())
  }

  pub fn clear_edited(&self, output: &str) -> bool {
    self.write().edited.remove(output)
  }

  pub fn is_edited(&self, output: &str) -> bool {
    self.read().edited.contains(output)
  }

  pub fn edited_outputs(&self) -> EditedOutputs {
    self.read().edited.clone()
  }

  /// Encode the registry and edited outputs as a save-state blob.
  pub fn save(&self) -> Value {
    let tracked = self.read();
    SavedState::capture(&tracked.registry, &tracked.edited).encode()
  }

  /// Replace everything with the contents of a save-state blob.
  pub fn load(&self, blob: Value) -> Result<(), CodecError> {
    let (registry, edited) = SavedState::decode(blob)?.restore();
    self.write().edited = edited;
    // Set never fails
    let _ = self.dispatch(RegistryAction::Set(registry));
    Ok(())
  }
}

impl Default for RegistryStore {
  fn default() -> Self {
    Self::new(Arc::new(NoopObserver))
  }
}
