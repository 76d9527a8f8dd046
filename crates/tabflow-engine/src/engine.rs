//! The engine facade wiring cache, registry, propagator and reconciler.

use std::sync::Arc;

use serde_json::Value;
use tabflow_cache::{CacheStats, CachedHost};
use tabflow_catalog::Catalog;
use tabflow_host::{ChangeOrigin, Envelope, HostBridge, HostNotification};
use tabflow_registry::{
  NoopObserver, RegistryAction, RegistryObserver, RegistryStore, TransformationDescription,
};
use tracing::{debug, info};

use crate::apply::{Applier, ApplyRequest};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::error_board::ErrorBoard;
use crate::events::{NoopNotifier, PropagationNotifier};
use crate::ids::{IdGenerator, UuidIds};
use crate::locks::KeyedLocks;
use crate::propagator::{PropagationReport, UpdatePropagator};
use crate::reconciler::DeletionReconciler;

/// What handling one notification did.
#[derive(Debug, Clone, PartialEq)]
pub enum Reaction {
  Propagated(PropagationReport),
  Reconciled(Vec<TransformationDescription>),
  /// Observers were sent a fresh snapshot.
  Refreshed,
  Ignored,
}

/// Builder for [`TransformEngine`].
pub struct EngineBuilder {
  host: Arc<dyn HostBridge>,
  catalog: Catalog,
  config: EngineConfig,
  ids: Arc<dyn IdGenerator>,
  notifier: Arc<dyn PropagationNotifier>,
  observer: Arc<dyn RegistryObserver>,
}

impl EngineBuilder {
  pub fn catalog(mut self, catalog: Catalog) -> Self {
    self.catalog = catalog;
    self
  }

  pub fn config(mut self, config: EngineConfig) -> Self {
    self.config = config;
    self
  }

  pub fn ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
    self.ids = ids;
    self
  }

  pub fn notifier(mut self, notifier: Arc<dyn PropagationNotifier>) -> Self {
    self.notifier = notifier;
    self
  }

  pub fn observer(mut self, observer: Arc<dyn RegistryObserver>) -> Self {
    self.observer = observer;
    self
  }

  pub fn build(self) -> TransformEngine {
    let cached = Arc::new(CachedHost::new(self.host));
    let host: Arc<dyn HostBridge> = cached.clone();
    let catalog = Arc::new(self.catalog);
    let store = Arc::new(RegistryStore::new(self.observer));
    let errors = Arc::new(ErrorBoard::new());
    let output_locks = Arc::new(KeyedLocks::new());

    TransformEngine {
      propagator: UpdatePropagator::new(
        host.clone(),
        catalog.clone(),
        store.clone(),
        errors.clone(),
        self.notifier.clone(),
        output_locks.clone(),
        self.config.clone(),
      ),
      reconciler: DeletionReconciler::new(
        host.clone(),
        store.clone(),
        errors.clone(),
        self.notifier,
        output_locks,
        self.config.clone(),
      ),
      applier: Applier::new(host, catalog, store.clone(), self.ids),
      cached,
      store,
      errors,
      config: self.config,
    }
  }
}

/// Keeps tracked transformations in sync with host changes.
///
/// All host traffic goes through a [`CachedHost`]; notifications must reach
/// the engine through [`TransformEngine::observe`] (or
/// [`TransformEngine::handle_notification`], which calls it) so the cache is
/// invalidated before anything reads again.
pub struct TransformEngine {
  cached: Arc<CachedHost>,
  store: Arc<RegistryStore>,
  errors: Arc<ErrorBoard>,
  propagator: UpdatePropagator,
  reconciler: DeletionReconciler,
  applier: Applier,
  config: EngineConfig,
}

impl TransformEngine {
  pub fn builder(host: Arc<dyn HostBridge>) -> EngineBuilder {
    EngineBuilder {
      host,
      catalog: Catalog::with_builtins(),
      config: EngineConfig::default(),
      ids: Arc::new(UuidIds),
      notifier: Arc::new(NoopNotifier),
      observer: Arc::new(NoopObserver),
    }
  }

  /// An engine with the built-in catalog and default configuration.
  pub fn new(host: Arc<dyn HostBridge>) -> Self {
    Self::builder(host).build()
  }

  pub fn config(&self) -> &EngineConfig {
    &self.config
  }

  pub fn store(&self) -> &Arc<RegistryStore> {
    &self.store
  }

  pub fn errors(&self) -> &Arc<ErrorBoard> {
    &self.errors
  }

  pub fn cache_stats(&self) -> CacheStats {
    self.cached.cache().stats()
  }

  /// Apply a transformer and start tracking it.
  pub async fn apply(&self, request: ApplyRequest) -> Result<TransformationDescription, EngineError> {
    self.applier.apply(request).await
  }

  /// Stop tracking a description. Its outputs are left as they are.
  pub fn remove(&self, id: &str) -> Result<TransformationDescription, EngineError> {
    let removed = self
      .store
      .dispatch(RegistryAction::Delete(id.to_string()))?
      .ok_or_else(|| EngineError::validation(format!("nothing tracked as '{}'", id)))?;
    self.errors.clear(&removed.error_id);
    Ok(removed)
  }

  /// The synchronous part of handling a notification: cache invalidation,
  /// hand-edit tracking and snapshot refresh on retitles.
  ///
  /// Returns whether the notification needs [`TransformEngine::react`].
  pub fn observe(&self, notification: &HostNotification) -> bool {
    self.cached.observe(notification);
    match notification {
      HostNotification::ContextChanged {
        context,
        origin: ChangeOrigin::User,
        ..
      } => {
        if !self.store.writers_of(context).is_empty() && self.store.mark_edited(context) {
          info!(output = %context, "tracked output edited by hand");
        }
        true
      }
      HostNotification::ContextChanged { .. }
      | HostNotification::ContextDeleted { .. }
      | HostNotification::TextDeleted { .. } => true,
      HostNotification::TitleChanged { artifact } => {
        if self.store.tracks(artifact) {
          self.store.refresh();
        }
        false
      }
    }
  }

  /// The asynchronous part: rerun or reconcile.
  pub async fn react(&self, notification: &HostNotification) -> Reaction {
    match notification {
      HostNotification::ContextChanged { context, .. } => {
        Reaction::Propagated(self.propagator.artifact_changed(context).await)
      }
      HostNotification::ContextDeleted { context } => {
        Reaction::Reconciled(self.reconciler.artifact_deleted(context).await)
      }
      HostNotification::TextDeleted { text } => {
        Reaction::Reconciled(self.reconciler.artifact_deleted(text).await)
      }
      HostNotification::TitleChanged { .. } => Reaction::Ignored,
    }
  }

  pub async fn handle_notification(&self, notification: HostNotification) -> Reaction {
    debug!(?notification, "handling notification");
    if !self.observe(&notification) {
      return match notification {
        HostNotification::TitleChanged { artifact } if self.store.tracks(&artifact) => {
          Reaction::Refreshed
        }
        _ => Reaction::Ignored,
      };
    }
    self.react(&notification).await
  }

  /// Validate an envelope from the host and handle it.
  pub async fn handle_envelope(&self, envelope: Envelope) -> Result<Reaction, EngineError> {
    let notification = envelope.validate()?;
    Ok(self.handle_notification(notification).await)
  }

  /// The save-state blob: `{activeTransformations, editedOutputs}`.
  pub fn save_state(&self) -> Value {
    self.store.save()
  }

  /// Replace the tracked transformations with those in a save-state blob.
  pub fn load_state(&self, blob: Value) -> Result<(), EngineError> {
    self.store.load(blob)?;
    info!(tracked = self.store.registry().len(), "loaded saved transformations");
    Ok(())
  }
}
