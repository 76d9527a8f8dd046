//! Propagation events and notifiers for observability.
//!
//! Events are emitted while buckets are processed and deletions are
//! reconciled, so consumers can log progress, drive a UI or assert on what
//! happened in tests.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted by the propagator and the reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PropagationEvent {
  /// A change to `source` is being propagated to its bucket.
  BucketStarted { source: String, descriptions: usize },

  /// A description's outputs were rewritten.
  DescriptionUpdated {
    source: String,
    description_id: String,
    outputs: Vec<String>,
  },

  /// A description failed; the message was posted under `error_id`.
  DescriptionFailed {
    source: String,
    description_id: String,
    error_id: String,
    error: String,
  },

  /// A description was left alone.
  DescriptionSkipped {
    source: String,
    description_id: String,
    reason: String,
  },

  /// The outputs of a description were retitled after `artifact` was deleted.
  DescriptionFrozen {
    artifact: String,
    description_id: String,
    outputs: Vec<String>,
  },

  /// A description stopped being tracked after `artifact` was deleted.
  DescriptionRemoved {
    artifact: String,
    description_id: String,
  },

  /// The bucket of `source` has been processed.
  BucketFinished {
    source: String,
    updated: usize,
    failed: usize,
    skipped: usize,
  },
}

/// Trait for receiving propagation events.
pub trait PropagationNotifier: Send + Sync {
  fn notify(&self, event: PropagationEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl PropagationNotifier for NoopNotifier {
  fn notify(&self, _event: PropagationEvent) {
    // Intentionally empty
  }
}

/// Sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // NOTE: Unbounded so a slow consumer never stalls propagation. Volume is a
  // handful of events per notification.
  sender: mpsc::UnboundedSender<PropagationEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<PropagationEvent>) -> Self {
    Self { sender }
  }
}

impl PropagationNotifier for ChannelNotifier {
  fn notify(&self, event: PropagationEvent) {
    // Ignore send errors - receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
