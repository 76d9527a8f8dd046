//! Notification runner with channel-based delivery.
//!
//! The `NotificationRunner` owns the channel the host delivers envelopes on
//! and feeds them to a [`TransformEngine`].

use std::sync::Arc;

use tabflow_host::{Envelope, HostNotification};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::TransformEngine;
use crate::error::EngineError;

/// Feeds host notifications to an engine.
///
/// Every envelope is validated and applied to the cache as soon as it is
/// received. Change notifications are then propagated as concurrent tasks;
/// deletions and retitles are handled inline, in arrival order.
///
/// # Usage
///
/// ```ignore
/// let runner = NotificationRunner::new(engine);
///
/// // Hand the sender to the host connection
/// host.connect(runner.sender());
///
/// // Start the loop
/// let cancel = CancellationToken::new();
/// runner.start(cancel).await?;
/// ```
pub struct NotificationRunner {
  // NOTE: Unbounded because deletions are handled on the loop itself: a
  // bounded channel could fill while the loop waits on a host call whose
  // notifications need to be queued.
  sender: mpsc::UnboundedSender<Envelope>,
  receiver: mpsc::UnboundedReceiver<Envelope>,
  engine: Arc<TransformEngine>,
  tasks: JoinSet<()>,
  permits: Arc<Semaphore>,
}

impl NotificationRunner {
  pub fn new(engine: Arc<TransformEngine>) -> Self {
    let (sender, receiver) = mpsc::unbounded_channel();
    let permits = Arc::new(Semaphore::new(engine.config().max_concurrent_updates.max(1)));
    Self {
      sender,
      receiver,
      engine,
      tasks: JoinSet::new(),
      permits,
    }
  }

  /// A sender for the host connection.
  pub fn sender(&self) -> mpsc::UnboundedSender<Envelope> {
    self.sender.clone()
  }

  pub fn engine(&self) -> &Arc<TransformEngine> {
    &self.engine
  }

  async fn dispatch(&mut self, envelope: Envelope) {
    let notification = match envelope.validate() {
      Ok(notification) => notification,
      Err(e) => {
        warn!(error = %e, "dropping invalid notification");
        return;
      }
    };

    if !self.engine.observe(&notification) {
      return;
    }

    match notification {
      HostNotification::ContextChanged { .. } => {
        let permit = match self.permits.clone().acquire_owned().await {
          Ok(permit) => permit,
          Err(e) => {
            error!(error = %e, "update permits closed");
            return;
          }
        };
        let engine = self.engine.clone();
        self.tasks.spawn(async move {
          engine.react(&notification).await;
          drop(permit);
        });
      }
      other => {
        self.engine.react(&other).await;
      }
    }
  }

  fn reap(&mut self) {
    while let Some(joined) = self.tasks.try_join_next() {
      if let Err(e) = joined {
        error!(error = %e, "propagation task panicked");
      }
    }
  }

  /// Process everything queued and everything it triggers, until the channel
  /// is empty and no propagation is in flight. Returns the number of
  /// envelopes processed.
  pub async fn settle(&mut self) -> usize {
    let mut processed = 0;
    loop {
      while let Ok(envelope) = self.receiver.try_recv() {
        self.dispatch(envelope).await;
        processed += 1;
      }
      match self.tasks.join_next().await {
        Some(Err(e)) => error!(error = %e, "propagation task panicked"),
        Some(Ok(())) => {}
        None => break,
      }
    }
    debug!(processed, "runner settled");
    processed
  }

  /// Run until the token is cancelled. In-flight propagations are awaited
  /// before returning.
  pub async fn start(mut self, cancel: CancellationToken) -> Result<(), EngineError> {
    info!("starting notification runner");

    loop {
      tokio::select! {
        _ = cancel.cancelled() => {
          info!("notification runner cancelled");
          break;
        }
        envelope = self.receiver.recv() => {
          match envelope {
            Some(envelope) => {
              self.dispatch(envelope).await;
              self.reap();
            }
            None => {
              info!("notification channel closed");
              break;
            }
          }
        }
      }
    }

    while let Some(joined) = self.tasks.join_next().await {
      if let Err(e) = joined {
        error!(error = %e, "propagation task panicked");
      }
    }
    Ok(())
  }
}
