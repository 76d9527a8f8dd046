//! Tabflow Engine
//!
//! Keeps transformation outputs in sync with the host.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    NotificationRunner                       │
//! │  - owns the envelope channel the host sends on              │
//! │  - validates, invalidates the cache, dispatches             │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     TransformEngine                         │
//! │  - changed  → UpdatePropagator (per-bucket, sequential)     │
//! │  - deleted  → DeletionReconciler (freeze or remove)         │
//! │  - apply    → Applier (validate, create, register)          │
//! └─────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │      Catalog  ·  RegistryStore  ·  CachedHost  ·  ErrorBoard │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let engine = Arc::new(TransformEngine::new(host.clone()));
//! let runner = NotificationRunner::new(engine.clone());
//! host.connect(runner.sender());
//!
//! engine.apply(ApplyRequest::new("Mean", state)).await?;
//!
//! let cancel = CancellationToken::new();
//! runner.start(cancel).await?;
//! ```

mod apply;
mod config;
mod engine;
mod error;
mod error_board;
mod events;
mod ids;
mod locks;
mod propagator;
mod reconciler;
mod runner;

pub use apply::{Applier, ApplyRequest};
pub use config::{DeletionPolicy, EditedOutputPolicy, EngineConfig};
pub use engine::{EngineBuilder, Reaction, TransformEngine};
pub use error::EngineError;
pub use error_board::{ErrorBoard, ErrorUpdate};
pub use events::{ChannelNotifier, NoopNotifier, PropagationEvent, PropagationNotifier};
pub use ids::{IdGenerator, SequentialIds, UuidIds};
pub use locks::KeyedLocks;
pub use propagator::{PropagationReport, UpdatePropagator};
pub use reconciler::DeletionReconciler;
pub use runner::NotificationRunner;
