use tabflow_catalog::TransformError;
use tabflow_host::{HostError, ProtocolError};
use tabflow_registry::{CodecError, RegistryError};

/// Errors surfaced by the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
  /// The request was rejected before any host call.
  #[error("invalid transformation: {message}")]
  Validation { message: String },

  #[error(transparent)]
  Transform(#[from] TransformError),

  #[error("host call failed: {0}")]
  Host(#[from] HostError),

  #[error(transparent)]
  Registry(#[from] RegistryError),

  #[error(transparent)]
  Codec(#[from] CodecError),

  #[error("rejected host notification: {0}")]
  Protocol(#[from] ProtocolError),
}

impl EngineError {
  pub(crate) fn validation(message: impl Into<String>) -> Self {
    EngineError::Validation {
      message: message.into(),
    }
  }
}
