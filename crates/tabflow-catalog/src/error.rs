//! Transformer errors.

use tabflow_host::HostError;

use crate::transformer::OutputType;

/// Errors raised by transformers and catalog lookups.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
  /// No transformer registered under this name.
  #[error("unknown transformer '{0}'")]
  UnknownTransformer(String),

  /// The stored configuration is incomplete or invalid.
  #[error("invalid configuration for '{transformer}': {message}")]
  InvalidState {
    transformer: String,
    message: String,
  },

  /// A referenced attribute does not exist in the source.
  #[error("attribute '{attribute}' not found in '{context}'")]
  MissingAttribute { context: String, attribute: String },

  /// The computation itself failed.
  #[error("{transformer} failed: {message}")]
  Compute {
    transformer: String,
    message: String,
  },

  /// The transformer produced a different shape than the output it feeds.
  #[error("expected a {expected} result but the transformer produced a {found}")]
  OutputShapeMismatch {
    expected: OutputType,
    found: OutputType,
  },

  /// A host call made by the transformer failed.
  #[error(transparent)]
  Host(#[from] HostError),
}

impl TransformError {
  /// Whether this error stems from configuration rather than data or host.
  pub fn is_validation(&self) -> bool {
    matches!(
      self,
      TransformError::UnknownTransformer(_) | TransformError::InvalidState { .. }
    )
  }
}
