//! Host bridge errors.

/// Errors returned by host bridge calls.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HostError {
  /// The data context does not exist.
  #[error("data context not found: {0}")]
  ContextNotFound(String),

  /// The text component does not exist.
  #[error("text component not found: {0}")]
  TextNotFound(String),

  /// The row does not exist in the context.
  #[error("row {row} not found in data context '{context}'")]
  RowNotFound { context: String, row: u64 },

  /// The host answered with a failure flag.
  #[error("host rejected {operation}: {message}")]
  Rejected { operation: String, message: String },

  /// The bridge to the host is gone.
  #[error("host bridge disconnected")]
  Disconnected,
}
