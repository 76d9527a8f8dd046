/// Errors raised by registry actions.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
  /// No tracked description has this id.
  #[error("no tracked transformation with id '{0}'")]
  NotFound(String),

  /// Only full-override descriptions change after creation.
  #[error("transformation '{id}' is a {transformer} dataset creator and cannot be edited")]
  NotEditable { id: String, transformer: String },
}

/// Errors raised while decoding a save-state blob.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
  #[error("malformed save state: {0}")]
  Malformed(#[from] serde_json::Error),

  /// The same id was saved twice with different contents.
  #[error("conflicting saved transformations share id '{0}'")]
  ConflictingId(String),
}
