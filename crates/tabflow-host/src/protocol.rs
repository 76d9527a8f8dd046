//! Notification protocol spoken by the host.
//!
//! Notifications arrive wrapped in an [`Envelope`] that names the protocol
//! version. The set of notification kinds and context changes is closed; an
//! envelope is validated once at the boundary and the core only ever sees a
//! [`HostNotification`].

use serde::{Deserialize, Serialize};
use tabflow_dataset::RowId;

/// Version of the notification schema this crate understands.
pub const PROTOCOL_VERSION: u32 = 1;

/// Errors raised while validating an incoming notification.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
  #[error("unsupported protocol version {found}, expected {expected}")]
  UnsupportedVersion { found: u32, expected: u32 },

  #[error("notification '{kind}' carries an empty identifier")]
  EmptyIdentifier { kind: &'static str },

  #[error("malformed notification: {0}")]
  Malformed(#[from] serde_json::Error),
}

/// Who caused a context change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChangeOrigin {
  /// The host did not say.
  #[default]
  Unknown,
  /// A write issued through the host bridge by this plugin.
  Plugin,
  /// A person editing the data in the host.
  User,
}

/// The structural change a context-changed notification reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum ContextChange {
  CreateCases {
    #[serde(default)]
    ids: Vec<RowId>,
  },
  /// `ids` is `None` when the host did not say which rows changed.
  UpdateCases {
    #[serde(default)]
    ids: Option<Vec<RowId>>,
  },
  DeleteCases {
    #[serde(default)]
    ids: Option<Vec<RowId>>,
  },
  MoveCases,
  CreateAttributes,
  UpdateAttributes,
  DeleteAttributes,
  MoveAttribute,
  HideAttributes,
  ShowAttributes,
  CreateCollection,
  UpdateCollection,
  DeleteCollection,
  /// Context-level metadata (title, description) changed.
  UpdateDataContext,
}

/// Coarse classification used for cache invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeCategory {
  Rows,
  Columns,
  Collections,
  Metadata,
}

impl ContextChange {
  pub fn category(&self) -> ChangeCategory {
    match self {
      ContextChange::CreateCases { .. }
      | ContextChange::UpdateCases { .. }
      | ContextChange::DeleteCases { .. }
      | ContextChange::MoveCases => ChangeCategory::Rows,
      ContextChange::CreateAttributes
      | ContextChange::UpdateAttributes
      | ContextChange::DeleteAttributes
      | ContextChange::MoveAttribute
      | ContextChange::HideAttributes
      | ContextChange::ShowAttributes => ChangeCategory::Columns,
      ContextChange::CreateCollection
      | ContextChange::UpdateCollection
      | ContextChange::DeleteCollection => ChangeCategory::Collections,
      ContextChange::UpdateDataContext => ChangeCategory::Metadata,
    }
  }
}

/// One-way notifications delivered by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum HostNotification {
  /// The contents or structure of a data context changed.
  ContextChanged {
    context: String,
    change: ContextChange,
    #[serde(default)]
    origin: ChangeOrigin,
  },
  /// A data context was deleted.
  ContextDeleted { context: String },
  /// A text component was deleted.
  TextDeleted { text: String },
  /// The display title of a context or component changed.
  TitleChanged { artifact: String },
}

impl HostNotification {
  /// Identifier of the artifact the notification is about.
  pub fn artifact(&self) -> &str {
    match self {
      HostNotification::ContextChanged { context, .. } => context,
      HostNotification::ContextDeleted { context } => context,
      HostNotification::TextDeleted { text } => text,
      HostNotification::TitleChanged { artifact } => artifact,
    }
  }

  fn kind(&self) -> &'static str {
    match self {
      HostNotification::ContextChanged { .. } => "contextChanged",
      HostNotification::ContextDeleted { .. } => "contextDeleted",
      HostNotification::TextDeleted { .. } => "textDeleted",
      HostNotification::TitleChanged { .. } => "titleChanged",
    }
  }
}

/// Versioned wrapper around a notification as it crosses the boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
  pub version: u32,
  pub notification: HostNotification,
}

impl Envelope {
  /// Wrap a notification with the current protocol version.
  pub fn new(notification: HostNotification) -> Self {
    Self {
      version: PROTOCOL_VERSION,
      notification,
    }
  }

  /// Parse and validate a raw JSON notification.
  pub fn from_json(raw: serde_json::Value) -> Result<HostNotification, ProtocolError> {
    let envelope: Envelope = serde_json::from_value(raw)?;
    envelope.validate()
  }

  /// Check the envelope and unwrap its notification.
  pub fn validate(self) -> Result<HostNotification, ProtocolError> {
    if self.version != PROTOCOL_VERSION {
      return Err(ProtocolError::UnsupportedVersion {
        found: self.version,
        expected: PROTOCOL_VERSION,
      });
    }
    if self.notification.artifact().trim().is_empty() {
      return Err(ProtocolError::EmptyIdentifier {
        kind: self.notification.kind(),
      });
    }
    Ok(self.notification)
  }
}
