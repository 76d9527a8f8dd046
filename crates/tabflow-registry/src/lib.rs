//! Tabflow Registry
//!
//! The dependency index of tracked transformations. Each
//! [`TransformationDescription`] is filed under every source artifact it
//! reads, so a change to that artifact finds the descriptions to rerun with
//! one lookup.
//!
//! [`Registry`] is a plain value with explicit operations. [`RegistryStore`]
//! wraps it for shared use, applies [`RegistryAction`]s and notifies a
//! [`RegistryObserver`] after each one. [`SavedState`] is the save-state blob.

mod codec;
mod description;
mod error;
mod registry;
mod store;

pub use codec::{EditedOutputs, SavedState};
pub use description::{DescriptionId, DescriptionKind, TransformationDescription};
pub use error::{CodecError, RegistryError};
pub use registry::{DescriptionDelta, Registry};
pub use store::{
  ChannelObserver, NoopObserver, RegistryAction, RegistryObserver, RegistrySnapshot, RegistryStore,
};
