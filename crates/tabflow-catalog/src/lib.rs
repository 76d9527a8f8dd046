//! Tabflow Catalog
//!
//! Maps a transformer name to its implementation. A transformer is one of two
//! kinds, modelled as the closed [`Transformer`] sum type:
//!
//! - [`DatasetCreator`]: a pure function of the stored configuration state.
//!   It reads its sources through the host bridge and returns a new dataset
//!   or a value rendered as text. Re-running it with the same state refreshes
//!   the output.
//! - [`FullOverrideTransformer`]: hand-written create/update logic that
//!   manages its own outputs and reports back how its stored state changed.
//!   Partitioning is the one such transformer.

mod builtin;
mod catalog;
mod error;
mod partition;
mod transformer;

pub use builtin::{Count, Duplicate, Mean};
pub use catalog::Catalog;
pub use error::TransformError;
pub use partition::{PARTITION, Partition};
pub use transformer::{
  CreatorOutput, DatasetCreator, FullOverrideCreated, FullOverrideDelta, FullOverrideTransformer,
  OutputType, Payload, TransformState, Transformer, display_text, required_str,
};
