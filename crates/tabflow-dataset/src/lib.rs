//! Tabflow Dataset
//!
//! Plain, serializable types describing the tabular data a host application
//! manages. A data context is a [`ContextSchema`] (its collections and
//! attributes) plus an ordered list of [`Row`]s, together a [`DataSet`].
//!
//! These types carry no behaviour beyond lookups; the host bridge moves them
//! across the boundary and transformers compute new ones from them.

mod dataset;
mod schema;

pub use dataset::{DataSet, Row, RowId, as_number};
pub use schema::{Attribute, Collection, ContextSchema};
