//! Tabflow Host
//!
//! This crate defines the boundary between tabflow and the host application
//! that owns the datasets.
//!
//! - [`HostBridge`] is the async request/response surface (read a dataset,
//!   write one back in place, create and retitle artifacts).
//! - [`Envelope`] and [`HostNotification`] are the closed, versioned schema
//!   for one-way notifications. Raw notifications are validated with
//!   [`Envelope::validate`] before they reach the core.
//! - [`MemoryHost`] is an in-process host used by tests and the CLI replay.

mod bridge;
mod error;
mod memory;
mod protocol;

pub use bridge::HostBridge;
pub use error::HostError;
pub use memory::{HostCall, MemoryHost, TextComponent};
pub use protocol::{
  ChangeCategory, ChangeOrigin, ContextChange, Envelope, HostNotification, PROTOCOL_VERSION,
  ProtocolError,
};
