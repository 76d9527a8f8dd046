//! Result caching for host reads.
//!
//! [`ResultCache`] memoizes three kinds of host reads: a context's schema, its
//! full ordered row list, and individual rows. Entries are dropped according
//! to the category of each host notification; when a notification does not
//! say which rows changed, every row of the context goes.
//!
//! [`CachedHost`] wraps any [`tabflow_host::HostBridge`] and reads through
//! the cache, so several transformers reading the same source during one
//! update cycle cost a single round trip.

mod cache;
mod cached_host;

pub use cache::{CacheStats, ResultCache};
pub use cached_host::CachedHost;
