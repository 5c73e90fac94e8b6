//! Staging of oversized intermediate results
//!
//! - [`StagingCache`]: keyed, TTL-bound store for raw JSON and tabular datasets
//! - [`SessionRegistry`]: one lazily created cache per logical session
//! - [`scope`]: binds the active session cache to the task running a tool call

pub mod cache;
pub mod scope;
pub mod session;

pub use cache::{CacheStats, StagedValue, StagingCache};
pub use scope::{active_cache, with_cache, CacheResolver};
pub use session::{Session, SessionRegistry};
