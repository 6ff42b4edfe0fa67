//! Lendbase Cache - Keyed Blob Store and Load Coalescing
//!
//! This crate provides the cache side of the Lendbase repository protocol:
//!
//! - `BlobCache`: the abstract keyed store with TTL and negative
//!   (placeholder) entries, consumed by the repository's read-through path
//! - `MemoryCache`: the default in-process backend
//! - `SingleFlight`: per-key coalescing of concurrent backend loads
//!
//! Invalidation across processes is best-effort only; TTL is the sole
//! cross-process convergence mechanism.

pub mod memory;
pub mod port;
pub mod single_flight;

pub use memory::MemoryCache;
pub use port::{BlobCache, CacheEntry, CacheStats, DEFAULT_PLACEHOLDER_TTL};
pub use single_flight::SingleFlight;
