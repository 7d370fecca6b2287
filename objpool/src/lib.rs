//! Fixed-size object allocator: pre-carves pages into same-sized blocks,
//! serves them off an intrusive free list and validates every free against
//! double frees, page boundaries and guard-byte corruption.

pub mod config;
pub mod error;
pub mod header;
pub mod layout;
pub mod pool;
pub mod stats;

pub use config::{HeaderKind, PoolConfig};
pub use error::PoolError;
pub use header::ExternalHeader;
pub use pool::ObjectPool;
pub use stats::PoolStats;
