//! rowcache DB - Cache-Aside Consistency Layer
//!
//! Binds one relational table to a key-value cache:
//! - Read-through point and batch lookups by primary key
//! - Per-key invalidation on every write, deferred to commit inside a transaction
//! - O(1) whole-table invalidation through keyspace generations
//! - Projection, show hooks and write hooks applied identically on cached and
//!   uncached paths
//! - Read/write routing across a primary and its replicas

pub mod cache;
pub mod db;
pub mod pagination;
pub mod pipeline;
pub mod query;
pub mod router;

pub use cache::{
    Generation, Invalidation, InvalidationCoordinator, Keyspace, RecordCache, RowFetcher,
    TransactionContext,
};
pub use db::CacheDb;
pub use pagination::{order_by_primary, Pagination};
pub use pipeline::{FilterHooks, RowFilter};
pub use query::{Query, QueryShape};
pub use router::{Access, Replicated, Single, SourceRouter};

// Re-export the types every caller needs alongside the facade.
pub use rowcache_core::{
    CacheEndpoint, CacheError, ConfigError, ConnectionIdentity, Direction, Predicate, PrimaryKey,
    Projection, Row, RowcacheConfig, RowcacheError, RowcacheResult, SourceError,
};
pub use rowcache_storage::{
    CacheStats, Expiration, InMemoryKvCache, KvCache, MemorySource, RelationalSource,
};
