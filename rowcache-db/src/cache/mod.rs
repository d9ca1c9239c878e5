//! Row caching: keyspace generations, read-through lookups and
//! write-driven invalidation.

pub mod invalidation;
pub mod keyspace;
pub mod record_cache;

pub use invalidation::{Invalidation, InvalidationCoordinator, TransactionContext};
pub use keyspace::{Generation, Keyspace};
pub use record_cache::{RecordCache, RowFetcher};
