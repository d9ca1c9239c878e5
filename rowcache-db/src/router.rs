//! Read/write connection routing.
//!
//! Every public entry point states its access intent when it reaches for a
//! source. The intent is an argument, never instance state, so it cannot
//! leak from one call into the next.

use rand::Rng;
use rowcache_core::ConnectionIdentity;
use rowcache_storage::RelationalSource;

/// Access intent of one statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

/// Chooses the relational source for each statement.
pub trait SourceRouter {
    type Source: RelationalSource;

    /// The writable source. Transactions run here.
    fn primary(&self) -> &Self::Source;

    /// Source for a statement with the given intent. `pinned` forces the
    /// primary, which an open transaction requires to read its own writes.
    fn route(&self, access: Access, pinned: bool) -> &Self::Source;

    fn replica_count(&self) -> usize {
        0
    }

    /// Identity the cache keyspace is derived from. Always the primary's, so
    /// every replica shares one set of cache entries.
    fn identity(&self) -> ConnectionIdentity {
        self.primary().identity()
    }
}

/// One connection for reads and writes.
#[derive(Debug, Clone)]
pub struct Single<S> {
    source: S,
}

impl<S: RelationalSource> Single<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn into_inner(self) -> S {
        self.source
    }
}

impl<S: RelationalSource> SourceRouter for Single<S> {
    type Source = S;

    fn primary(&self) -> &S {
        &self.source
    }

    fn route(&self, _access: Access, _pinned: bool) -> &S {
        &self.source
    }
}

/// A primary plus read replicas.
///
/// Reads go to a uniformly random replica; writes and pinned statements go
/// to the primary. With no replicas everything goes to the primary.
#[derive(Debug, Clone)]
pub struct Replicated<S> {
    primary: S,
    replicas: Vec<S>,
}

impl<S: RelationalSource> Replicated<S> {
    pub fn new(primary: S, replicas: Vec<S>) -> Self {
        Self { primary, replicas }
    }

    pub fn replicas(&self) -> &[S] {
        &self.replicas
    }
}

impl<S: RelationalSource> SourceRouter for Replicated<S> {
    type Source = S;

    fn primary(&self) -> &S {
        &self.primary
    }

    fn route(&self, access: Access, pinned: bool) -> &S {
        if access == Access::Write || pinned || self.replicas.is_empty() {
            return &self.primary;
        }
        let index = rand::rng().random_range(0..self.replicas.len());
        &self.replicas[index]
    }

    fn replica_count(&self) -> usize {
        self.replicas.len()
    }
}
