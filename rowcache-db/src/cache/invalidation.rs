//! Write-driven cache invalidation with transaction deferral.

use rowcache_core::PrimaryKey;

/// What the caller must do with the cache after a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    /// Delete these keys now.
    Immediate(Vec<PrimaryKey>),
    /// Keys were buffered until the open transaction resolves.
    Deferred,
}

/// Open transaction state: keys written so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionContext {
    pending: Vec<PrimaryKey>,
}

impl TransactionContext {
    pub fn pending(&self) -> &[PrimaryKey] {
        &self.pending
    }
}

/// Decides between immediate and deferred invalidation.
///
/// While a transaction is open nothing is deleted; the keys wait in the
/// transaction context. Commit hands them back for one batch delete,
/// rollback drops them. Rolled-back writes never reached the cache because
/// entries are only stored after a source read.
#[derive(Debug, Clone, Default)]
pub struct InvalidationCoordinator {
    transaction: Option<TransactionContext>,
}

impl InvalidationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a transaction, discarding any stale buffer.
    pub fn begin(&mut self) {
        self.transaction = Some(TransactionContext::default());
    }

    pub fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    pub fn transaction(&self) -> Option<&TransactionContext> {
        self.transaction.as_ref()
    }

    pub fn on_write(&mut self, pks: Vec<PrimaryKey>) -> Invalidation {
        match &mut self.transaction {
            Some(context) => {
                tracing::debug!(keys = pks.len(), "deferring invalidation until commit");
                context.pending.extend(pks);
                Invalidation::Deferred
            }
            None => Invalidation::Immediate(pks),
        }
    }

    /// Close the transaction and return the keys to invalidate.
    pub fn on_commit(&mut self) -> Vec<PrimaryKey> {
        self.transaction
            .take()
            .map(|context| context.pending)
            .unwrap_or_default()
    }

    /// Close the transaction, returning how many buffered keys were dropped.
    pub fn on_rollback(&mut self) -> usize {
        let dropped = self
            .transaction
            .take()
            .map_or(0, |context| context.pending.len());
        if dropped > 0 {
            tracing::debug!(keys = dropped, "discarded deferred invalidations");
        }
        dropped
    }
}
