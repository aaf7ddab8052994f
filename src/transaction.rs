use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{database::Database, types::SmallResult};

static TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque id tagging the locks a thread holds and the dirty pages it
/// owns (spec glossary: "Transaction"). Created by a thread and passed
/// through the call stack; never shared across threads concurrently.
#[derive(Eq, Hash, PartialEq, Clone, Copy)]
pub struct Transaction {
    uuid: u64,
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            uuid: TRANSACTION_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    #[cfg(test)]
    pub fn new_specific_id(id: u64) -> Self {
        Self { uuid: id }
    }

    pub fn commit(&self) -> SmallResult {
        self.complete(true)
    }

    pub fn abort(&self) -> SmallResult {
        self.complete(false)
    }

    /// Flush-or-discard dirty pages (buffer pool) then release every
    /// lock this transaction holds (concurrent status) — the two-step
    /// split mirrors the ancestor's architecture, where page I/O and
    /// lock bookkeeping are handled by separate components.
    fn complete(&self, commit: bool) -> SmallResult {
        Database::mut_buffer_pool().transaction_complete(self, commit)?;
        Database::concurrent_status().release_lock_by_tx(self);
        Ok(())
    }

    pub fn get_id(&self) -> u64 {
        self.uuid
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "tx_{}", self.uuid)
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self)
    }
}

#[cfg(test)]
mod tests {
    use crate::test_utils::fixed_transaction;

    #[test]
    fn fixed_id_round_trips_through_accessors() {
        let tx = fixed_transaction(42);
        assert_eq!(tx.get_id(), 42);
        assert_eq!(format!("{}", tx), "tx_42");
        assert_eq!(tx, fixed_transaction(42));
        assert_ne!(tx, fixed_transaction(43));
    }
}
