//! Idempotency ledger keyed by dedup key.
//!
//! Guarantees at most one effective delivery per key: a worker must reserve
//! the key before sending, a successful send is committed permanently, and
//! later jobs with the same key are completed without sending.

mod backend;
mod memory_backend;

use std::sync::Arc;

pub use backend::{
    DedupLedger, LedgerEntry, LedgerError, LedgerOutcome, LedgerStats, Reservation,
    ReserveOutcome,
};
pub use memory_backend::MemoryDedupLedger;

/// Create the ledger backend
pub fn create_dedup_ledger() -> Arc<dyn DedupLedger> {
    tracing::info!(backend = "memory", "Creating memory dedup ledger");
    Arc::new(MemoryDedupLedger::new())
}
