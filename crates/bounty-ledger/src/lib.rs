//! Append-only audit ledger.
//!
//! Every bounty state change is written here before it is applied. Entries
//! are hash-chained (blake3, genesis previous hash of 64 zeros) so any edit,
//! reorder or deletion is detected by [`verify_chain`], and [`replay`]
//! rebuilds all bounty state from the entries alone.

pub mod entry;
pub mod error;
pub mod event;
pub mod jsonl;
pub mod ledger;
pub mod memory;
pub mod replay;

pub use entry::{compute_hash, verify_chain, LedgerEntry, GENESIS_HASH};
pub use error::{LedgerError, Result};
pub use event::LedgerEvent;
pub use jsonl::JsonlAuditLedger;
pub use ledger::AuditLedger;
pub use memory::MemoryAuditLedger;
pub use replay::{replay, LedgerReplay, ReplayedBounty};
