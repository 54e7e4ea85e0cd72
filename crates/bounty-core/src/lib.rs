//! Bounty lifecycle core: registry, claim arbitration, scoring and payout.
//!
//! Control flow: `BountyRegistry` → `ClaimArbitrator` (claim) → external
//! work → `ScoringEngine` (submit, review) → `PayoutEscrow` (disburse), with
//! every committed change written ahead to the audit ledger.

pub mod arbitrator;
pub mod claim_format;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod escrow;
pub mod registry;
pub mod scoring;
pub mod sweeper;
pub mod transfer;

pub use arbitrator::ClaimArbitrator;
pub use claim_format::parse_claim_comment;
pub use clock::{Clock, ManualClock, MonotonicClock, TimelineAnchor};
pub use config::{ClaimConfig, EngineConfig, PayoutConfig, ScoringConfig};
pub use engine::BountyEngine;
pub use error::{BountyError, Result};
pub use escrow::PayoutEscrow;
pub use registry::{BountyGuard, BountyRegistry, ChangeSet};
pub use scoring::{ReviewInput, ScoringEngine};
pub use sweeper::spawn_expiry_sweeper;
pub use transfer::{
    MemoryTransferBackend, TransferBackend, TransferError, TransferReceipt, TransferRequest,
};
