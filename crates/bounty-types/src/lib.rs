/*!
# Bounty data model

Shared records for the bounty claim → submit → review → payout pipeline.

## Module Structure

- **amount**: `RewardAmount` in micro-RTC
- **id**: sequence identifiers and opaque agent/wallet identities
- **lifecycle**: the bounty state machine (`BountyStatus::next`)
- **bounty**, **claim**, **review**, **payout**: records owned by the
  registry, arbitrator, scoring engine and escrow respectively
- **time**: `MonoTime`, the unit every deadline is expressed in
*/

pub mod amount;
pub mod bounty;
pub mod claim;
pub mod error;
pub mod id;
pub mod lifecycle;
pub mod payout;
pub mod review;
pub mod time;

pub use amount::{RewardAmount, RTC_BASE_UNIT, RTC_DECIMALS};
pub use bounty::{Bounty, NewBounty, Tier};
pub use claim::{Claim, ClaimRequest, ClaimStatus};
pub use error::{Result, TypesError};
pub use id::{AgentId, BountyId, ClaimId, DecisionId, SubmissionId, WalletId};
pub use lifecycle::{AbandonReason, BountyEvent, BountyStatus, ClosureReason};
pub use payout::{PayoutRecord, PayoutStatus, Tranche};
pub use review::{
    decide_outcome, DimensionScores, Disqualifier, Evidence, ReviewDecision, ReviewOutcome,
    Submission, DEFAULT_APPROVAL_THRESHOLD, MAX_DIMENSION_SCORE,
};
pub use time::MonoTime;
