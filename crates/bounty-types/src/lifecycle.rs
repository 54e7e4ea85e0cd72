//! Bounty lifecycle state machine
//!
//! ```text
//! Open        --Claim-->        Claimed
//! Claimed     --Release-->      Open          (expiry or withdrawal)
//! Claimed     --Submit-->       Submitted
//! Submitted   --StartReview-->  UnderReview
//! UnderReview --Approve-->      Approved
//! UnderReview --Reject-->       Rejected
//! Rejected    --Reopen-->       Open
//! Rejected    --Abandon-->      Closed
//! Approved    --PayTranche-->   PartiallyPaid
//! Approved | PartiallyPaid --PayFinal--> Paid
//! Paid        --Close-->        Closed
//! Open        --Cancel-->       Closed
//! ```
//!
//! `Approved` and `PartiallyPaid` may also be closed by `Revoke` (dispute
//! upheld before the final tranche) or `Abandon` (wallet permanently
//! rejected by the ledger). `Closed` is terminal.

use crate::error::{Result, TypesError};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BountyStatus {
    Open,
    Claimed,
    Submitted,
    UnderReview,
    Approved,
    Rejected,
    PartiallyPaid,
    Paid,
    Closed,
}

/// Why a bounty stopped paying out without completing
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbandonReason {
    /// Maximum number of rejected submissions reached
    RejectionLimit { rejections: u32 },
    /// The ledger permanently refused the payout wallet
    WalletRejected { wallet: String, detail: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BountyEvent {
    Claim,
    /// Claim expired or was withdrawn
    Release,
    Submit,
    StartReview,
    Approve,
    Reject,
    Reopen,
    PayTranche,
    PayFinal,
    Close,
    Revoke { reason: String },
    Abandon(AbandonReason),
    Cancel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosureReason {
    Completed,
    Abandoned(AbandonReason),
    Revoked { reason: String },
    Cancelled,
}

impl BountyStatus {
    /// The single transition function. Every (state, event) pair not listed
    /// here is rejected and the caller's state is left untouched.
    pub fn next(&self, event: &BountyEvent) -> Result<BountyStatus> {
        use BountyEvent as E;
        use BountyStatus as S;

        let next = match (self, event) {
            (S::Open, E::Claim) => S::Claimed,
            (S::Open, E::Cancel) => S::Closed,
            (S::Claimed, E::Release) => S::Open,
            (S::Claimed, E::Submit) => S::Submitted,
            (S::Submitted, E::StartReview) => S::UnderReview,
            (S::UnderReview, E::Approve) => S::Approved,
            (S::UnderReview, E::Reject) => S::Rejected,
            (S::Rejected, E::Reopen) => S::Open,
            (S::Rejected, E::Abandon(_)) => S::Closed,
            (S::Approved, E::PayTranche) => S::PartiallyPaid,
            (S::Approved | S::PartiallyPaid, E::PayFinal) => S::Paid,
            (S::Approved | S::PartiallyPaid, E::Revoke { .. }) => S::Closed,
            (S::Approved | S::PartiallyPaid, E::Abandon(_)) => S::Closed,
            (S::Paid, E::Close) => S::Closed,
            _ => {
                return Err(TypesError::InvalidTransition {
                    from: *self,
                    event: event.clone(),
                })
            }
        };

        Ok(next)
    }

    pub fn can_apply(&self, event: &BountyEvent) -> bool {
        self.next(event).is_ok()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BountyStatus::Closed)
    }

    pub fn accepts_claims(&self) -> bool {
        matches!(self, BountyStatus::Open)
    }
}

impl fmt::Display for BountyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BountyStatus::Open => "open",
            BountyStatus::Claimed => "claimed",
            BountyStatus::Submitted => "submitted",
            BountyStatus::UnderReview => "under_review",
            BountyStatus::Approved => "approved",
            BountyStatus::Rejected => "rejected",
            BountyStatus::PartiallyPaid => "partially_paid",
            BountyStatus::Paid => "paid",
            BountyStatus::Closed => "closed",
        };
        f.write_str(s)
    }
}

impl BountyEvent {
    /// Closure reason carried by events that end in `Closed`
    pub fn closure_reason(&self) -> Option<ClosureReason> {
        match self {
            BountyEvent::Close => Some(ClosureReason::Completed),
            BountyEvent::Cancel => Some(ClosureReason::Cancelled),
            BountyEvent::Revoke { reason } => Some(ClosureReason::Revoked {
                reason: reason.clone(),
            }),
            BountyEvent::Abandon(reason) => Some(ClosureReason::Abandoned(reason.clone())),
            _ => None,
        }
    }
}
