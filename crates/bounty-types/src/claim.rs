use crate::id::{AgentId, BountyId, ClaimId, WalletId};
use crate::time::MonoTime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Active,
    Expired,
    Withdrawn,
    /// Consumed by a submission
    Converted,
}

/// Validated claim input (see the claim comment parser)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRequest {
    pub agent: AgentId,
    pub wallet: WalletId,
    pub approach: String,
}

impl ClaimRequest {
    pub fn new(agent: AgentId, wallet: WalletId, approach: impl Into<String>) -> Self {
        Self {
            agent,
            wallet,
            approach: approach.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claim {
    pub id: ClaimId,
    pub bounty_id: BountyId,
    pub agent: AgentId,
    pub wallet: WalletId,
    pub approach: String,
    pub claimed_at: MonoTime,
    pub expires_at: MonoTime,
    pub claimed_wall: DateTime<Utc>,
    pub status: ClaimStatus,
}

impl Claim {
    /// A claim is live while it is `Active` and `now` has not passed its
    /// expiry. The expiry instant itself is still inside the claim.
    pub fn is_live(&self, now: MonoTime) -> bool {
        self.status == ClaimStatus::Active && now <= self.expires_at
    }

    pub fn is_overdue(&self, now: MonoTime) -> bool {
        self.status == ClaimStatus::Active && now > self.expires_at
    }
}
