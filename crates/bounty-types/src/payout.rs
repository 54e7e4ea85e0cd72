use crate::amount::RewardAmount;
use crate::id::{BountyId, DecisionId, WalletId};
use crate::time::MonoTime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tranche {
    /// Whole reward paid at once (non-staged bounties)
    Single,
    First,
    Second,
}

impl fmt::Display for Tranche {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tranche::Single => "single",
            Tranche::First => "1",
            Tranche::Second => "2",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    /// Recorded before the transfer call; the transfer may or may not have
    /// happened
    Pending,
    /// Transfer reference received
    Confirmed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayoutRecord {
    pub decision_id: DecisionId,
    pub bounty_id: BountyId,
    pub tranche: Tranche,
    pub amount: RewardAmount,
    pub wallet: WalletId,
    pub status: PayoutStatus,
    /// Key handed to the transfer collaborator; identical on every retry
    pub idempotency_key: String,
    pub attempts: u32,
    pub tx_reference: Option<String>,
    pub recorded_at: MonoTime,
    pub confirmed_at: Option<MonoTime>,
    pub disbursed_wall: Option<DateTime<Utc>>,
}

impl PayoutRecord {
    pub fn idempotency_key_for(bounty_id: BountyId, decision_id: DecisionId, tranche: Tranche) -> String {
        format!("{}:{}:tranche-{}", bounty_id, decision_id, tranche)
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == PayoutStatus::Confirmed
    }
}
