use crate::amount::RewardAmount;
use crate::error::TypesError;
use crate::id::BountyId;
use crate::lifecycle::{BountyStatus, ClosureReason};
use crate::time::MonoTime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Micro,
    Standard,
    Major,
    Critical,
}

impl Tier {
    pub const ALL: [Tier; 4] = [Tier::Micro, Tier::Standard, Tier::Major, Tier::Critical];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Micro => "micro",
            Tier::Standard => "standard",
            Tier::Major => "major",
            Tier::Critical => "critical",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "micro" => Ok(Tier::Micro),
            "standard" => Ok(Tier::Standard),
            "major" => Ok(Tier::Major),
            "critical" => Ok(Tier::Critical),
            other => Err(TypesError::UnknownTier(other.to_string())),
        }
    }
}

/// Input to `create`, as produced by the issue-tracker feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBounty {
    pub title: String,
    pub tier: Tier,
    pub reward: RewardAmount,
    /// Link to the externally hosted issue, stored verbatim
    pub source_ref: Option<String>,
}

impl NewBounty {
    pub fn new(title: impl Into<String>, tier: Tier, reward: RewardAmount) -> Self {
        Self {
            title: title.into(),
            tier,
            reward,
            source_ref: None,
        }
    }

    pub fn with_source(mut self, source_ref: impl Into<String>) -> Self {
        self.source_ref = Some(source_ref.into());
        self
    }
}

/// Registry record. Everything except `status`, `paid` and `closure` is
/// fixed at creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounty {
    pub id: BountyId,
    pub title: String,
    pub tier: Tier,
    pub reward: RewardAmount,
    pub source_ref: Option<String>,
    pub status: BountyStatus,
    pub paid: RewardAmount,
    pub closure: Option<ClosureReason>,
    pub created_at: MonoTime,
    pub created_wall: DateTime<Utc>,
}

impl Bounty {
    pub fn from_new(id: BountyId, new: NewBounty, now: MonoTime) -> Self {
        Self {
            id,
            title: new.title,
            tier: new.tier,
            reward: new.reward,
            source_ref: new.source_ref,
            status: BountyStatus::Open,
            paid: RewardAmount::ZERO,
            closure: None,
            created_at: now,
            created_wall: Utc::now(),
        }
    }

    pub fn remaining(&self) -> RewardAmount {
        self.reward.saturating_sub(self.paid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_parse_and_serde() {
        assert_eq!("Major".parse::<Tier>().unwrap(), Tier::Major);
        assert!("epic".parse::<Tier>().is_err());
        assert_eq!(serde_json::to_string(&Tier::Critical).unwrap(), "\"critical\"");
    }

    #[test]
    fn test_new_bounty_starts_open_and_unpaid() {
        let new = NewBounty::new("Fix miner", Tier::Standard, RewardAmount::from_rtc(25))
            .with_source("https://github.com/rustchain/bounties/issues/7");
        let bounty = Bounty::from_new(BountyId::new(1), new, MonoTime::ZERO);
        assert_eq!(bounty.status, BountyStatus::Open);
        assert_eq!(bounty.paid, RewardAmount::ZERO);
        assert_eq!(bounty.remaining(), RewardAmount::from_rtc(25));
        assert!(bounty.source_ref.is_some());
    }
}
