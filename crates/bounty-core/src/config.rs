use crate::error::{BountyError, Result};
use bounty_types::{RewardAmount, Tier, DEFAULT_APPROVAL_THRESHOLD};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

const DAY_SECS: u64 = 24 * 60 * 60;
const MAX_TOTAL_SCORE: u8 = 20;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub claims: ClaimConfig,
    pub scoring: ScoringConfig,
    pub payout: PayoutConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClaimConfig {
    /// How long a granted claim stays exclusive
    pub claim_duration_secs: u64,
    pub tier_claim_duration_secs: BTreeMap<Tier, u64>,
}

impl Default for ClaimConfig {
    fn default() -> Self {
        Self {
            claim_duration_secs: 7 * DAY_SECS,
            tier_claim_duration_secs: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Minimum total (out of 20) for approval
    pub approval_threshold: u8,
    /// Rejections after which the bounty is closed as abandoned
    pub max_rejections: u32,
    pub auto_disqualifiers: bool,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            approval_threshold: DEFAULT_APPROVAL_THRESHOLD,
            max_rejections: 3,
            auto_disqualifiers: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PayoutConfig {
    /// Rewards strictly above this are paid in two tranches
    pub staging_threshold: RewardAmount,
    pub first_tranche_percent: u8,
    pub stabilization_window_secs: u64,
    pub tier_stabilization_window_secs: BTreeMap<Tier, u64>,
    pub transfer_timeout_secs: u64,
}

impl Default for PayoutConfig {
    fn default() -> Self {
        Self {
            staging_threshold: RewardAmount::from_rtc(30),
            first_tranche_percent: 60,
            stabilization_window_secs: 3 * DAY_SECS,
            tier_stabilization_window_secs: BTreeMap::new(),
            transfer_timeout_secs: 30,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.claims.claim_duration_secs == 0 {
            return Err(BountyError::Config("claims.claim_duration_secs must be > 0".into()));
        }
        if let Some((tier, _)) = self
            .claims
            .tier_claim_duration_secs
            .iter()
            .find(|(_, secs)| **secs == 0)
        {
            return Err(BountyError::Config(format!(
                "claims.tier_claim_duration_secs.{} must be > 0",
                tier
            )));
        }

        let scoring = &self.scoring;
        if !(DEFAULT_APPROVAL_THRESHOLD..=MAX_TOTAL_SCORE).contains(&scoring.approval_threshold) {
            return Err(BountyError::Config(format!(
                "scoring.approval_threshold must be in {}..={}, got {}",
                DEFAULT_APPROVAL_THRESHOLD, MAX_TOTAL_SCORE, scoring.approval_threshold
            )));
        }
        if scoring.max_rejections == 0 {
            return Err(BountyError::Config("scoring.max_rejections must be > 0".into()));
        }

        let payout = &self.payout;
        if !(1..=99).contains(&payout.first_tranche_percent) {
            return Err(BountyError::Config(format!(
                "payout.first_tranche_percent must be in 1..=99, got {}",
                payout.first_tranche_percent
            )));
        }
        if payout.stabilization_window_secs == 0
            || payout.tier_stabilization_window_secs.values().any(|s| *s == 0)
        {
            return Err(BountyError::Config(
                "payout stabilization windows must be > 0".into(),
            ));
        }
        if payout.transfer_timeout_secs == 0 {
            return Err(BountyError::Config("payout.transfer_timeout_secs must be > 0".into()));
        }

        Ok(())
    }

    pub fn claim_duration(&self, tier: Tier) -> Duration {
        let secs = self
            .claims
            .tier_claim_duration_secs
            .get(&tier)
            .copied()
            .unwrap_or(self.claims.claim_duration_secs);
        Duration::from_secs(secs)
    }

    pub fn stabilization_window(&self, tier: Tier) -> Duration {
        let secs = self
            .payout
            .tier_stabilization_window_secs
            .get(&tier)
            .copied()
            .unwrap_or(self.payout.stabilization_window_secs);
        Duration::from_secs(secs)
    }

    pub fn transfer_timeout(&self) -> Duration {
        Duration::from_secs(self.payout.transfer_timeout_secs)
    }

    pub fn is_staged(&self, reward: RewardAmount) -> bool {
        reward > self.payout.staging_threshold
    }

    /// (first, second) tranche amounts; second absorbs the rounding
    pub fn tranche_split(&self, reward: RewardAmount) -> (RewardAmount, RewardAmount) {
        let first = reward.percent(self.payout.first_tranche_percent);
        (first, reward.saturating_sub(first))
    }
}
