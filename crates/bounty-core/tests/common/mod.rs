#![allow(dead_code)]

use bounty_core::{BountyEngine, EngineConfig, ManualClock, MemoryTransferBackend, ReviewInput};
use bounty_ledger::MemoryAuditLedger;
use bounty_types::{
    AgentId, BountyId, ClaimRequest, DecisionId, DimensionScores, Evidence, NewBounty,
    RewardAmount, Tier, WalletId,
};
use std::sync::Arc;
use std::time::Duration;

pub const CLAIM_SECS: u64 = 3_600;
pub const WINDOW_SECS: u64 = 72 * 3_600;

pub struct Harness {
    pub engine: BountyEngine,
    pub clock: Arc<ManualClock>,
    pub ledger: Arc<MemoryAuditLedger>,
    pub transfers: Arc<MemoryTransferBackend>,
}

pub fn config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.claims.claim_duration_secs = CLAIM_SECS;
    config.payout.stabilization_window_secs = WINDOW_SECS;
    config
}

pub fn harness() -> Harness {
    harness_with(config())
}

pub fn harness_with(config: EngineConfig) -> Harness {
    let clock = Arc::new(ManualClock::new());
    let ledger = Arc::new(MemoryAuditLedger::new());
    let transfers = Arc::new(MemoryTransferBackend::new());
    let engine = BountyEngine::new(config, ledger.clone(), clock.clone(), transfers.clone())
        .expect("valid config");
    Harness {
        engine,
        clock,
        ledger,
        transfers,
    }
}

pub fn request(agent: &str) -> ClaimRequest {
    ClaimRequest::new(
        AgentId::new(agent),
        WalletId::new(format!("{agent}-wallet")),
        "implement and test",
    )
}

pub fn evidence(pr: &str) -> Evidence {
    Evidence::new(pr)
        .with_link("https://ci.example/run/42")
        .with_summary("Implements the feature with tests")
}

pub fn strong() -> DimensionScores {
    DimensionScores::new(4, 4, 4, 3)
}

impl Harness {
    pub fn advance(&self, secs: u64) {
        self.clock.advance(Duration::from_secs(secs));
    }

    pub async fn bounty(&self, reward_rtc: u64) -> BountyId {
        self.engine
            .registry
            .create(NewBounty::new(
                format!("bounty worth {reward_rtc}"),
                Tier::Major,
                RewardAmount::from_rtc(reward_rtc),
            ))
            .await
            .expect("bounty created")
    }

    /// Creates a bounty and drives it to an approved decision
    pub async fn approved(&self, reward_rtc: u64, agent: &str) -> (BountyId, DecisionId) {
        let id = self.bounty(reward_rtc).await;
        let claim = self.engine.arbitrator.claim(id, request(agent)).await.unwrap();
        let sub = self
            .engine
            .scoring
            .submit(claim.id, evidence(&format!("https://github.com/o/r/pull/{}", id.value())), strong())
            .await
            .unwrap();
        let decision = self
            .engine
            .scoring
            .review(sub.id, ReviewInput::new("maintainer", strong()))
            .await
            .unwrap();
        assert!(decision.is_approved());
        (id, decision.id)
    }
}
