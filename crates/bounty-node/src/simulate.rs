//! In-process stress run of the whole pipeline.
//!
//! Many agents race for each bounty, the winners submit, an automated
//! reviewer scores, payouts are disbursed on a manual clock, and the ledger
//! is replayed at the end and cross-checked against the live state.

use anyhow::{ensure, Context, Result};
use bounty_core::{
    BountyEngine, BountyError, EngineConfig, ManualClock, MemoryTransferBackend, ReviewInput,
    TransferBackend,
};
use bounty_ledger::{replay, AuditLedger};
use bounty_types::{
    AgentId, BountyId, BountyStatus, ClaimRequest, DimensionScores, Evidence, NewBounty,
    RewardAmount, Tier, WalletId,
};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationParams {
    pub agents: usize,
    pub bounties: usize,
    pub reward: RewardAmount,
    /// Every n-th bounty's submission is scored below the threshold; 0
    /// disables rejections
    pub reject_every: usize,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            agents: 10,
            bounties: 5,
            reward: RewardAmount::from_rtc(50),
            reject_every: 5,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SimulationReport {
    pub bounties: usize,
    pub claim_attempts: usize,
    pub claims_won: usize,
    pub claims_lost: usize,
    pub approved: usize,
    pub rejected: usize,
    pub staged: usize,
    pub closed: usize,
    pub total_paid: RewardAmount,
    pub ledger_entries: usize,
    pub head_hash: String,
}

fn agent_wallet(agent: &AgentId) -> WalletId {
    WalletId::new(format!("RTC-{}", agent.as_str()))
}

async fn race_for_claim(
    engine: &BountyEngine,
    bounty_id: BountyId,
    agents: usize,
) -> Result<(bounty_types::Claim, usize)> {
    let mut racers = JoinSet::new();
    for n in 0..agents {
        let arbitrator = Arc::clone(&engine.arbitrator);
        racers.spawn(async move {
            let agent = AgentId::new(format!("agent-{n}"));
            let request = ClaimRequest::new(agent.clone(), agent_wallet(&agent), "simulated plan");
            arbitrator.claim(bounty_id, request).await
        });
    }

    let mut winners = Vec::new();
    let mut lost = 0;
    while let Some(joined) = racers.join_next().await {
        match joined.context("claim task panicked")? {
            Ok(claim) => winners.push(claim),
            Err(BountyError::AlreadyClaimed { .. }) => lost += 1,
            Err(e) => return Err(e).context("unexpected claim failure"),
        }
    }

    ensure!(
        winners.len() == 1,
        "{} agents won the claim on {}",
        winners.len(),
        bounty_id
    );
    let winner = winners.remove(0);
    Ok((winner, lost))
}

/// Drives `params.bounties` bounties through the pipeline
pub async fn run(
    config: EngineConfig,
    params: SimulationParams,
    ledger: Arc<dyn AuditLedger>,
) -> Result<SimulationReport> {
    ensure!(params.agents > 0, "at least one agent is required");

    let clock = Arc::new(ManualClock::new());
    let transfers = Arc::new(MemoryTransferBackend::new());
    let engine = BountyEngine::new(config, ledger.clone(), clock.clone(), transfers.clone())?;
    let mut report = SimulationReport {
        bounties: params.bounties,
        ..Default::default()
    };

    info!(
        agents = params.agents,
        bounties = params.bounties,
        reward = %params.reward,
        "🏁 Simulation started"
    );

    let mut wallets = HashSet::new();
    for i in 0..params.bounties {
        let tier = Tier::ALL[i % Tier::ALL.len()];
        let bounty_id = engine
            .registry
            .create(NewBounty::new(format!("simulated bounty {i}"), tier, params.reward))
            .await?;

        let (claim, lost) = race_for_claim(&engine, bounty_id, params.agents).await?;
        report.claim_attempts += params.agents;
        report.claims_won += 1;
        report.claims_lost += lost;

        let evidence = Evidence::new(format!(
            "https://github.com/rustchain/bounties/pull/{}",
            bounty_id.value()
        ))
        .with_link(format!("https://ci.rustchain.dev/runs/{}", bounty_id.value()))
        .with_summary(format!("Implements {} with tests", bounty_id));
        let submission = engine
            .scoring
            .submit(claim.id, evidence, DimensionScores::new(4, 4, 3, 3))
            .await?;

        let weak = params.reject_every > 0 && (i + 1) % params.reject_every == 0;
        let scores = if weak {
            DimensionScores::new(2, 1, 2, 2)
        } else {
            DimensionScores::new(4, 4, 4, 3)
        };
        let decision = engine
            .scoring
            .review(submission.id, ReviewInput::new("sim-reviewer", scores))
            .await?;
        if !decision.is_approved() {
            report.rejected += 1;
            debug!(bounty_id = %bounty_id, total = decision.total, "Simulated rejection");
            continue;
        }
        report.approved += 1;
        wallets.insert(claim.wallet.clone());

        if engine.config.is_staged(params.reward) {
            report.staged += 1;
            engine.escrow.disburse_first_tranche(decision.id).await?;
            clock.advance(engine.config.stabilization_window(tier));
            engine.escrow.disburse_second_tranche(decision.id).await?;
        } else {
            engine.escrow.disburse(decision.id).await?;
        }
        engine.registry.close(bounty_id).await?;
        report.closed += 1;
    }

    let live: Vec<_> = engine.registry.list().await;
    let live_paid: RewardAmount = live.iter().map(|b| b.paid).sum();
    let mut wallet_total = RewardAmount::ZERO;
    for wallet in &wallets {
        wallet_total = wallet_total.saturating_add(transfers.balance(wallet).await?);
    }

    let entries = ledger.entries().await?;
    let replayed = replay(&entries).context("ledger replay failed")?;
    ensure!(
        replayed.total_paid() == live_paid,
        "replayed payouts {} differ from live total {}",
        replayed.total_paid(),
        live_paid
    );
    ensure!(
        wallet_total == live_paid,
        "wallets received {} but {} was recorded",
        wallet_total,
        live_paid
    );
    for bounty in &live {
        let status = replayed.get(bounty.id).map(|b| b.status);
        ensure!(
            status == Some(bounty.status),
            "{} replays to {:?} but is {}",
            bounty.id,
            status,
            bounty.status
        );
    }
    ensure!(
        replayed.count_in(BountyStatus::Closed) == report.closed,
        "closed count mismatch"
    );

    report.total_paid = live_paid;
    report.ledger_entries = entries.len();
    report.head_hash = ledger.head_hash().await;

    info!(
        approved = report.approved,
        rejected = report.rejected,
        total_paid = %report.total_paid,
        ledger_entries = report.ledger_entries,
        "✅ Simulation complete, ledger replay matches"
    );
    Ok(report)
}
