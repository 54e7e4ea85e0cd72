use crate::arbitrator::ClaimArbitrator;
use crate::clock::{Clock, TimelineAnchor};
use crate::config::EngineConfig;
use crate::error::{BountyError, Result};
use crate::escrow::PayoutEscrow;
use crate::registry::BountyRegistry;
use crate::scoring::ScoringEngine;
use crate::sweeper;
use crate::transfer::TransferBackend;
use bounty_ledger::{replay, AuditLedger, ReplayedBounty};
use bounty_types::{Bounty, Claim, PayoutRecord, ReviewDecision, Submission};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

/// All pipeline components wired over one ledger, clock and transfer
/// backend.
pub struct BountyEngine {
    pub config: Arc<EngineConfig>,
    pub ledger: Arc<dyn AuditLedger>,
    pub clock: Arc<dyn Clock>,
    pub registry: Arc<BountyRegistry>,
    pub arbitrator: Arc<ClaimArbitrator>,
    pub scoring: Arc<ScoringEngine>,
    pub escrow: Arc<PayoutEscrow>,
}

impl BountyEngine {
    pub fn new(
        config: EngineConfig,
        ledger: Arc<dyn AuditLedger>,
        clock: Arc<dyn Clock>,
        transfers: Arc<dyn TransferBackend>,
    ) -> Result<Self> {
        config.validate()?;
        let config = Arc::new(config);

        let registry = Arc::new(BountyRegistry::new(ledger.clone(), clock.clone()));
        let arbitrator = Arc::new(ClaimArbitrator::new(
            registry.clone(),
            clock.clone(),
            config.clone(),
        ));
        let scoring = Arc::new(ScoringEngine::new(
            registry.clone(),
            arbitrator.clone(),
            clock.clone(),
            config.clone(),
        ));
        let escrow = Arc::new(PayoutEscrow::new(
            registry.clone(),
            scoring.clone(),
            transfers,
            clock.clone(),
            config.clone(),
        ));

        info!(
            staging_threshold = %config.payout.staging_threshold,
            approval_threshold = config.scoring.approval_threshold,
            max_rejections = config.scoring.max_rejections,
            "⚙️ Bounty engine initialized"
        );

        Ok(Self {
            config,
            ledger,
            clock,
            registry,
            arbitrator,
            scoring,
            escrow,
        })
    }

    /// Rebuilds an engine from an existing ledger.
    ///
    /// The ledger is replayed and every bounty, claim, submission, decision
    /// and unresolved payout is reinstalled, so `retry_pending` picks up
    /// payouts left pending before the restart. Monotonic instants from the
    /// previous process are rebased onto `clock` through each record's wall
    /// timestamp.
    pub async fn recover(
        config: EngineConfig,
        ledger: Arc<dyn AuditLedger>,
        clock: Arc<dyn Clock>,
        transfers: Arc<dyn TransferBackend>,
    ) -> Result<Self> {
        let entries = ledger.entries().await.map_err(BountyError::from_ledger)?;
        let state = replay(&entries)?;
        let engine = Self::new(config, ledger, clock, transfers)?;
        let anchor = TimelineAnchor::capture(engine.clock.as_ref());

        let mut bounties = Vec::with_capacity(state.bounties.len());
        let mut claims = Vec::new();
        let mut submissions = Vec::new();
        let mut decisions = Vec::new();
        let mut rejections = Vec::new();
        let mut payouts = Vec::new();

        for replayed in state.bounties.into_values() {
            let ReplayedBounty {
                id,
                title,
                tier,
                reward,
                source_ref,
                created_wall,
                status,
                closure,
                claims: bounty_claims,
                submissions: bounty_submissions,
                decisions: bounty_decisions,
                payouts: confirmed,
                unconfirmed,
                paid,
                rejections: rejected,
            } = replayed;

            bounties.push(Bounty {
                id,
                title,
                tier,
                reward,
                source_ref,
                status,
                paid,
                closure,
                created_at: anchor.mono_at(created_wall),
                created_wall,
            });
            claims.extend(bounty_claims.into_iter().map(|c| rebase_claim(c, &anchor)));
            submissions.extend(bounty_submissions.into_iter().map(|s| rebase_submission(s, &anchor)));
            decisions.extend(bounty_decisions.into_iter().map(|d| rebase_decision(d, &anchor)));
            payouts.extend(
                confirmed
                    .into_iter()
                    .chain(unconfirmed)
                    .map(|p| rebase_payout(p, &anchor)),
            );
            rejections.push((id, rejected));
        }

        let pending = payouts.iter().filter(|p| !p.is_confirmed()).count();
        info!(
            bounties = bounties.len(),
            claims = claims.len(),
            submissions = submissions.len(),
            pending_payouts = pending,
            entries = state.entries,
            head = ?state.head_hash,
            "♻️ Bounty engine recovered from ledger"
        );

        engine.registry.restore(bounties).await;
        engine.arbitrator.restore(claims).await;
        engine.scoring.restore(submissions, decisions, rejections).await;
        engine.escrow.restore(payouts).await;
        Ok(engine)
    }

    pub fn spawn_expiry_sweeper(&self, every: Duration, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        sweeper::spawn_expiry_sweeper(self.arbitrator.clone(), every, shutdown)
    }
}

fn rebase_claim(mut claim: Claim, anchor: &TimelineAnchor) -> Claim {
    let span = claim.expires_at.since(claim.claimed_at);
    claim.claimed_at = anchor.mono_at(claim.claimed_wall);
    claim.expires_at = claim.claimed_at.saturating_add(span);
    claim
}

fn rebase_submission(mut submission: Submission, anchor: &TimelineAnchor) -> Submission {
    submission.submitted_at = anchor.mono_at(submission.submitted_wall);
    submission
}

fn rebase_decision(mut decision: ReviewDecision, anchor: &TimelineAnchor) -> ReviewDecision {
    decision.decided_at = anchor.mono_at(decision.decided_wall);
    decision
}

fn rebase_payout(mut payout: PayoutRecord, anchor: &TimelineAnchor) -> PayoutRecord {
    payout.confirmed_at = payout.disbursed_wall.map(|wall| anchor.mono_at(wall));
    payout.recorded_at = payout.confirmed_at.unwrap_or_else(|| anchor.mono());
    payout
}
