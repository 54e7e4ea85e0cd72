//! Reward disbursement.
//!
//! Rewards at or below the staging threshold are paid once. Larger rewards
//! are paid in two tranches: the first on approval, the second once the
//! stabilization window after the first has passed without a revocation.
//!
//! For every tranche a `Pending` record is written to the ledger before the
//! transfer call and a `Confirmed` record only after a transaction reference
//! comes back. A retry after a crash or outage reuses the same idempotency
//! key, so the transfer collaborator never moves funds twice for it.

use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{BountyError, Result};
use crate::registry::{BountyGuard, BountyRegistry, ChangeSet};
use crate::scoring::ScoringEngine;
use crate::transfer::{TransferBackend, TransferError, TransferRequest};
use bounty_ledger::LedgerEvent;
use bounty_types::{
    AbandonReason, BountyEvent, BountyId, BountyStatus, DecisionId, MonoTime, PayoutRecord,
    PayoutStatus, ReviewDecision, RewardAmount, Tranche, WalletId,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub struct PayoutEscrow {
    registry: Arc<BountyRegistry>,
    scoring: Arc<ScoringEngine>,
    transfers: Arc<dyn TransferBackend>,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
    /// Keyed by idempotency key
    payouts: RwLock<HashMap<String, PayoutRecord>>,
}

impl PayoutEscrow {
    pub fn new(
        registry: Arc<BountyRegistry>,
        scoring: Arc<ScoringEngine>,
        transfers: Arc<dyn TransferBackend>,
        clock: Arc<dyn Clock>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            registry,
            scoring,
            transfers,
            clock,
            config,
            payouts: RwLock::new(HashMap::new()),
        }
    }

    /// Pays a non-staged reward in full
    pub async fn disburse(&self, decision_id: DecisionId) -> Result<PayoutRecord> {
        self.pay(decision_id, Tranche::Single).await
    }

    pub async fn disburse_first_tranche(&self, decision_id: DecisionId) -> Result<PayoutRecord> {
        self.pay(decision_id, Tranche::First).await
    }

    pub async fn disburse_second_tranche(&self, decision_id: DecisionId) -> Result<PayoutRecord> {
        self.pay(decision_id, Tranche::Second).await
    }

    /// Upholds a dispute during the stabilization window: the bounty is
    /// closed as revoked and no further tranche is issued. Funds already
    /// confirmed stay paid.
    pub async fn revoke(&self, decision_id: DecisionId, reason: impl Into<String>) -> Result<()> {
        let decision = self.scoring.get_decision(decision_id).await?;
        let mut guard = self.registry.lock(decision.bounty_id).await?;
        let reason = reason.into();

        guard
            .apply(BountyEvent::Revoke {
                reason: reason.clone(),
            })
            .await?;

        warn!(
            bounty_id = %decision.bounty_id,
            decision_id = %decision_id,
            reason = %reason,
            paid = %guard.bounty().paid,
            "🚫 Payout revoked"
        );
        Ok(())
    }

    /// Re-drives every payout left `Pending` by a failed or interrupted
    /// transfer. Returns the records confirmed by this pass.
    pub async fn retry_pending(&self) -> Vec<PayoutRecord> {
        let pending: Vec<PayoutRecord> = self
            .payouts
            .read()
            .await
            .values()
            .filter(|p| p.status == PayoutStatus::Pending)
            .cloned()
            .collect();

        let mut confirmed = Vec::new();
        for record in pending {
            match self.pay(record.decision_id, record.tranche).await {
                Ok(done) => confirmed.push(done),
                Err(e) => warn!(
                    bounty_id = %record.bounty_id,
                    key = %record.idempotency_key,
                    error = %e,
                    "Pending payout still unresolved"
                ),
            }
        }
        confirmed
    }

    /// Installs confirmed and still-pending payouts rebuilt from the ledger
    pub(crate) async fn restore(&self, restored: Vec<PayoutRecord>) {
        let mut payouts = self.payouts.write().await;
        for record in restored {
            payouts.insert(record.idempotency_key.clone(), record);
        }
    }

    pub async fn payouts_for(&self, bounty_id: BountyId) -> Vec<PayoutRecord> {
        let mut out: Vec<PayoutRecord> = self
            .payouts
            .read()
            .await
            .values()
            .filter(|p| p.bounty_id == bounty_id)
            .cloned()
            .collect();
        out.sort_by_key(|p| p.tranche);
        out
    }

    /// Sum of confirmed payouts for a bounty
    pub async fn total_paid(&self, bounty_id: BountyId) -> RewardAmount {
        self.payouts_for(bounty_id)
            .await
            .iter()
            .filter(|p| p.is_confirmed())
            .map(|p| p.amount)
            .sum()
    }

    pub async fn get_balance(&self, wallet: &WalletId) -> Result<RewardAmount> {
        self.transfers
            .balance(wallet)
            .await
            .map_err(|e| BountyError::LedgerUnavailable(e.to_string()))
    }

    /// Earliest instant the second tranche may be paid
    pub async fn second_tranche_eligible_at(&self, bounty_id: BountyId) -> Result<MonoTime> {
        let bounty = self.registry.get(bounty_id).await?;
        let first = self
            .payouts_for(bounty_id)
            .await
            .into_iter()
            .find(|p| p.tranche == Tranche::First && p.is_confirmed())
            .ok_or(BountyError::FirstTrancheMissing(bounty_id))?;
        Ok(self.eligible_at(&first, bounty.tier))
    }

    fn eligible_at(&self, first: &PayoutRecord, tier: bounty_types::Tier) -> MonoTime {
        first
            .confirmed_at
            .unwrap_or(first.recorded_at)
            .saturating_add(self.config.stabilization_window(tier))
    }

    async fn record_for(&self, key: &str) -> Option<PayoutRecord> {
        self.payouts.read().await.get(key).cloned()
    }

    async fn pay(&self, decision_id: DecisionId, tranche: Tranche) -> Result<PayoutRecord> {
        let decision = self.scoring.get_decision(decision_id).await?;
        if !decision.is_approved() {
            return Err(BountyError::DecisionNotApproved(decision_id));
        }

        let bounty_id = decision.bounty_id;
        let mut guard = self.registry.lock(bounty_id).await?;
        let key = PayoutRecord::idempotency_key_for(bounty_id, decision_id, tranche);

        let existing = self.record_for(&key).await;
        if let Some(record) = existing.as_ref().filter(|r| r.is_confirmed()) {
            debug!(bounty_id = %bounty_id, key = %key, "Tranche already paid");
            return Ok(record.clone());
        }

        let amount = self.check_eligible(&guard, &decision, tranche).await?;

        let record = match existing {
            Some(mut pending) => {
                pending.attempts += 1;
                pending
            }
            None => self.record_pending(&mut guard, &decision, tranche, key, amount).await?,
        };
        self.payouts
            .write()
            .await
            .insert(record.idempotency_key.clone(), record.clone());

        let request = TransferRequest {
            idempotency_key: record.idempotency_key.clone(),
            wallet: record.wallet.clone(),
            amount,
            memo: format!("{} tranche {}", bounty_id, tranche),
        };

        let outcome = tokio::time::timeout(self.config.transfer_timeout(), self.transfers.transfer(&request))
            .await
            .unwrap_or_else(|_| Err(TransferError::Unavailable("transfer timed out".into())));

        match outcome {
            Ok(receipt) => {
                let mut confirmed = record;
                confirmed.status = PayoutStatus::Confirmed;
                confirmed.tx_reference = Some(receipt.tx_reference);
                confirmed.confirmed_at = Some(self.clock.now());
                confirmed.disbursed_wall = Some(Utc::now());

                let event = match tranche {
                    Tranche::First => BountyEvent::PayTranche,
                    Tranche::Single | Tranche::Second => BountyEvent::PayFinal,
                };
                guard
                    .commit(
                        ChangeSet::record(LedgerEvent::PayoutConfirmed {
                            payout: confirmed.clone(),
                        })
                        .with_transition(event)
                        .with_paid(amount),
                    )
                    .await?;

                self.payouts
                    .write()
                    .await
                    .insert(confirmed.idempotency_key.clone(), confirmed.clone());

                info!(
                    bounty_id = %bounty_id,
                    tranche = %tranche,
                    amount = %amount,
                    wallet = %confirmed.wallet,
                    tx = ?confirmed.tx_reference,
                    paid = %guard.bounty().paid,
                    "💰 Payout confirmed"
                );
                Ok(confirmed)
            }
            Err(TransferError::Unavailable(reason)) => {
                warn!(
                    bounty_id = %bounty_id,
                    tranche = %tranche,
                    key = %record.idempotency_key,
                    attempts = record.attempts,
                    reason = %reason,
                    "Transfer failed, payout left pending"
                );
                let failure = LedgerEvent::PayoutFailed {
                    decision_id,
                    tranche,
                    idempotency_key: record.idempotency_key.clone(),
                    error: reason.clone(),
                    permanent: false,
                };
                // the pending record is already durable; a failed write
                // here surfaces as the ledger error
                guard.commit(ChangeSet::record(failure)).await?;
                Err(BountyError::DisbursementPending {
                    idempotency_key: record.idempotency_key,
                    reason,
                })
            }
            Err(TransferError::WalletRejected { wallet, reason }) => {
                let failure = LedgerEvent::PayoutFailed {
                    decision_id,
                    tranche,
                    idempotency_key: record.idempotency_key.clone(),
                    error: reason.clone(),
                    permanent: true,
                };
                guard
                    .commit(ChangeSet::record(failure).with_transition(BountyEvent::Abandon(
                        AbandonReason::WalletRejected {
                            wallet: wallet.to_string(),
                            detail: reason.clone(),
                        },
                    )))
                    .await?;
                self.payouts.write().await.remove(&record.idempotency_key);
                Err(BountyError::WalletRejected { wallet, reason })
            }
        }
    }

    /// Amount for `tranche` if it may be paid now
    async fn check_eligible(
        &self,
        guard: &BountyGuard,
        decision: &ReviewDecision,
        tranche: Tranche,
    ) -> Result<RewardAmount> {
        let bounty = guard.bounty();
        let staged = self.config.is_staged(bounty.reward);
        let (first, second) = self.config.tranche_split(bounty.reward);

        let invalid = |reason: &str| BountyError::InvalidTranche {
            bounty_id: bounty.id,
            tranche,
            reason: reason.to_string(),
        };

        let (amount, required) = match (tranche, staged) {
            (Tranche::Single, false) => (bounty.reward, BountyStatus::Approved),
            (Tranche::Single, true) => return Err(invalid("reward is staged in two tranches")),
            (Tranche::First | Tranche::Second, false) => {
                return Err(invalid("reward is paid in a single tranche"))
            }
            (Tranche::First, true) => (first, BountyStatus::Approved),
            (Tranche::Second, true) => {
                let first_key =
                    PayoutRecord::idempotency_key_for(bounty.id, decision.id, Tranche::First);
                let first_record = self
                    .record_for(&first_key)
                    .await
                    .filter(|r| r.is_confirmed())
                    .ok_or(BountyError::FirstTrancheMissing(bounty.id))?;

                let eligible_at = self.eligible_at(&first_record, bounty.tier);
                if self.clock.now() < eligible_at {
                    debug!(
                        bounty_id = %bounty.id,
                        eligible_at = %eligible_at,
                        "Second tranche requested inside stabilization window"
                    );
                    return Err(BountyError::NotYetEligible {
                        bounty_id: bounty.id,
                        eligible_at,
                    });
                }
                (second, BountyStatus::PartiallyPaid)
            }
        };

        if bounty.status == BountyStatus::Closed {
            return Err(BountyError::BountyClosed(bounty.id));
        }
        if bounty.status != required {
            let event = match tranche {
                Tranche::First => BountyEvent::PayTranche,
                _ => BountyEvent::PayFinal,
            };
            return Err(BountyError::InvalidTransition {
                bounty_id: bounty.id,
                from: bounty.status,
                event,
            });
        }

        let total = bounty.paid.checked_add(amount);
        if total.map_or(true, |t| t > bounty.reward) {
            return Err(BountyError::PayoutCapExceeded {
                bounty_id: bounty.id,
                paid: bounty.paid,
                requested: amount,
                reward: bounty.reward,
            });
        }

        Ok(amount)
    }

    async fn record_pending(
        &self,
        guard: &mut BountyGuard,
        decision: &ReviewDecision,
        tranche: Tranche,
        key: String,
        amount: RewardAmount,
    ) -> Result<PayoutRecord> {
        let submission = self.scoring.get_submission(decision.submission_id).await?;
        let record = PayoutRecord {
            decision_id: decision.id,
            bounty_id: decision.bounty_id,
            tranche,
            amount,
            wallet: submission.wallet,
            status: PayoutStatus::Pending,
            idempotency_key: key,
            attempts: 1,
            tx_reference: None,
            recorded_at: self.clock.now(),
            confirmed_at: None,
            disbursed_wall: None,
        };

        guard
            .commit(ChangeSet::record(LedgerEvent::PayoutPending {
                payout: record.clone(),
            }))
            .await?;
        Ok(record)
    }
}
