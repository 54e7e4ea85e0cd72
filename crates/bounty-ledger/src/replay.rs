//! Rebuilds bounty state from the audit ledger alone.
//!
//! Every recorded transition is re-validated against the lifecycle state
//! machine, and confirmed payouts are re-summed against the reward. Any
//! disagreement stops the replay with `ReplayDivergence`.

use crate::entry::{verify_chain, LedgerEntry};
use crate::error::{LedgerError, Result};
use crate::event::LedgerEvent;
use bounty_types::{
    BountyId, BountyStatus, Claim, ClaimStatus, ClosureReason, PayoutRecord, ReviewDecision,
    RewardAmount, Submission, Tier,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplayedBounty {
    pub id: BountyId,
    pub title: String,
    pub tier: Tier,
    pub reward: RewardAmount,
    pub source_ref: Option<String>,
    /// Wall time of the creation entry
    pub created_wall: DateTime<Utc>,
    pub status: BountyStatus,
    pub closure: Option<ClosureReason>,
    pub claims: Vec<Claim>,
    pub submissions: Vec<Submission>,
    pub decisions: Vec<ReviewDecision>,
    /// Confirmed payouts only
    pub payouts: Vec<PayoutRecord>,
    /// Payouts recorded as pending, never confirmed and not permanently
    /// refused
    pub unconfirmed: Vec<PayoutRecord>,
    pub paid: RewardAmount,
    pub rejections: u32,
}

impl ReplayedBounty {
    fn claim_mut(&mut self, seq: u64, claim_id: bounty_types::ClaimId) -> Result<&mut Claim> {
        self.claims
            .iter_mut()
            .find(|c| c.id == claim_id)
            .ok_or_else(|| divergence(seq, format!("unknown {}", claim_id)))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LedgerReplay {
    pub bounties: BTreeMap<BountyId, ReplayedBounty>,
    pub entries: usize,
    pub head_hash: Option<String>,
}

impl LedgerReplay {
    pub fn get(&self, id: BountyId) -> Option<&ReplayedBounty> {
        self.bounties.get(&id)
    }

    pub fn total_paid(&self) -> RewardAmount {
        self.bounties.values().map(|b| b.paid).sum()
    }

    pub fn count_in(&self, status: BountyStatus) -> usize {
        self.bounties.values().filter(|b| b.status == status).count()
    }
}

fn divergence(seq: u64, reason: impl Into<String>) -> LedgerError {
    LedgerError::ReplayDivergence {
        seq,
        reason: reason.into(),
    }
}

/// Verifies the hash chain, then folds every entry into per-bounty state.
pub fn replay(entries: &[LedgerEntry]) -> Result<LedgerReplay> {
    verify_chain(entries)?;

    let mut out = LedgerReplay {
        entries: entries.len(),
        head_hash: entries.last().map(|e| e.hash.clone()),
        ..LedgerReplay::default()
    };
    let mut confirmed_keys: HashSet<String> = HashSet::new();

    for entry in entries {
        let seq = entry.seq;

        if let LedgerEvent::BountyCreated {
            title,
            tier,
            reward,
            source_ref,
        } = &entry.event
        {
            if out.bounties.contains_key(&entry.bounty_id) {
                return Err(divergence(seq, format!("{} created twice", entry.bounty_id)));
            }
            out.bounties.insert(
                entry.bounty_id,
                ReplayedBounty {
                    id: entry.bounty_id,
                    title: title.clone(),
                    tier: *tier,
                    reward: *reward,
                    source_ref: source_ref.clone(),
                    created_wall: entry.recorded_at,
                    status: BountyStatus::Open,
                    closure: None,
                    claims: Vec::new(),
                    submissions: Vec::new(),
                    decisions: Vec::new(),
                    payouts: Vec::new(),
                    unconfirmed: Vec::new(),
                    paid: RewardAmount::ZERO,
                    rejections: 0,
                },
            );
            continue;
        }

        let bounty = out
            .bounties
            .get_mut(&entry.bounty_id)
            .ok_or_else(|| divergence(seq, format!("{} was never created", entry.bounty_id)))?;

        match &entry.event {
            LedgerEvent::BountyCreated { .. } => {}
            LedgerEvent::Transition { from, to, event } => {
                if *from != bounty.status {
                    return Err(divergence(
                        seq,
                        format!("transition from {} but bounty is {}", from, bounty.status),
                    ));
                }
                let next = from
                    .next(event)
                    .map_err(|e| divergence(seq, e.to_string()))?;
                if next != *to {
                    return Err(divergence(
                        seq,
                        format!("{:?} from {} leads to {}, ledger says {}", event, from, next, to),
                    ));
                }
                if *to == BountyStatus::Rejected {
                    bounty.rejections += 1;
                }
                bounty.status = next;
            }
            LedgerEvent::ClaimGranted { claim } => {
                bounty.claims.push(claim.clone());
            }
            LedgerEvent::ClaimExpired { claim_id, .. } => {
                bounty.claim_mut(seq, *claim_id)?.status = ClaimStatus::Expired;
            }
            LedgerEvent::ClaimWithdrawn { claim_id, .. } => {
                bounty.claim_mut(seq, *claim_id)?.status = ClaimStatus::Withdrawn;
            }
            LedgerEvent::SubmissionReceived { submission } => {
                bounty.claim_mut(seq, submission.claim_id)?.status = ClaimStatus::Converted;
                bounty.submissions.push(submission.clone());
            }
            LedgerEvent::ReviewDecided { decision } => {
                if let Some(sub) = bounty
                    .submissions
                    .iter_mut()
                    .find(|s| s.id == decision.submission_id)
                {
                    sub.decision = Some(decision.id);
                } else {
                    return Err(divergence(
                        seq,
                        format!("decision for unknown {}", decision.submission_id),
                    ));
                }
                bounty.decisions.push(decision.clone());
            }
            LedgerEvent::PayoutPending { payout } => {
                if !confirmed_keys.contains(&payout.idempotency_key)
                    && !bounty
                        .unconfirmed
                        .iter()
                        .any(|p| p.idempotency_key == payout.idempotency_key)
                {
                    bounty.unconfirmed.push(payout.clone());
                }
            }
            LedgerEvent::PayoutConfirmed { payout } => {
                if !confirmed_keys.insert(payout.idempotency_key.clone()) {
                    return Err(divergence(
                        seq,
                        format!("payout {} confirmed twice", payout.idempotency_key),
                    ));
                }
                bounty
                    .unconfirmed
                    .retain(|p| p.idempotency_key != payout.idempotency_key);
                bounty.paid = bounty
                    .paid
                    .checked_add(payout.amount)
                    .ok_or_else(|| divergence(seq, "paid total overflow"))?;
                if bounty.paid > bounty.reward {
                    return Err(divergence(
                        seq,
                        format!("paid {} exceeds reward {}", bounty.paid, bounty.reward),
                    ));
                }
                bounty.payouts.push(payout.clone());
            }
            LedgerEvent::PayoutFailed {
                idempotency_key,
                permanent: true,
                ..
            } => {
                bounty
                    .unconfirmed
                    .retain(|p| &p.idempotency_key != idempotency_key);
            }
            LedgerEvent::PayoutFailed { .. } => {}
            LedgerEvent::BountyClosed { reason } => {
                if bounty.status != BountyStatus::Closed {
                    return Err(divergence(seq, "closure recorded before the closing transition"));
                }
                bounty.closure = Some(reason.clone());
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ChainState;
    use bounty_types::BountyEvent;

    fn chain(events: Vec<LedgerEvent>) -> Vec<LedgerEntry> {
        ChainState::new().seal(BountyId::new(1), events).unwrap()
    }

    fn created() -> LedgerEvent {
        LedgerEvent::BountyCreated {
            title: "Add arm64 miner".into(),
            tier: Tier::Major,
            reward: RewardAmount::from_rtc(50),
            source_ref: None,
        }
    }

    #[test]
    fn test_replays_transitions() {
        let entries = chain(vec![
            created(),
            LedgerEvent::transition(BountyStatus::Open, BountyStatus::Claimed, BountyEvent::Claim),
            LedgerEvent::transition(BountyStatus::Claimed, BountyStatus::Open, BountyEvent::Release),
        ]);
        let replay = replay(&entries).unwrap();
        let bounty = replay.get(BountyId::new(1)).unwrap();
        assert_eq!(bounty.status, BountyStatus::Open);
        assert_eq!(replay.entries, 3);
    }

    #[test]
    fn test_illegal_transition_diverges() {
        let entries = chain(vec![
            created(),
            LedgerEvent::transition(BountyStatus::Open, BountyStatus::Paid, BountyEvent::PayFinal),
        ]);
        assert!(matches!(
            replay(&entries),
            Err(LedgerError::ReplayDivergence { seq: 2, .. })
        ));
    }

    #[test]
    fn test_stale_from_state_diverges() {
        let entries = chain(vec![
            created(),
            LedgerEvent::transition(BountyStatus::Claimed, BountyStatus::Submitted, BountyEvent::Submit),
        ]);
        assert!(replay(&entries).is_err());
    }

    #[test]
    fn test_event_for_unknown_bounty_diverges() {
        let entries = chain(vec![LedgerEvent::transition(
            BountyStatus::Open,
            BountyStatus::Claimed,
            BountyEvent::Claim,
        )]);
        assert!(matches!(
            replay(&entries),
            Err(LedgerError::ReplayDivergence { seq: 1, .. })
        ));
    }
}
