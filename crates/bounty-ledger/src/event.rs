use bounty_types::{
    AgentId, BountyEvent, BountyStatus, Claim, ClaimId, ClosureReason, DecisionId, PayoutRecord,
    ReviewDecision, RewardAmount, Submission, Tier, Tranche,
};
use serde::{Deserialize, Serialize};

/// One audited fact about a bounty. Records are embedded whole so the
/// ledger alone is enough to rebuild every bounty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerEvent {
    BountyCreated {
        title: String,
        tier: Tier,
        reward: RewardAmount,
        source_ref: Option<String>,
    },
    Transition {
        from: BountyStatus,
        to: BountyStatus,
        event: BountyEvent,
    },
    ClaimGranted {
        claim: Claim,
    },
    ClaimExpired {
        claim_id: ClaimId,
        agent: AgentId,
    },
    ClaimWithdrawn {
        claim_id: ClaimId,
        agent: AgentId,
    },
    SubmissionReceived {
        submission: Submission,
    },
    ReviewDecided {
        decision: ReviewDecision,
    },
    /// Written before the transfer call
    PayoutPending {
        payout: PayoutRecord,
    },
    PayoutConfirmed {
        payout: PayoutRecord,
    },
    PayoutFailed {
        decision_id: DecisionId,
        tranche: Tranche,
        idempotency_key: String,
        error: String,
        permanent: bool,
    },
    BountyClosed {
        reason: ClosureReason,
    },
}

impl LedgerEvent {
    pub fn transition(from: BountyStatus, to: BountyStatus, event: BountyEvent) -> Self {
        LedgerEvent::Transition { from, to, event }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LedgerEvent::BountyCreated { .. } => "bounty_created",
            LedgerEvent::Transition { .. } => "transition",
            LedgerEvent::ClaimGranted { .. } => "claim_granted",
            LedgerEvent::ClaimExpired { .. } => "claim_expired",
            LedgerEvent::ClaimWithdrawn { .. } => "claim_withdrawn",
            LedgerEvent::SubmissionReceived { .. } => "submission_received",
            LedgerEvent::ReviewDecided { .. } => "review_decided",
            LedgerEvent::PayoutPending { .. } => "payout_pending",
            LedgerEvent::PayoutConfirmed { .. } => "payout_confirmed",
            LedgerEvent::PayoutFailed { .. } => "payout_failed",
            LedgerEvent::BountyClosed { .. } => "bounty_closed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bounty_types::AbandonReason;

    #[test]
    fn test_event_json_shape() {
        let event = LedgerEvent::transition(
            BountyStatus::Rejected,
            BountyStatus::Closed,
            BountyEvent::Abandon(AbandonReason::RejectionLimit { rejections: 3 }),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "transition");
        assert_eq!(json["from"], "rejected");
        assert_eq!(json["to"], "closed");

        let back: LedgerEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
        assert_eq!(back.kind(), "transition");
    }
}
