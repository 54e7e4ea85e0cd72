use bounty_ledger::LedgerError;
use bounty_types::{
    AgentId, BountyEvent, BountyId, BountyStatus, ClaimId, ClaimStatus, DecisionId, MonoTime,
    RewardAmount, SubmissionId, Tranche, TypesError, WalletId,
};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BountyError>;

#[derive(Debug, Error)]
pub enum BountyError {
    #[error("Bounty not found: {0}")]
    BountyNotFound(BountyId),

    #[error("Claim not found: {0}")]
    ClaimNotFound(ClaimId),

    #[error("Submission not found: {0}")]
    SubmissionNotFound(SubmissionId),

    #[error("Decision not found: {0}")]
    DecisionNotFound(DecisionId),

    #[error("Invalid transition on {bounty_id}: {event:?} not valid in state {from}")]
    InvalidTransition {
        bounty_id: BountyId,
        from: BountyStatus,
        event: BountyEvent,
    },

    #[error("Bounty {bounty_id} is already claimed (state {status})")]
    AlreadyClaimed {
        bounty_id: BountyId,
        status: BountyStatus,
    },

    #[error("Agent {agent} already holds live {claim_id} on {bounty_id}")]
    DuplicateAgentClaim {
        agent: AgentId,
        bounty_id: BountyId,
        claim_id: ClaimId,
    },

    #[error("Claim {claim_id} expired at {expired_at}")]
    ClaimExpired {
        claim_id: ClaimId,
        expired_at: MonoTime,
    },

    #[error("Claim {claim_id} does not expire until {expires_at}")]
    ClaimNotExpired {
        claim_id: ClaimId,
        expires_at: MonoTime,
    },

    #[error("Claim {claim_id} is no longer active ({status:?})")]
    ClaimNotActive {
        claim_id: ClaimId,
        status: ClaimStatus,
    },

    #[error("Agent {agent} does not hold claim {claim_id}")]
    NotClaimant { claim_id: ClaimId, agent: AgentId },

    #[error("Invalid claim format: {0}")]
    InvalidClaimFormat(String),

    #[error("Submission {0} has already been reviewed")]
    SubmissionAlreadyReviewed(SubmissionId),

    #[error("Decision {0} is not an approval")]
    DecisionNotApproved(DecisionId),

    #[error("Tranche {tranche} does not apply to {bounty_id}: {reason}")]
    InvalidTranche {
        bounty_id: BountyId,
        tranche: Tranche,
        reason: String,
    },

    #[error("First tranche of {0} has not been confirmed")]
    FirstTrancheMissing(BountyId),

    #[error("Second tranche of {bounty_id} not eligible until {eligible_at}")]
    NotYetEligible {
        bounty_id: BountyId,
        eligible_at: MonoTime,
    },

    #[error("Payout on {bounty_id} would exceed reward: paid {paid}, requested {requested}, reward {reward}")]
    PayoutCapExceeded {
        bounty_id: BountyId,
        paid: RewardAmount,
        requested: RewardAmount,
        reward: RewardAmount,
    },

    #[error("Transfer for {idempotency_key} is pending: {reason}")]
    DisbursementPending {
        idempotency_key: String,
        reason: String,
    },

    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(String),

    #[error("Wallet {wallet} rejected: {reason}")]
    WalletRejected { wallet: WalletId, reason: String },

    #[error("Bounty {0} is closed")]
    BountyClosed(BountyId),

    #[error("Bounty {bounty_id} changed concurrently: expected {expected}, found {actual}")]
    StateConflict {
        bounty_id: BountyId,
        expected: BountyStatus,
        actual: BountyStatus,
    },

    #[error("Invalid bounty: {0}")]
    InvalidBounty(String),

    #[error("Audit ledger error: {0}")]
    AuditLedger(#[from] LedgerError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl BountyError {
    /// Transient failures where repeating the same call may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            BountyError::DisbursementPending { .. } | BountyError::LedgerUnavailable(_) => true,
            BountyError::AuditLedger(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Lost a race or arrived early; not a fault of the engine
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            BountyError::AlreadyClaimed { .. }
                | BountyError::DuplicateAgentClaim { .. }
                | BountyError::NotYetEligible { .. }
                | BountyError::StateConflict { .. }
        )
    }

    pub(crate) fn from_types(bounty_id: BountyId, err: TypesError) -> Self {
        match err {
            TypesError::InvalidTransition { from, event } => BountyError::InvalidTransition {
                bounty_id,
                from,
                event,
            },
            other => BountyError::InvalidBounty(other.to_string()),
        }
    }

    /// Append failures that may clear up surface as `LedgerUnavailable`
    pub(crate) fn from_ledger(err: LedgerError) -> Self {
        if err.is_transient() {
            BountyError::LedgerUnavailable(err.to_string())
        } else {
            BountyError::AuditLedger(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let pending = BountyError::DisbursementPending {
            idempotency_key: "k".into(),
            reason: "timeout".into(),
        };
        assert!(pending.is_retryable());
        assert!(!pending.is_contention());

        let early = BountyError::NotYetEligible {
            bounty_id: BountyId::new(1),
            eligible_at: MonoTime::from_millis(10),
        };
        assert!(early.is_contention());
        assert!(!early.is_retryable());

        let io = BountyError::from(LedgerError::Unavailable("disk".into()));
        assert!(io.is_retryable());
        let broken = BountyError::from(LedgerError::ChainBroken {
            seq: 1,
            reason: "x".into(),
        });
        assert!(!broken.is_retryable());
    }
}
