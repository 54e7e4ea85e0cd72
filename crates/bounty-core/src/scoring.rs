//! Submission intake and review decisions.
//!
//! A reviewer (human or automated) supplies the four dimension scores and
//! any disqualifiers. The engine adds its own disqualifier checks, applies
//! the decision rule, and moves the bounty to `Approved`, back to `Open`, or
//! to `Closed` once the rejection limit is reached.

use crate::arbitrator::ClaimArbitrator;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{BountyError, Result};
use crate::registry::{BountyRegistry, ChangeSet};
use bounty_ledger::LedgerEvent;
use bounty_types::{
    decide_outcome, AbandonReason, BountyEvent, BountyId, BountyStatus, ClaimId, DecisionId,
    DimensionScores, Disqualifier, Evidence, ReviewDecision, ReviewOutcome, Submission,
    SubmissionId,
};
use chrono::Utc;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Markers left behind when a submission template is not filled in
const TEMPLATE_MARKERS: &[&str] = &[
    "{{",
    "}}",
    "<insert",
    "[insert",
    "<your",
    "[your",
    "lorem ipsum",
    "todo: describe",
];

/// Reviewer-supplied half of a decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewInput {
    pub reviewer: String,
    pub scores: DimensionScores,
    pub disqualifiers: BTreeSet<Disqualifier>,
    pub notes: Option<String>,
}

impl ReviewInput {
    pub fn new(reviewer: impl Into<String>, scores: DimensionScores) -> Self {
        Self {
            reviewer: reviewer.into(),
            scores,
            disqualifiers: BTreeSet::new(),
            notes: None,
        }
    }

    pub fn with_disqualifier(mut self, disqualifier: Disqualifier) -> Self {
        self.disqualifiers.insert(disqualifier);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

/// True when the summary is blank or still carries template placeholders
pub fn looks_templated(summary: &str) -> bool {
    let lower = summary.to_lowercase();
    lower.trim().is_empty() || TEMPLATE_MARKERS.iter().any(|m| lower.contains(m))
}

pub struct ScoringEngine {
    registry: Arc<BountyRegistry>,
    arbitrator: Arc<ClaimArbitrator>,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
    submissions: RwLock<HashMap<SubmissionId, Submission>>,
    decisions: RwLock<HashMap<DecisionId, ReviewDecision>>,
    rejections: RwLock<HashMap<BountyId, u32>>,
    next_submission: AtomicU64,
    next_decision: AtomicU64,
}

impl ScoringEngine {
    pub fn new(
        registry: Arc<BountyRegistry>,
        arbitrator: Arc<ClaimArbitrator>,
        clock: Arc<dyn Clock>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            registry,
            arbitrator,
            clock,
            config,
            submissions: RwLock::new(HashMap::new()),
            decisions: RwLock::new(HashMap::new()),
            rejections: RwLock::new(HashMap::new()),
            next_submission: AtomicU64::new(1),
            next_decision: AtomicU64::new(1),
        }
    }

    /// Converts a live claim into a submission. Fails with `ClaimExpired`
    /// if the claim's deadline has passed, even if no sweep has run yet.
    pub async fn submit(
        &self,
        claim_id: ClaimId,
        evidence: Evidence,
        self_scores: DimensionScores,
    ) -> Result<Submission> {
        let bounty_id = self.arbitrator.lookup(claim_id).await?.bounty_id;
        let mut guard = self.registry.lock(bounty_id).await?;
        let claim = self.arbitrator.live_claim(&mut guard, claim_id).await?;

        let submission = Submission {
            id: SubmissionId::new(self.next_submission.fetch_add(1, Ordering::SeqCst)),
            bounty_id,
            claim_id,
            agent: claim.agent,
            wallet: claim.wallet,
            fingerprint: evidence.fingerprint(),
            evidence,
            self_scores: self_scores.clamped(),
            submitted_at: self.clock.now(),
            submitted_wall: Utc::now(),
            decision: None,
        };

        guard
            .commit(
                ChangeSet::record(LedgerEvent::SubmissionReceived {
                    submission: submission.clone(),
                })
                .with_transition(BountyEvent::Submit),
            )
            .await?;

        self.submissions
            .write()
            .await
            .insert(submission.id, submission.clone());
        self.arbitrator.mark_converted(claim_id).await;

        info!(
            bounty_id = %bounty_id,
            submission_id = %submission.id,
            agent = %submission.agent,
            pr = %submission.evidence.pr_reference,
            self_total = submission.self_scores.total(),
            "📨 Submission received"
        );

        Ok(submission)
    }

    /// Marks a submission as picked up by a reviewer
    pub async fn start_review(&self, submission_id: SubmissionId) -> Result<Submission> {
        let submission = self.get_submission(submission_id).await?;
        let mut guard = self.registry.lock(submission.bounty_id).await?;
        if submission.decision.is_some() {
            return Err(BountyError::SubmissionAlreadyReviewed(submission_id));
        }
        guard.apply(BountyEvent::StartReview).await?;
        Ok(submission)
    }

    /// Records the decision for a submission. The reviewer's disqualifiers
    /// are unioned with the engine's own checks before the rule is applied.
    pub async fn review(&self, submission_id: SubmissionId, input: ReviewInput) -> Result<ReviewDecision> {
        let bounty_id = self.get_submission(submission_id).await?.bounty_id;
        let mut guard = self.registry.lock(bounty_id).await?;
        let submission = self.get_submission(submission_id).await?;
        if submission.decision.is_some() {
            return Err(BountyError::SubmissionAlreadyReviewed(submission_id));
        }

        let mut disqualifiers = input.disqualifiers;
        if self.config.scoring.auto_disqualifiers {
            disqualifiers.extend(self.detect_disqualifiers(&submission).await);
        }

        let scores = input.scores.clamped();
        let threshold = self.config.scoring.approval_threshold;
        let outcome = Self::decide(&scores, &disqualifiers, threshold);

        let decision = ReviewDecision {
            id: DecisionId::new(self.next_decision.fetch_add(1, Ordering::SeqCst)),
            submission_id,
            bounty_id,
            reviewer: input.reviewer,
            scores,
            total: scores.total(),
            disqualifiers,
            outcome,
            approval_threshold: threshold,
            notes: input.notes,
            decided_at: self.clock.now(),
            decided_wall: Utc::now(),
        };

        let mut change = ChangeSet::record(LedgerEvent::ReviewDecided {
            decision: decision.clone(),
        });
        if guard.status() == BountyStatus::Submitted {
            change = change.with_transition(BountyEvent::StartReview);
        }

        let rejections = self.rejection_count(bounty_id).await;
        let rejections_after = match outcome {
            ReviewOutcome::Approved => {
                change = change.with_transition(BountyEvent::Approve);
                rejections
            }
            ReviewOutcome::Rejected => {
                let count = rejections + 1;
                change = change.with_transition(BountyEvent::Reject);
                change = if count >= self.config.scoring.max_rejections {
                    change.with_transition(BountyEvent::Abandon(AbandonReason::RejectionLimit {
                        rejections: count,
                    }))
                } else {
                    change.with_transition(BountyEvent::Reopen)
                };
                count
            }
        };

        let status = guard.commit(change).await?;

        self.decisions
            .write()
            .await
            .insert(decision.id, decision.clone());
        if let Some(sub) = self.submissions.write().await.get_mut(&submission_id) {
            sub.decision = Some(decision.id);
        }
        self.rejections
            .write()
            .await
            .insert(bounty_id, rejections_after);

        info!(
            bounty_id = %bounty_id,
            submission_id = %submission_id,
            decision_id = %decision.id,
            reviewer = %decision.reviewer,
            total = decision.total,
            correctness = decision.scores.correctness,
            disqualifiers = ?decision.disqualifiers,
            outcome = ?outcome,
            status = %status,
            "⚖️ Review decided"
        );

        Ok(decision)
    }

    /// The decision rule, independent of any stored state
    pub fn decide(
        scores: &DimensionScores,
        disqualifiers: &BTreeSet<Disqualifier>,
        approval_threshold: u8,
    ) -> ReviewOutcome {
        decide_outcome(scores, disqualifiers, approval_threshold)
    }

    async fn detect_disqualifiers(&self, submission: &Submission) -> BTreeSet<Disqualifier> {
        let mut found = BTreeSet::new();
        let evidence = &submission.evidence;

        if evidence.pr_reference.trim().is_empty() || !evidence.has_links() {
            found.insert(Disqualifier::MissingEvidence);
        }
        if looks_templated(&evidence.summary) {
            found.insert(Disqualifier::TemplatedContent);
        }

        let pr = evidence.normalized_pr();
        let submissions = self.submissions.read().await;
        let decisions = self.decisions.read().await;

        for other in submissions.values().filter(|o| o.id != submission.id) {
            // only an earlier submission makes this one the copy
            if !pr.is_empty()
                && other.id < submission.id
                && other.agent != submission.agent
                && other.evidence.normalized_pr() == pr
            {
                found.insert(Disqualifier::DuplicateSubmission);
            }

            let rejected_before = other
                .decision
                .and_then(|d| decisions.get(&d))
                .is_some_and(|d| d.outcome == ReviewOutcome::Rejected);
            if rejected_before
                && other.bounty_id == submission.bounty_id
                && other.agent == submission.agent
                && other.fingerprint == submission.fingerprint
            {
                found.insert(Disqualifier::RepeatedLowEffort);
            }
        }

        if !found.is_empty() {
            debug!(
                submission_id = %submission.id,
                found = ?found,
                "Automatic disqualifiers detected"
            );
        }
        found
    }

    pub(crate) async fn restore(
        &self,
        restored_submissions: Vec<Submission>,
        restored_decisions: Vec<ReviewDecision>,
        rejection_counts: Vec<(BountyId, u32)>,
    ) {
        let mut submissions = self.submissions.write().await;
        let mut next = self.next_submission.load(Ordering::SeqCst);
        for submission in restored_submissions {
            next = next.max(submission.id.value() + 1);
            submissions.insert(submission.id, submission);
        }
        self.next_submission.store(next, Ordering::SeqCst);

        let mut decisions = self.decisions.write().await;
        let mut next = self.next_decision.load(Ordering::SeqCst);
        for decision in restored_decisions {
            next = next.max(decision.id.value() + 1);
            decisions.insert(decision.id, decision);
        }
        self.next_decision.store(next, Ordering::SeqCst);

        let mut rejections = self.rejections.write().await;
        rejections.extend(rejection_counts.into_iter().filter(|(_, n)| *n > 0));
    }

    pub async fn get_submission(&self, submission_id: SubmissionId) -> Result<Submission> {
        self.submissions
            .read()
            .await
            .get(&submission_id)
            .cloned()
            .ok_or(BountyError::SubmissionNotFound(submission_id))
    }

    pub async fn get_decision(&self, decision_id: DecisionId) -> Result<ReviewDecision> {
        self.decisions
            .read()
            .await
            .get(&decision_id)
            .cloned()
            .ok_or(BountyError::DecisionNotFound(decision_id))
    }

    pub async fn submissions_for(&self, bounty_id: BountyId) -> Vec<Submission> {
        let mut out: Vec<Submission> = self
            .submissions
            .read()
            .await
            .values()
            .filter(|s| s.bounty_id == bounty_id)
            .cloned()
            .collect();
        out.sort_by_key(|s| s.id);
        out
    }

    pub async fn rejection_count(&self, bounty_id: BountyId) -> u32 {
        self.rejections
            .read()
            .await
            .get(&bounty_id)
            .copied()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use bounty_ledger::MemoryAuditLedger;
    use bounty_types::{AgentId, ClaimRequest, ClosureReason, NewBounty, RewardAmount, Tier, WalletId};
    use std::time::Duration;

    struct Fixture {
        clock: Arc<ManualClock>,
        registry: Arc<BountyRegistry>,
        arbitrator: Arc<ClaimArbitrator>,
        scoring: ScoringEngine,
    }

    fn fixture(max_rejections: u32) -> Fixture {
        let ledger = Arc::new(MemoryAuditLedger::new());
        let clock = Arc::new(ManualClock::new());
        let mut config = EngineConfig::default();
        config.claims.claim_duration_secs = 3600;
        config.scoring.max_rejections = max_rejections;
        let config = Arc::new(config);

        let registry = Arc::new(BountyRegistry::new(ledger, clock.clone()));
        let arbitrator = Arc::new(ClaimArbitrator::new(registry.clone(), clock.clone(), config.clone()));
        let scoring = ScoringEngine::new(registry.clone(), arbitrator.clone(), clock.clone(), config);
        Fixture {
            clock,
            registry,
            arbitrator,
            scoring,
        }
    }

    fn evidence(pr: &str) -> Evidence {
        Evidence::new(pr)
            .with_link("https://ci.example/run/1")
            .with_summary("Adds the aarch64 build and a regression test")
    }

    fn good_scores() -> DimensionScores {
        DimensionScores::new(4, 4, 3, 3)
    }

    async fn claimed(f: &Fixture, agent: &str) -> (BountyId, ClaimId) {
        let id = f
            .registry
            .create(NewBounty::new("Port miner", Tier::Standard, RewardAmount::from_rtc(20)))
            .await
            .unwrap();
        let claim = f
            .arbitrator
            .claim(id, ClaimRequest::new(AgentId::new(agent), WalletId::new("w-123"), "plan"))
            .await
            .unwrap();
        (id, claim.id)
    }

    async fn reclaim(f: &Fixture, id: BountyId, agent: &str) -> ClaimId {
        f.arbitrator
            .claim(id, ClaimRequest::new(AgentId::new(agent), WalletId::new("w-123"), "plan"))
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_approval_path() {
        let f = fixture(3);
        let (id, claim_id) = claimed(&f, "alice").await;

        let sub = f.scoring.submit(claim_id, evidence("o/r#1"), good_scores()).await.unwrap();
        assert_eq!(f.registry.get(id).await.unwrap().status, BountyStatus::Submitted);
        assert_eq!(f.arbitrator.get(claim_id).await.unwrap().status, bounty_types::ClaimStatus::Converted);

        f.scoring.start_review(sub.id).await.unwrap();
        let decision = f
            .scoring
            .review(sub.id, ReviewInput::new("maintainer", good_scores()))
            .await
            .unwrap();
        assert!(decision.is_approved());
        assert_eq!(decision.total, 14);
        assert_eq!(f.registry.get(id).await.unwrap().status, BountyStatus::Approved);

        assert!(matches!(
            f.scoring.review(sub.id, ReviewInput::new("maintainer", good_scores())).await,
            Err(BountyError::SubmissionAlreadyReviewed(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_after_expiry_rejected() {
        let f = fixture(3);
        let (id, claim_id) = claimed(&f, "alice").await;
        f.clock.advance(Duration::from_secs(3601));

        let err = f
            .scoring
            .submit(claim_id, evidence("o/r#1"), good_scores())
            .await
            .unwrap_err();
        assert!(matches!(err, BountyError::ClaimExpired { .. }));
        assert_eq!(f.registry.get(id).await.unwrap().status, BountyStatus::Open);

        assert!(matches!(
            f.scoring.submit(ClaimId::new(404), evidence("o/r#1"), good_scores()).await,
            Err(BountyError::ClaimNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_reviewer_disqualifier_beats_perfect_score() {
        let f = fixture(3);
        let (id, claim_id) = claimed(&f, "alice").await;
        let sub = f.scoring.submit(claim_id, evidence("o/r#1"), good_scores()).await.unwrap();

        let decision = f
            .scoring
            .review(
                sub.id,
                ReviewInput::new("maintainer", DimensionScores::new(5, 5, 5, 5))
                    .with_disqualifier(Disqualifier::DuplicateSubmission),
            )
            .await
            .unwrap();
        assert_eq!(decision.outcome, ReviewOutcome::Rejected);
        // rejected bounties are claimable again
        assert_eq!(f.registry.get(id).await.unwrap().status, BountyStatus::Open);
        assert_eq!(f.scoring.rejection_count(id).await, 1);
    }

    #[tokio::test]
    async fn test_auto_disqualifiers() {
        let f = fixture(5);
        let (_, claim_id) = claimed(&f, "alice").await;
        let bare = Evidence::new("o/r#9").with_summary("{{describe your change}}");
        let sub = f.scoring.submit(claim_id, bare, good_scores()).await.unwrap();

        let decision = f
            .scoring
            .review(sub.id, ReviewInput::new("bot", DimensionScores::new(5, 5, 5, 5)))
            .await
            .unwrap();
        assert!(decision.disqualifiers.contains(&Disqualifier::MissingEvidence));
        assert!(decision.disqualifiers.contains(&Disqualifier::TemplatedContent));
        assert_eq!(decision.outcome, ReviewOutcome::Rejected);
    }

    #[tokio::test]
    async fn test_same_pr_from_other_agent_is_duplicate() {
        let f = fixture(3);
        let (_, a) = claimed(&f, "alice").await;
        let (_, b) = claimed(&f, "sybil").await;

        f.scoring.submit(a, evidence("https://github.com/o/r/pull/7"), good_scores()).await.unwrap();
        let copy = f
            .scoring
            .submit(b, evidence("https://GitHub.com/o/r/pull/7/"), good_scores())
            .await
            .unwrap();

        let decision = f
            .scoring
            .review(copy.id, ReviewInput::new("bot", good_scores()))
            .await
            .unwrap();
        assert_eq!(
            decision.disqualifiers,
            BTreeSet::from([Disqualifier::DuplicateSubmission])
        );
    }

    #[tokio::test]
    async fn test_original_not_flagged_by_later_copy() {
        let f = fixture(3);
        let (_, a) = claimed(&f, "alice").await;
        let (_, b) = claimed(&f, "copycat").await;

        let original = f
            .scoring
            .submit(a, evidence("https://github.com/o/r/pull/7"), good_scores())
            .await
            .unwrap();
        let copy = f
            .scoring
            .submit(b, evidence("https://github.com/o/r/pull/7"), good_scores())
            .await
            .unwrap();

        // the original is reviewed only after the copy arrived
        let decision = f
            .scoring
            .review(original.id, ReviewInput::new("maintainer", good_scores()))
            .await
            .unwrap();
        assert!(decision.disqualifiers.is_empty());
        assert!(decision.is_approved());

        let copied = f
            .scoring
            .review(copy.id, ReviewInput::new("maintainer", good_scores()))
            .await
            .unwrap();
        assert!(copied.disqualifiers.contains(&Disqualifier::DuplicateSubmission));
        assert_eq!(copied.outcome, ReviewOutcome::Rejected);
    }

    #[tokio::test]
    async fn test_unchanged_resubmission_flagged() {
        let f = fixture(5);
        let (id, claim_id) = claimed(&f, "alice").await;
        let first = f.scoring.submit(claim_id, evidence("o/r#1"), good_scores()).await.unwrap();
        f.scoring
            .review(first.id, ReviewInput::new("bot", DimensionScores::new(1, 1, 1, 1)))
            .await
            .unwrap();

        let again = reclaim(&f, id, "alice").await;
        let second = f.scoring.submit(again, evidence("o/r#1"), good_scores()).await.unwrap();
        let decision = f
            .scoring
            .review(second.id, ReviewInput::new("bot", DimensionScores::new(5, 5, 5, 5)))
            .await
            .unwrap();
        assert!(decision.disqualifiers.contains(&Disqualifier::RepeatedLowEffort));
        assert!(!decision.disqualifiers.contains(&Disqualifier::DuplicateSubmission));
    }

    #[tokio::test]
    async fn test_rejection_limit_abandons_bounty() {
        let f = fixture(2);
        let (id, claim_id) = claimed(&f, "alice").await;
        let weak = DimensionScores::new(2, 2, 2, 2);

        let sub = f.scoring.submit(claim_id, evidence("o/r#1"), weak).await.unwrap();
        f.scoring.review(sub.id, ReviewInput::new("bot", weak)).await.unwrap();
        assert_eq!(f.registry.get(id).await.unwrap().status, BountyStatus::Open);

        let claim_id = reclaim(&f, id, "bob").await;
        let sub = f.scoring.submit(claim_id, evidence("o/r#2"), weak).await.unwrap();
        f.scoring.review(sub.id, ReviewInput::new("bot", weak)).await.unwrap();

        let bounty = f.registry.get(id).await.unwrap();
        assert_eq!(bounty.status, BountyStatus::Closed);
        assert_eq!(
            bounty.closure,
            Some(ClosureReason::Abandoned(AbandonReason::RejectionLimit { rejections: 2 }))
        );
        assert!(f
            .arbitrator
            .claim(id, ClaimRequest::new(AgentId::new("carol"), WalletId::new("w-9"), "plan"))
            .await
            .is_err());
    }

    #[test]
    fn test_template_markers() {
        assert!(looks_templated("   "));
        assert!(looks_templated("Fixes <INSERT ISSUE>"));
        assert!(!looks_templated("Adds retry with backoff"));
    }
}
