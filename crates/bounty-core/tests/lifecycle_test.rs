mod common;

use bounty_core::{BountyError, ReviewInput};
use bounty_ledger::{replay, AuditLedger, LedgerEvent};
use bounty_types::{
    AbandonReason, AgentId, BountyEvent, BountyStatus, ClaimStatus, ClosureReason, DimensionScores,
    Disqualifier, ReviewOutcome,
};
use common::{evidence, harness, harness_with, request, strong, CLAIM_SECS};
use std::sync::Arc;

#[tokio::test]
async fn test_claim_expires_and_late_submission_fails() {
    let h = harness();
    let id = h.bounty(20).await;

    let first = h.engine.arbitrator.claim(id, request("a")).await.unwrap();
    h.advance(CLAIM_SECS + 1);

    // another agent claims before any sweep has run
    let second = h.engine.arbitrator.claim(id, request("b")).await.unwrap();
    assert_eq!(second.agent, AgentId::new("b"));
    assert_eq!(h.engine.registry.get(id).await.unwrap().status, BountyStatus::Claimed);

    let err = h
        .engine
        .scoring
        .submit(first.id, evidence("https://github.com/o/r/pull/1"), strong())
        .await
        .unwrap_err();
    assert!(matches!(err, BountyError::ClaimExpired { .. }));
    assert_eq!(
        h.engine.arbitrator.get(first.id).await.unwrap().status,
        ClaimStatus::Expired
    );

    let sub = h
        .engine
        .scoring
        .submit(second.id, evidence("https://github.com/o/r/pull/2"), strong())
        .await
        .unwrap();
    assert_eq!(sub.agent, AgentId::new("b"));
    assert_eq!(h.engine.registry.get(id).await.unwrap().status, BountyStatus::Submitted);
}

#[tokio::test]
async fn test_submission_at_deadline_is_accepted() {
    let h = harness();
    let id = h.bounty(20).await;
    let claim = h.engine.arbitrator.claim(id, request("a")).await.unwrap();

    h.advance(CLAIM_SECS);
    h.engine
        .scoring
        .submit(claim.id, evidence("https://github.com/o/r/pull/9"), strong())
        .await
        .unwrap();
    assert_eq!(
        h.engine.arbitrator.get(claim.id).await.unwrap().status,
        ClaimStatus::Converted
    );
}

#[tokio::test]
async fn test_concurrent_claims_single_winner() {
    let h = harness();
    let id = h.bounty(20).await;
    let arbitrator = h.engine.arbitrator.clone();

    let a = {
        let arbitrator = arbitrator.clone();
        tokio::spawn(async move { arbitrator.claim(id, request("a")).await })
    };
    let b = {
        let arbitrator = arbitrator.clone();
        tokio::spawn(async move { arbitrator.claim(id, request("b")).await })
    };
    let results = [a.await.unwrap(), b.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .all(|e| matches!(e, BountyError::AlreadyClaimed { .. })));

    let claimed = h
        .ledger
        .entries()
        .await
        .unwrap()
        .into_iter()
        .filter(|e| {
            matches!(
                &e.event,
                LedgerEvent::Transition {
                    event: BountyEvent::Claim,
                    ..
                }
            )
        })
        .count();
    assert_eq!(claimed, 1);
}

#[tokio::test]
async fn test_duplicate_claim_by_holder() {
    let h = harness();
    let id = h.bounty(20).await;
    let claim = h.engine.arbitrator.claim(id, request("a")).await.unwrap();

    match h.engine.arbitrator.claim(id, request("@A")).await {
        Err(BountyError::DuplicateAgentClaim { claim_id, .. }) => assert_eq!(claim_id, claim.id),
        other => panic!("expected DuplicateAgentClaim, got {other:?}"),
    }
}

#[tokio::test]
async fn test_withdraw_frees_bounty() {
    let h = harness();
    let id = h.bounty(20).await;
    let claim = h.engine.arbitrator.claim(id, request("a")).await.unwrap();

    assert!(matches!(
        h.engine.arbitrator.withdraw(claim.id, &AgentId::new("b")).await,
        Err(BountyError::NotClaimant { .. })
    ));
    let withdrawn = h.engine.arbitrator.withdraw(claim.id, &AgentId::new("a")).await.unwrap();
    assert_eq!(withdrawn.status, ClaimStatus::Withdrawn);
    assert_eq!(h.engine.registry.get(id).await.unwrap().status, BountyStatus::Open);

    h.engine.arbitrator.claim(id, request("b")).await.unwrap();
}

#[tokio::test]
async fn test_claim_from_comment() {
    let h = harness();
    let id = h.bounty(20).await;
    let comment = "## Bounty Claim: #1\n\n**Claimant:** @Dev-One\n**Wallet:** dev_one\n\n\
                   ### Implementation Plan\nPort the hashing loop.\n";

    let claim = h.engine.arbitrator.claim_from_comment(id, comment).await.unwrap();
    assert_eq!(claim.agent, AgentId::new("dev-one"));
    assert_eq!(claim.approach, "Port the hashing loop.");

    assert!(matches!(
        h.engine.arbitrator.claim_from_comment(id, "I'd like this one").await,
        Err(BountyError::InvalidClaimFormat(_))
    ));
}

#[tokio::test]
async fn test_rejection_reopens_until_limit() {
    let mut config = common::config();
    config.scoring.max_rejections = 2;
    let h = harness_with(config);
    let id = h.bounty(20).await;
    let weak = DimensionScores::new(2, 2, 2, 2);

    for (round, agent) in ["a", "b"].into_iter().enumerate() {
        let claim = h.engine.arbitrator.claim(id, request(agent)).await.unwrap();
        let sub = h
            .engine
            .scoring
            .submit(claim.id, evidence(&format!("https://github.com/o/r/pull/{round}")), weak)
            .await
            .unwrap();
        let decision = h
            .engine
            .scoring
            .review(sub.id, ReviewInput::new("maintainer", weak))
            .await
            .unwrap();
        assert_eq!(decision.outcome, ReviewOutcome::Rejected);
    }

    let bounty = h.engine.registry.get(id).await.unwrap();
    assert_eq!(bounty.status, BountyStatus::Closed);
    assert_eq!(
        bounty.closure,
        Some(ClosureReason::Abandoned(AbandonReason::RejectionLimit { rejections: 2 }))
    );
    assert_eq!(h.engine.scoring.rejection_count(id).await, 2);
    assert!(matches!(
        h.engine.arbitrator.claim(id, request("c")).await,
        Err(BountyError::BountyClosed(_))
    ));
}

#[tokio::test]
async fn test_disqualifier_overrides_high_score() {
    let h = harness();
    let id = h.bounty(20).await;
    let claim = h.engine.arbitrator.claim(id, request("a")).await.unwrap();
    let sub = h
        .engine
        .scoring
        .submit(claim.id, evidence("https://github.com/o/r/pull/5"), strong())
        .await
        .unwrap();

    let decision = h
        .engine
        .scoring
        .review(
            sub.id,
            ReviewInput::new("maintainer", DimensionScores::new(5, 5, 5, 5))
                .with_disqualifier(Disqualifier::DuplicateSubmission),
        )
        .await
        .unwrap();

    assert_eq!(decision.total, 20);
    assert_eq!(decision.outcome, ReviewOutcome::Rejected);
    assert_eq!(h.engine.registry.get(id).await.unwrap().status, BountyStatus::Open);
    assert!(matches!(
        h.engine.scoring.review(sub.id, ReviewInput::new("maintainer", strong())).await,
        Err(BountyError::SubmissionAlreadyReviewed(_))
    ));
}

#[tokio::test]
async fn test_missing_evidence_is_flagged() {
    let h = harness();
    let id = h.bounty(20).await;
    let claim = h.engine.arbitrator.claim(id, request("a")).await.unwrap();
    let sub = h
        .engine
        .scoring
        .submit(claim.id, bounty_types::Evidence::new(""), strong())
        .await
        .unwrap();

    let decision = h
        .engine
        .scoring
        .review(sub.id, ReviewInput::new("maintainer", strong()))
        .await
        .unwrap();
    assert!(decision.disqualifiers.contains(&Disqualifier::MissingEvidence));
    assert_eq!(decision.outcome, ReviewOutcome::Rejected);
}

#[tokio::test]
async fn test_cancel_only_while_open() {
    let h = harness();
    let open = h.bounty(20).await;
    let claimed = h.bounty(20).await;
    h.engine.arbitrator.claim(claimed, request("a")).await.unwrap();

    let cancelled = h.engine.registry.cancel(open).await.unwrap();
    assert_eq!(cancelled.closure, Some(ClosureReason::Cancelled));
    assert!(matches!(
        h.engine.registry.cancel(claimed).await,
        Err(BountyError::StateConflict { .. })
    ));
}

#[tokio::test]
async fn test_ledger_replay_matches_live_state() {
    let h = harness();
    let (paid_id, decision) = h.approved(20, "a").await;
    h.engine.escrow.disburse(decision).await.unwrap();
    h.engine.registry.close(paid_id).await.unwrap();

    let (staged_id, staged) = h.approved(50, "b").await;
    h.engine.escrow.disburse_first_tranche(staged).await.unwrap();

    let open_id = h.bounty(5).await;
    let claim = h.engine.arbitrator.claim(open_id, request("c")).await.unwrap();
    h.advance(CLAIM_SECS + 1);
    h.engine.arbitrator.expire_claim(claim.id).await.unwrap();

    let state = replay(&h.ledger.entries().await.unwrap()).unwrap();
    assert_eq!(state.head_hash, Some(h.ledger.head_hash().await));
    for bounty in h.engine.registry.list().await {
        let replayed = state.get(bounty.id).unwrap();
        assert_eq!(replayed.status, bounty.status, "{}", bounty.id);
        assert_eq!(replayed.paid, bounty.paid, "{}", bounty.id);
        assert_eq!(replayed.closure, bounty.closure, "{}", bounty.id);
    }
    assert_eq!(state.get(staged_id).unwrap().status, BountyStatus::PartiallyPaid);
    assert_eq!(state.get(open_id).unwrap().status, BountyStatus::Open);
}

#[tokio::test]
async fn test_sweeper_releases_overdue_claims() {
    let h = harness();
    let id = h.bounty(20).await;
    h.engine.arbitrator.claim(id, request("a")).await.unwrap();
    h.advance(CLAIM_SECS + 1);

    let (tx, rx) = tokio::sync::watch::channel(false);
    let handle = h
        .engine
        .spawn_expiry_sweeper(std::time::Duration::from_millis(10), rx);

    let registry = Arc::clone(&h.engine.registry);
    let mut reopened = false;
    for _ in 0..100 {
        if registry.get(id).await.unwrap().status == BountyStatus::Open {
            reopened = true;
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    assert!(reopened);

    tx.send(true).unwrap();
    handle.await.unwrap();
}
