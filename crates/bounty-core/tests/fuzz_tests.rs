mod common;

use bounty_core::BountyError;
use bounty_ledger::{replay, AuditLedger};
use bounty_types::{RewardAmount, WalletId};
use proptest::prelude::*;
use std::sync::Arc;

#[derive(Debug, Clone)]
enum PayoutOp {
    Disburse,
    FirstTranche,
    SecondTranche,
    Advance(u64),
    TransferOutage,
    LostResponse,
    RetryPending,
    Revoke,
}

fn arb_op() -> impl Strategy<Value = PayoutOp> {
    prop_oneof![
        3 => Just(PayoutOp::Disburse),
        3 => Just(PayoutOp::FirstTranche),
        3 => Just(PayoutOp::SecondTranche),
        2 => (0u64..=2 * common::WINDOW_SECS).prop_map(PayoutOp::Advance),
        1 => Just(PayoutOp::TransferOutage),
        1 => Just(PayoutOp::LostResponse),
        2 => Just(PayoutOp::RetryPending),
        1 => Just(PayoutOp::Revoke),
    ]
}

// Property: exactly one of N simultaneous claimants wins
proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_single_claim_winner(agents in 2usize..24) {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let h = common::harness();
            let id = h.bounty(20).await;

            let handles: Vec<_> = (0..agents)
                .map(|i| {
                    let arbitrator = Arc::clone(&h.engine.arbitrator);
                    tokio::spawn(async move {
                        arbitrator.claim(id, common::request(&format!("agent{i}"))).await
                    })
                })
                .collect();

            let mut won = 0;
            for handle in handles {
                match handle.await.unwrap() {
                    Ok(_) => won += 1,
                    Err(BountyError::AlreadyClaimed { .. }) => {}
                    Err(e) => panic!("unexpected claim error: {e}"),
                }
            }
            assert_eq!(won, 1);
            assert_eq!(h.engine.arbitrator.claims_for(id).await.len(), 1);
        });
    }
}

// Property: no sequence of payout calls, outages and retries pays more
// than the reward
proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_payouts_never_exceed_reward(
        reward in 1u64..=120,
        ops in prop::collection::vec(arb_op(), 1..40)
    ) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let h = common::harness();
            let (id, decision) = h.approved(reward, "fuzz").await;
            let cap = RewardAmount::from_rtc(reward);
            let wallet = WalletId::new("fuzz-wallet");

            for op in ops {
                match op {
                    PayoutOp::Disburse => { let _ = h.engine.escrow.disburse(decision).await; }
                    PayoutOp::FirstTranche => {
                        let _ = h.engine.escrow.disburse_first_tranche(decision).await;
                    }
                    PayoutOp::SecondTranche => {
                        let _ = h.engine.escrow.disburse_second_tranche(decision).await;
                    }
                    PayoutOp::Advance(secs) => h.advance(secs),
                    PayoutOp::TransferOutage => h.transfers.fail_next(1).await,
                    PayoutOp::LostResponse => h.transfers.lose_next_responses(1).await,
                    PayoutOp::RetryPending => { let _ = h.engine.escrow.retry_pending().await; }
                    PayoutOp::Revoke => { let _ = h.engine.escrow.revoke(decision, "fuzz").await; }
                }

                let bounty = h.engine.registry.get(id).await.unwrap();
                assert!(bounty.paid <= cap);
                assert_eq!(h.engine.escrow.total_paid(id).await, bounty.paid);
                assert!(h.engine.escrow.get_balance(&wallet).await.unwrap() <= cap);
            }

            h.transfers.fail_next(0).await;
            h.transfers.lose_next_responses(0).await;
            h.engine.escrow.retry_pending().await;

            let bounty = h.engine.registry.get(id).await.unwrap();
            assert!(bounty.paid <= cap);
            assert!(h.transfers.executed().await <= 2);

            let state = replay(&h.ledger.entries().await.unwrap()).unwrap();
            let replayed = state.get(id).unwrap();
            assert_eq!(replayed.paid, bounty.paid);
            assert_eq!(replayed.status, bounty.status);
        });
    }
}
