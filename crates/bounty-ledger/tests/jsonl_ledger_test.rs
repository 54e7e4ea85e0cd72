use bounty_ledger::{
    replay, verify_chain, AuditLedger, JsonlAuditLedger, LedgerError, LedgerEvent,
};
use bounty_types::{BountyEvent, BountyId, BountyStatus, RewardAmount, Tier};
use std::io::Write;
use tempfile::TempDir;

fn created(title: &str) -> LedgerEvent {
    LedgerEvent::BountyCreated {
        title: title.to_string(),
        tier: Tier::Standard,
        reward: RewardAmount::from_rtc(20),
        source_ref: Some("https://github.com/rustchain/bounties/issues/12".into()),
    }
}

#[tokio::test]
async fn test_entries_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("audit/ledger.jsonl");

    let head = {
        let ledger = JsonlAuditLedger::open(&path).await.unwrap();
        ledger.record(BountyId::new(1), created("Fix CLI")).await.unwrap();
        ledger
            .append(
                BountyId::new(1),
                vec![LedgerEvent::transition(
                    BountyStatus::Open,
                    BountyStatus::Claimed,
                    BountyEvent::Claim,
                )],
            )
            .await
            .unwrap();
        ledger.head_hash().await
    };

    let reopened = JsonlAuditLedger::open(&path).await.unwrap();
    assert_eq!(reopened.len().await, 2);
    assert_eq!(reopened.head_hash().await, head);

    // Appends continue the same chain
    reopened.record(BountyId::new(2), created("Docs")).await.unwrap();
    let entries = JsonlAuditLedger::read_entries(&path).await.unwrap();
    assert_eq!(entries.len(), 3);
    verify_chain(&entries).unwrap();

    let state = replay(&entries).unwrap();
    assert_eq!(state.get(BountyId::new(1)).unwrap().status, BountyStatus::Claimed);
    assert_eq!(state.get(BountyId::new(2)).unwrap().status, BountyStatus::Open);
}

#[tokio::test]
async fn test_edited_file_is_refused() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger.jsonl");

    {
        let ledger = JsonlAuditLedger::open(&path).await.unwrap();
        ledger.record(BountyId::new(1), created("Fix CLI")).await.unwrap();
        ledger.record(BountyId::new(2), created("Docs")).await.unwrap();
    }

    let contents = std::fs::read_to_string(&path).unwrap();
    std::fs::write(&path, contents.replace("Fix CLI", "Fix GUI")).unwrap();

    match JsonlAuditLedger::open(&path).await {
        Err(LedgerError::ChainBroken { seq, .. }) => assert_eq!(seq, 1),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("tampered ledger opened"),
    }
}

#[tokio::test]
async fn test_torn_trailing_line_is_discarded() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ledger.jsonl");

    {
        let ledger = JsonlAuditLedger::open(&path).await.unwrap();
        ledger.record(BountyId::new(1), created("Fix CLI")).await.unwrap();
    }

    // Simulate a crash midway through writing a second line
    let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(br#"{"seq":2,"bounty_id":1,"recor"#).unwrap();
    drop(file);

    let ledger = JsonlAuditLedger::open(&path).await.unwrap();
    assert_eq!(ledger.len().await, 1);
    let entry = ledger.record(BountyId::new(1), created("again")).await;
    // a second BountyCreated is accepted by the ledger; replay rejects it
    assert_eq!(entry.unwrap().seq, 2);

    let entries = JsonlAuditLedger::read_entries(&path).await.unwrap();
    assert_eq!(entries.len(), 2);
    assert!(matches!(
        replay(&entries),
        Err(LedgerError::ReplayDivergence { seq: 2, .. })
    ));
}
