use anyhow::{Context, Result};
use bounty_ledger::{replay, JsonlAuditLedger, LedgerReplay};
use bounty_types::{BountyId, BountyStatus, RewardAmount, Tier};
use serde::Serialize;
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BountyLine {
    pub id: BountyId,
    pub title: String,
    pub tier: Tier,
    pub reward: RewardAmount,
    pub status: BountyStatus,
    pub paid: RewardAmount,
    pub claims: usize,
    pub rejections: u32,
    pub pending_payouts: usize,
    pub closure: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerSummary {
    pub entries: usize,
    pub head_hash: Option<String>,
    pub total_paid: RewardAmount,
    pub bounties: Vec<BountyLine>,
}

impl From<&LedgerReplay> for LedgerSummary {
    fn from(state: &LedgerReplay) -> Self {
        let bounties = state
            .bounties
            .values()
            .map(|b| BountyLine {
                id: b.id,
                title: b.title.clone(),
                tier: b.tier,
                reward: b.reward,
                status: b.status,
                paid: b.paid,
                claims: b.claims.len(),
                rejections: b.rejections,
                pending_payouts: b.unconfirmed.len(),
                closure: b.closure.as_ref().map(|c| format!("{:?}", c)),
            })
            .collect();

        Self {
            entries: state.entries,
            head_hash: state.head_hash.clone(),
            total_paid: state.total_paid(),
            bounties,
        }
    }
}

impl fmt::Display for LedgerSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} entries, head {}",
            self.entries,
            self.head_hash.as_deref().unwrap_or("(empty)")
        )?;
        for b in &self.bounties {
            write!(
                f,
                "{:<10} {:<9} {:<14} paid {} of {}, {} claim(s), {} rejection(s)",
                b.id.to_string(),
                b.tier.as_str(),
                b.status.to_string(),
                b.paid,
                b.reward,
                b.claims,
                b.rejections
            )?;
            if b.pending_payouts > 0 {
                write!(f, ", {} pending payout(s)", b.pending_payouts)?;
            }
            if let Some(closure) = &b.closure {
                write!(f, " [{}]", closure)?;
            }
            writeln!(f, "  {}", b.title)?;
        }
        write!(f, "total paid {}", self.total_paid)
    }
}

/// Reads, verifies and replays a JSONL ledger without opening it for
/// append
pub async fn inspect_ledger(path: &Path) -> Result<LedgerSummary> {
    let entries = JsonlAuditLedger::read_entries(path)
        .await
        .with_context(|| format!("Failed to read ledger {}", path.display()))?;
    let state = replay(&entries).context("Ledger replay diverged")?;
    Ok(LedgerSummary::from(&state))
}
