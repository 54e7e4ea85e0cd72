use crate::entry::LedgerEntry;
use crate::error::{LedgerError, Result};
use crate::event::LedgerEvent;
use async_trait::async_trait;
use bounty_types::BountyId;

/// Append-only audit log. No method mutates or removes an existing entry.
#[async_trait]
pub trait AuditLedger: Send + Sync {
    /// Appends `events` for one bounty as a single durable write. Either all
    /// of them become visible or none do.
    async fn append(&self, bounty_id: BountyId, events: Vec<LedgerEvent>) -> Result<Vec<LedgerEntry>>;

    async fn entries(&self) -> Result<Vec<LedgerEntry>>;

    async fn len(&self) -> usize;

    async fn head_hash(&self) -> String;

    async fn record(&self, bounty_id: BountyId, event: LedgerEvent) -> Result<LedgerEntry> {
        self.append(bounty_id, vec![event])
            .await?
            .pop()
            .ok_or_else(|| LedgerError::Unavailable("append returned no entry".to_string()))
    }

    async fn entries_for(&self, bounty_id: BountyId) -> Result<Vec<LedgerEntry>> {
        Ok(self
            .entries()
            .await?
            .into_iter()
            .filter(|e| e.bounty_id == bounty_id)
            .collect())
    }

    async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
