use crate::entry::{ChainState, LedgerEntry};
use crate::error::{LedgerError, Result};
use crate::event::LedgerEvent;
use crate::ledger::AuditLedger;
use async_trait::async_trait;
use bounty_types::BountyId;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

/// Process-local ledger. Used by tests and the simulation harness.
pub struct MemoryAuditLedger {
    state: Mutex<ChainState>,
    skip_appends: AtomicU32,
    fail_appends: AtomicU32,
}

impl Default for MemoryAuditLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAuditLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ChainState::new()),
            skip_appends: AtomicU32::new(0),
            fail_appends: AtomicU32::new(0),
        }
    }

    /// Makes the next `count` appends fail with `Unavailable`
    pub fn fail_next_appends(&self, count: u32) {
        self.fail_appends_after(0, count);
    }

    /// Lets `skip` appends through, then fails the following `count`
    pub fn fail_appends_after(&self, skip: u32, count: u32) {
        self.skip_appends.store(skip, Ordering::SeqCst);
        self.fail_appends.store(count, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> bool {
        if self.fail_appends.load(Ordering::SeqCst) == 0 {
            return false;
        }
        let decrement = |n: u32| n.checked_sub(1);
        if self
            .skip_appends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, decrement)
            .is_ok()
        {
            return false;
        }
        self.fail_appends
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, decrement)
            .is_ok()
    }
}

#[async_trait]
impl AuditLedger for MemoryAuditLedger {
    async fn append(&self, bounty_id: BountyId, events: Vec<LedgerEvent>) -> Result<Vec<LedgerEntry>> {
        if self.take_injected_failure() {
            return Err(LedgerError::Unavailable("injected append failure".to_string()));
        }

        let mut state = self.state.lock().await;
        let sealed = state.seal(bounty_id, events)?;
        state.commit(&sealed);

        debug!(
            bounty_id = %bounty_id,
            appended = sealed.len(),
            total = state.entries.len(),
            "Ledger entries appended"
        );
        Ok(sealed)
    }

    async fn entries(&self) -> Result<Vec<LedgerEntry>> {
        Ok(self.state.lock().await.entries.clone())
    }

    async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    async fn head_hash(&self) -> String {
        self.state.lock().await.head_hash()
    }
}
