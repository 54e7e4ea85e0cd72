//! Authoritative store of bounty records.
//!
//! Each bounty sits behind its own `tokio::sync::Mutex`; the map lock is
//! held only to look up or insert an entry, so distinct bounties never
//! contend. Every change goes through [`BountyGuard::commit`], which is
//! write-ahead: the next state is computed, the ledger entries are appended,
//! and only then is the record mutated.

use crate::clock::Clock;
use crate::error::{BountyError, Result};
use bounty_ledger::{AuditLedger, LedgerEvent};
use bounty_types::{
    Bounty, BountyEvent, BountyId, BountyStatus, ClosureReason, NewBounty, RewardAmount,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{info, warn};

/// Facts committed to one bounty in a single ledger append: records first,
/// then each transition in order.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    transitions: Vec<BountyEvent>,
    records: Vec<LedgerEvent>,
    paid: RewardAmount,
}

impl ChangeSet {
    pub fn transition(event: BountyEvent) -> Self {
        Self::default().with_transition(event)
    }

    pub fn record(record: LedgerEvent) -> Self {
        Self::default().with_record(record)
    }

    pub fn with_transition(mut self, event: BountyEvent) -> Self {
        self.transitions.push(event);
        self
    }

    pub fn with_record(mut self, record: LedgerEvent) -> Self {
        self.records.push(record);
        self
    }

    /// Amount added to the bounty's paid-so-far total
    pub fn with_paid(mut self, amount: RewardAmount) -> Self {
        self.paid = amount;
        self
    }
}

/// Exclusive access to one bounty. Held across compound operations (claim
/// grant, expiry, payout) so they serialize per bounty.
pub struct BountyGuard {
    bounty: OwnedMutexGuard<Bounty>,
    ledger: Arc<dyn AuditLedger>,
}

impl BountyGuard {
    pub fn bounty(&self) -> &Bounty {
        &self.bounty
    }

    pub fn id(&self) -> BountyId {
        self.bounty.id
    }

    pub fn status(&self) -> BountyStatus {
        self.bounty.status
    }

    /// Validates, appends to the ledger, then mutates. On any error the
    /// record is left exactly as it was.
    pub async fn commit(&mut self, change: ChangeSet) -> Result<BountyStatus> {
        let id = self.bounty.id;
        let from = self.bounty.status;

        let mut events = change.records;
        let mut closure = None;
        let mut next = from;
        for event in change.transitions {
            let to = next
                .next(&event)
                .map_err(|e| BountyError::from_types(id, e))?;
            if let Some(reason) = event.closure_reason() {
                closure = Some(reason);
            }
            events.push(LedgerEvent::transition(next, to, event));
            next = to;
        }
        if let Some(reason) = closure.clone() {
            events.push(LedgerEvent::BountyClosed { reason });
        }

        let paid = self
            .bounty
            .paid
            .checked_add(change.paid)
            .filter(|total| *total <= self.bounty.reward)
            .ok_or(BountyError::PayoutCapExceeded {
                bounty_id: id,
                paid: self.bounty.paid,
                requested: change.paid,
                reward: self.bounty.reward,
            })?;

        if !events.is_empty() {
            self.ledger
                .append(id, events)
                .await
                .map_err(BountyError::from_ledger)?;
        }

        self.bounty.status = next;
        self.bounty.paid = paid;
        if closure.is_some() {
            self.bounty.closure = closure;
        }

        if from != next {
            if next == BountyStatus::Closed {
                log_closure(&self.bounty);
            } else {
                info!(
                    bounty_id = %id,
                    from = %from,
                    to = %next,
                    "🔁 Bounty transition"
                );
            }
        }

        Ok(next)
    }

    pub async fn apply(&mut self, event: BountyEvent) -> Result<BountyStatus> {
        self.commit(ChangeSet::transition(event)).await
    }
}

fn log_closure(bounty: &Bounty) {
    match &bounty.closure {
        Some(ClosureReason::Completed) => info!(
            bounty_id = %bounty.id,
            paid = %bounty.paid,
            "🏁 Bounty closed as completed"
        ),
        Some(ClosureReason::Cancelled) => info!(bounty_id = %bounty.id, "Bounty cancelled"),
        other => warn!(
            bounty_id = %bounty.id,
            reason = ?other,
            paid = %bounty.paid,
            reward = %bounty.reward,
            "⛔ Bounty closed without completing"
        ),
    }
}

pub struct BountyRegistry {
    ledger: Arc<dyn AuditLedger>,
    clock: Arc<dyn Clock>,
    bounties: RwLock<HashMap<BountyId, Arc<Mutex<Bounty>>>>,
    next_id: AtomicU64,
}

impl BountyRegistry {
    pub fn new(ledger: Arc<dyn AuditLedger>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger,
            clock,
            bounties: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub async fn create(&self, new: NewBounty) -> Result<BountyId> {
        if new.title.trim().is_empty() {
            return Err(BountyError::InvalidBounty("title is empty".into()));
        }
        if new.reward.is_zero() {
            return Err(BountyError::InvalidBounty("reward must be positive".into()));
        }

        let id = BountyId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let bounty = Bounty::from_new(id, new, self.clock.now());

        self.ledger
            .record(
                id,
                LedgerEvent::BountyCreated {
                    title: bounty.title.clone(),
                    tier: bounty.tier,
                    reward: bounty.reward,
                    source_ref: bounty.source_ref.clone(),
                },
            )
            .await
            .map_err(BountyError::from_ledger)?;

        info!(
            bounty_id = %id,
            tier = %bounty.tier,
            reward = %bounty.reward,
            title = %bounty.title,
            "📋 Bounty created"
        );

        self.bounties
            .write()
            .await
            .insert(id, Arc::new(Mutex::new(bounty)));
        Ok(id)
    }

    /// Installs records rebuilt from the ledger; new ids continue after the
    /// highest restored one
    pub(crate) async fn restore(&self, restored: Vec<Bounty>) {
        let mut bounties = self.bounties.write().await;
        let mut next = self.next_id.load(Ordering::SeqCst);
        for bounty in restored {
            next = next.max(bounty.id.value() + 1);
            bounties.insert(bounty.id, Arc::new(Mutex::new(bounty)));
        }
        self.next_id.store(next, Ordering::SeqCst);
    }

    async fn slot(&self, id: BountyId) -> Result<Arc<Mutex<Bounty>>> {
        self.bounties
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(BountyError::BountyNotFound(id))
    }

    /// Locks one bounty for a compound operation
    pub async fn lock(&self, id: BountyId) -> Result<BountyGuard> {
        let slot = self.slot(id).await?;
        Ok(BountyGuard {
            bounty: slot.lock_owned().await,
            ledger: self.ledger.clone(),
        })
    }

    pub async fn get(&self, id: BountyId) -> Result<Bounty> {
        let slot = self.slot(id).await?;
        let bounty = slot.lock().await.clone();
        Ok(bounty)
    }

    pub async fn list(&self) -> Vec<Bounty> {
        let slots: Vec<_> = self.bounties.read().await.values().cloned().collect();
        let mut out = Vec::with_capacity(slots.len());
        for slot in slots {
            out.push(slot.lock().await.clone());
        }
        out.sort_by_key(|b| b.id);
        out
    }

    pub async fn transition(&self, id: BountyId, event: BountyEvent) -> Result<Bounty> {
        let mut guard = self.lock(id).await?;
        guard.apply(event).await?;
        Ok(guard.bounty().clone())
    }

    /// Applies `event` only if the bounty is still in `expected`
    pub async fn compare_and_transition(
        &self,
        id: BountyId,
        expected: BountyStatus,
        event: BountyEvent,
    ) -> Result<Bounty> {
        let mut guard = self.lock(id).await?;
        if guard.status() != expected {
            return Err(BountyError::StateConflict {
                bounty_id: id,
                expected,
                actual: guard.status(),
            });
        }
        guard.apply(event).await?;
        Ok(guard.bounty().clone())
    }

    /// Maintainer withdraws a bounty nobody has claimed
    pub async fn cancel(&self, id: BountyId) -> Result<Bounty> {
        self.compare_and_transition(id, BountyStatus::Open, BountyEvent::Cancel)
            .await
    }

    /// Closes a fully paid bounty
    pub async fn close(&self, id: BountyId) -> Result<Bounty> {
        self.transition(id, BountyEvent::Close).await
    }

    pub async fn len(&self) -> usize {
        self.bounties.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn ledger(&self) -> &Arc<dyn AuditLedger> {
        &self.ledger
    }
}
