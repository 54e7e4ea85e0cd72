use crate::claim_format::parse_claim_comment;
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{BountyError, Result};
use crate::registry::{BountyGuard, BountyRegistry, ChangeSet};
use bounty_ledger::LedgerEvent;
use bounty_types::{
    AgentId, BountyEvent, BountyId, BountyStatus, Claim, ClaimId, ClaimRequest, ClaimStatus,
    MonoTime,
};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Grants, expires and releases claims. At most one claim per bounty is
/// active at a time; every mutation happens while the bounty is locked.
pub struct ClaimArbitrator {
    registry: Arc<BountyRegistry>,
    clock: Arc<dyn Clock>,
    config: Arc<EngineConfig>,
    claims: RwLock<HashMap<ClaimId, Claim>>,
    active: RwLock<HashMap<BountyId, ClaimId>>,
    next_id: AtomicU64,
}

impl ClaimArbitrator {
    pub fn new(registry: Arc<BountyRegistry>, clock: Arc<dyn Clock>, config: Arc<EngineConfig>) -> Self {
        Self {
            registry,
            clock,
            config,
            claims: RwLock::new(HashMap::new()),
            active: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// First valid claim wins. Concurrent callers on the same Open bounty
    /// serialize on its lock; the first flips it to `Claimed` and the rest
    /// observe `AlreadyClaimed`.
    pub async fn claim(&self, bounty_id: BountyId, request: ClaimRequest) -> Result<Claim> {
        let mut guard = self.registry.lock(bounty_id).await?;
        let now = self.clock.now();
        self.expire_if_overdue(&mut guard, now).await?;

        if let Some(active) = self.active_claim_locked(bounty_id).await {
            if active.agent == request.agent {
                debug!(
                    bounty_id = %bounty_id,
                    agent = %request.agent,
                    claim_id = %active.id,
                    "Duplicate claim by current holder"
                );
                return Err(BountyError::DuplicateAgentClaim {
                    agent: request.agent,
                    bounty_id,
                    claim_id: active.id,
                });
            }
        }

        let status = guard.status();
        if status.is_terminal() {
            return Err(BountyError::BountyClosed(bounty_id));
        }
        if !status.accepts_claims() {
            debug!(
                bounty_id = %bounty_id,
                agent = %request.agent,
                status = %status,
                "Claim lost to existing holder"
            );
            return Err(BountyError::AlreadyClaimed { bounty_id, status });
        }

        let duration = self.config.claim_duration(guard.bounty().tier);
        let claim = Claim {
            id: ClaimId::new(self.next_id.fetch_add(1, Ordering::SeqCst)),
            bounty_id,
            agent: request.agent,
            wallet: request.wallet,
            approach: request.approach,
            claimed_at: now,
            expires_at: now.saturating_add(duration),
            claimed_wall: Utc::now(),
            status: ClaimStatus::Active,
        };

        guard
            .commit(
                ChangeSet::record(LedgerEvent::ClaimGranted {
                    claim: claim.clone(),
                })
                .with_transition(BountyEvent::Claim),
            )
            .await?;

        self.claims.write().await.insert(claim.id, claim.clone());
        self.active.write().await.insert(bounty_id, claim.id);

        info!(
            bounty_id = %bounty_id,
            claim_id = %claim.id,
            agent = %claim.agent,
            wallet = %claim.wallet,
            expires_at = %claim.expires_at,
            "🎯 Claim granted"
        );

        Ok(claim)
    }

    /// Parses a claim comment and claims with it
    pub async fn claim_from_comment(&self, bounty_id: BountyId, comment: &str) -> Result<Claim> {
        let request = parse_claim_comment(comment)?;
        self.claim(bounty_id, request).await
    }

    /// Expires an overdue claim and reopens its bounty. Already-terminated
    /// claims are returned unchanged.
    pub async fn expire_claim(&self, claim_id: ClaimId) -> Result<Claim> {
        let bounty_id = self.lookup(claim_id).await?.bounty_id;
        let mut guard = self.registry.lock(bounty_id).await?;
        let claim = self.lookup(claim_id).await?;

        match claim.status {
            ClaimStatus::Active => {
                let now = self.clock.now();
                if !claim.is_overdue(now) {
                    return Err(BountyError::ClaimNotExpired {
                        claim_id,
                        expires_at: claim.expires_at,
                    });
                }
                self.terminate(&mut guard, claim, ClaimStatus::Expired).await
            }
            _ => Ok(claim),
        }
    }

    /// Voluntary release by the claiming agent; frees the bounty at once
    pub async fn withdraw(&self, claim_id: ClaimId, agent: &AgentId) -> Result<Claim> {
        let bounty_id = self.lookup(claim_id).await?.bounty_id;
        let mut guard = self.registry.lock(bounty_id).await?;
        let claim = self.lookup(claim_id).await?;

        if claim.agent != *agent {
            return Err(BountyError::NotClaimant {
                claim_id,
                agent: agent.clone(),
            });
        }
        let claim = self.require_live(&mut guard, claim).await?;
        self.terminate(&mut guard, claim, ClaimStatus::Withdrawn).await
    }

    /// Expires every overdue claim. Safe to run alongside claim attempts:
    /// each expiry re-checks under the bounty lock.
    pub async fn sweep_expired(&self) -> Result<Vec<Claim>> {
        let now = self.clock.now();
        let candidates: Vec<BountyId> = {
            let active = self.active.read().await;
            let claims = self.claims.read().await;
            active
                .iter()
                .filter(|(_, id)| claims.get(*id).is_some_and(|c| c.is_overdue(now)))
                .map(|(bounty_id, _)| *bounty_id)
                .collect()
        };

        let mut expired = Vec::new();
        for bounty_id in candidates {
            let mut guard = self.registry.lock(bounty_id).await?;
            if let Some(claim) = self.expire_if_overdue(&mut guard, self.clock.now()).await? {
                expired.push(claim);
            }
        }

        if !expired.is_empty() {
            info!(expired = expired.len(), "🧹 Claim sweep complete");
        }
        Ok(expired)
    }

    /// The live claim on a bounty, applying lazy expiry first
    pub async fn active_claim(&self, bounty_id: BountyId) -> Result<Option<Claim>> {
        let mut guard = self.registry.lock(bounty_id).await?;
        self.expire_if_overdue(&mut guard, self.clock.now()).await?;
        Ok(self.active_claim_locked(bounty_id).await)
    }

    pub async fn get(&self, claim_id: ClaimId) -> Result<Claim> {
        let bounty_id = self.lookup(claim_id).await?.bounty_id;
        let mut guard = self.registry.lock(bounty_id).await?;
        self.expire_if_overdue(&mut guard, self.clock.now()).await?;
        self.lookup(claim_id).await
    }

    pub async fn claims_for(&self, bounty_id: BountyId) -> Vec<Claim> {
        let mut claims: Vec<Claim> = self
            .claims
            .read()
            .await
            .values()
            .filter(|c| c.bounty_id == bounty_id)
            .cloned()
            .collect();
        claims.sort_by_key(|c| c.id);
        claims
    }

    /// Installs claims rebuilt from the ledger. Claims still `Active` become
    /// their bounty's active claim again.
    pub(crate) async fn restore(&self, restored: Vec<Claim>) {
        let mut active = self.active.write().await;
        let mut claims = self.claims.write().await;
        let mut next = self.next_id.load(Ordering::SeqCst);
        for claim in restored {
            next = next.max(claim.id.value() + 1);
            if claim.status == ClaimStatus::Active {
                active.insert(claim.bounty_id, claim.id);
            }
            claims.insert(claim.id, claim);
        }
        self.next_id.store(next, Ordering::SeqCst);
    }

    pub(crate) async fn lookup(&self, claim_id: ClaimId) -> Result<Claim> {
        self.claims
            .read()
            .await
            .get(&claim_id)
            .cloned()
            .ok_or(BountyError::ClaimNotFound(claim_id))
    }

    async fn active_claim_locked(&self, bounty_id: BountyId) -> Option<Claim> {
        let claim_id = *self.active.read().await.get(&bounty_id)?;
        self.claims.read().await.get(&claim_id).cloned()
    }

    /// Caller holds `guard`. Expires the bounty's active claim if its
    /// deadline has passed.
    pub(crate) async fn expire_if_overdue(
        &self,
        guard: &mut BountyGuard,
        now: MonoTime,
    ) -> Result<Option<Claim>> {
        match self.active_claim_locked(guard.id()).await {
            Some(claim) if claim.is_overdue(now) => {
                let expired = self.terminate(guard, claim, ClaimStatus::Expired).await?;
                Ok(Some(expired))
            }
            _ => Ok(None),
        }
    }

    /// Caller holds `guard`. Returns the claim if it may still be acted on,
    /// expiring it first when its deadline has passed.
    pub(crate) async fn require_live(&self, guard: &mut BountyGuard, claim: Claim) -> Result<Claim> {
        let now = self.clock.now();
        match claim.status {
            ClaimStatus::Active if claim.is_live(now) => Ok(claim),
            ClaimStatus::Active => {
                let expired = self.terminate(guard, claim, ClaimStatus::Expired).await?;
                Err(BountyError::ClaimExpired {
                    claim_id: expired.id,
                    expired_at: expired.expires_at,
                })
            }
            ClaimStatus::Expired => Err(BountyError::ClaimExpired {
                claim_id: claim.id,
                expired_at: claim.expires_at,
            }),
            status => Err(BountyError::ClaimNotActive {
                claim_id: claim.id,
                status,
            }),
        }
    }

    /// Caller holds `guard`. Looks up a claim and checks it is live.
    pub(crate) async fn live_claim(&self, guard: &mut BountyGuard, claim_id: ClaimId) -> Result<Claim> {
        let claim = self.lookup(claim_id).await?;
        self.require_live(guard, claim).await
    }

    /// Caller holds `guard` and has already committed the submission.
    pub(crate) async fn mark_converted(&self, claim_id: ClaimId) {
        let bounty_id = {
            let mut claims = self.claims.write().await;
            match claims.get_mut(&claim_id) {
                Some(claim) => {
                    claim.status = ClaimStatus::Converted;
                    claim.bounty_id
                }
                None => return,
            }
        };

        let mut active = self.active.write().await;
        if active.get(&bounty_id) == Some(&claim_id) {
            active.remove(&bounty_id);
        }
    }

    async fn terminate(&self, guard: &mut BountyGuard, claim: Claim, status: ClaimStatus) -> Result<Claim> {
        let record = match status {
            ClaimStatus::Withdrawn => LedgerEvent::ClaimWithdrawn {
                claim_id: claim.id,
                agent: claim.agent.clone(),
            },
            _ => LedgerEvent::ClaimExpired {
                claim_id: claim.id,
                agent: claim.agent.clone(),
            },
        };

        let mut change = ChangeSet::record(record);
        if guard.status() == BountyStatus::Claimed {
            change = change.with_transition(BountyEvent::Release);
        }
        guard.commit(change).await?;

        let mut updated = claim;
        updated.status = status;
        self.claims.write().await.insert(updated.id, updated.clone());
        self.active.write().await.remove(&updated.bounty_id);

        info!(
            bounty_id = %updated.bounty_id,
            claim_id = %updated.id,
            agent = %updated.agent,
            status = ?status,
            "🔓 Claim released"
        );
        Ok(updated)
    }
}
