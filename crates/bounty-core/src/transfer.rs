//! Boundary to the external value-transfer mechanism.

use async_trait::async_trait;
use bounty_types::{RewardAmount, WalletId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// Same key on every retry of one tranche; the backend must not move
    /// funds twice for it
    pub idempotency_key: String,
    pub wallet: WalletId,
    pub amount: RewardAmount,
    pub memo: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub tx_reference: String,
    pub idempotency_key: String,
    pub amount: RewardAmount,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransferError {
    /// Outcome unknown or not attempted; safe to retry with the same key
    #[error("Transfer service unavailable: {0}")]
    Unavailable(String),

    /// Permanent refusal for this wallet
    #[error("Wallet {wallet} rejected: {reason}")]
    WalletRejected { wallet: WalletId, reason: String },
}

#[async_trait]
pub trait TransferBackend: Send + Sync {
    async fn transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, TransferError>;

    /// Read-only balance passthrough
    async fn balance(&self, wallet: &WalletId) -> Result<RewardAmount, TransferError>;
}

#[derive(Default)]
struct MemoryTransferState {
    receipts: HashMap<String, TransferReceipt>,
    balances: HashMap<WalletId, RewardAmount>,
    rejected: HashSet<WalletId>,
    fail_before: u32,
    fail_after: u32,
    latency: Option<Duration>,
    executed: u64,
}

/// In-process transfer backend with idempotency-key deduplication and
/// failure injection.
#[derive(Default)]
pub struct MemoryTransferBackend {
    state: Mutex<MemoryTransferState>,
}

impl MemoryTransferBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `count` calls fail without moving funds
    pub async fn fail_next(&self, count: u32) {
        self.state.lock().await.fail_before = count;
    }

    /// The next `count` calls move funds but report `Unavailable`, as if the
    /// response was lost
    pub async fn lose_next_responses(&self, count: u32) {
        self.state.lock().await.fail_after = count;
    }

    pub async fn reject_wallet(&self, wallet: WalletId) {
        self.state.lock().await.rejected.insert(wallet);
    }

    pub async fn set_latency(&self, latency: Duration) {
        self.state.lock().await.latency = Some(latency);
    }

    /// Number of transfers that actually moved funds
    pub async fn executed(&self) -> u64 {
        self.state.lock().await.executed
    }

    fn tx_reference(key: &str) -> String {
        format!("0x{}", hex::encode(&blake3::hash(key.as_bytes()).as_bytes()[..16]))
    }
}

#[async_trait]
impl TransferBackend for MemoryTransferBackend {
    async fn transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, TransferError> {
        let latency = self.state.lock().await.latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock().await;
        if state.fail_before > 0 {
            state.fail_before -= 1;
            return Err(TransferError::Unavailable("injected failure".into()));
        }
        if state.rejected.contains(&request.wallet) {
            return Err(TransferError::WalletRejected {
                wallet: request.wallet.clone(),
                reason: "wallet is blocked".into(),
            });
        }

        let existing = state.receipts.get(&request.idempotency_key).cloned();
        let receipt = match existing {
            Some(existing) => existing,
            None => {
                let receipt = TransferReceipt {
                    tx_reference: Self::tx_reference(&request.idempotency_key),
                    idempotency_key: request.idempotency_key.clone(),
                    amount: request.amount,
                };
                let balance = state.balances.entry(request.wallet.clone()).or_default();
                *balance = balance.saturating_add(request.amount);
                state.executed += 1;
                state
                    .receipts
                    .insert(request.idempotency_key.clone(), receipt.clone());
                debug!(
                    wallet = %request.wallet,
                    amount = %request.amount,
                    tx = %receipt.tx_reference,
                    "Transfer executed"
                );
                receipt
            }
        };

        if state.fail_after > 0 {
            state.fail_after -= 1;
            return Err(TransferError::Unavailable("response lost".into()));
        }
        Ok(receipt)
    }

    async fn balance(&self, wallet: &WalletId) -> Result<RewardAmount, TransferError> {
        Ok(self
            .state
            .lock()
            .await
            .balances
            .get(wallet)
            .copied()
            .unwrap_or(RewardAmount::ZERO))
    }
}
