use crate::error::{LedgerError, Result};
use crate::event::LedgerEvent;
use bounty_types::BountyId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Previous-hash value of the first entry
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// 1-based, gap-free
    pub seq: u64,
    pub bounty_id: BountyId,
    pub recorded_at: DateTime<Utc>,
    pub event: LedgerEvent,
    pub prev_hash: String,
    pub hash: String,
}

#[derive(Serialize)]
struct HashInput<'a> {
    seq: u64,
    bounty_id: &'a BountyId,
    event: &'a LedgerEvent,
    prev_hash: &'a str,
}

/// blake3 over the canonical JSON encoding of the chained fields
pub fn compute_hash(
    seq: u64,
    bounty_id: &BountyId,
    event: &LedgerEvent,
    prev_hash: &str,
) -> Result<String> {
    let bytes = serde_json::to_vec(&HashInput {
        seq,
        bounty_id,
        event,
        prev_hash,
    })?;
    Ok(hex::encode(blake3::hash(&bytes).as_bytes()))
}

impl LedgerEntry {
    pub fn verify_hash(&self) -> Result<bool> {
        let expected = compute_hash(self.seq, &self.bounty_id, &self.event, &self.prev_hash)?;
        Ok(expected == self.hash)
    }
}

/// Checks sequence continuity, back-links and every entry hash.
pub fn verify_chain(entries: &[LedgerEntry]) -> Result<()> {
    let mut prev = GENESIS_HASH.to_string();

    for (index, entry) in entries.iter().enumerate() {
        let expected_seq = index as u64 + 1;
        if entry.seq != expected_seq {
            return Err(LedgerError::ChainBroken {
                seq: entry.seq,
                reason: format!("expected seq {}", expected_seq),
            });
        }
        if entry.prev_hash != prev {
            return Err(LedgerError::ChainBroken {
                seq: entry.seq,
                reason: "previous hash does not link".to_string(),
            });
        }
        if !entry.verify_hash()? {
            return Err(LedgerError::ChainBroken {
                seq: entry.seq,
                reason: "entry hash mismatch".to_string(),
            });
        }
        prev = entry.hash.clone();
    }

    Ok(())
}

/// In-memory chain head shared by the backends. `seal` builds entries
/// without touching state; `commit` makes them visible once durable.
#[derive(Debug, Clone)]
pub(crate) struct ChainState {
    pub entries: Vec<LedgerEntry>,
}

impl ChainState {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn from_entries(entries: Vec<LedgerEntry>) -> Result<Self> {
        verify_chain(&entries)?;
        Ok(Self { entries })
    }

    pub fn head_hash(&self) -> String {
        self.entries
            .last()
            .map(|e| e.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string())
    }

    pub fn seal(&self, bounty_id: BountyId, events: Vec<LedgerEvent>) -> Result<Vec<LedgerEntry>> {
        let mut prev = self.head_hash();
        let mut seq = self.entries.len() as u64;
        let recorded_at = Utc::now();
        let mut sealed = Vec::with_capacity(events.len());

        for event in events {
            seq += 1;
            let hash = compute_hash(seq, &bounty_id, &event, &prev)?;
            sealed.push(LedgerEntry {
                seq,
                bounty_id,
                recorded_at,
                event,
                prev_hash: prev,
                hash: hash.clone(),
            });
            prev = hash;
        }

        Ok(sealed)
    }

    pub fn commit(&mut self, sealed: &[LedgerEntry]) {
        self.entries.extend_from_slice(sealed);
    }
}
