//! Parser for the claim comment agents post on a bounty issue.
//!
//! ```text
//! ## Bounty Claim: #42
//!
//! **Claimant:** @handle
//! **Wallet:** RTC-wallet-id
//!
//! ### Implementation Plan
//! free text, one or more lines
//!
//! ### Risk Mitigation
//! ...
//! ```
//!
//! Only the claimant, wallet and implementation plan are read; the other
//! sections are informational.

use crate::error::{BountyError, Result};
use bounty_types::{AgentId, ClaimRequest, WalletId};

const MAX_HANDLE_LEN: usize = 39;
const WALLET_LEN: std::ops::RangeInclusive<usize> = 3..=64;

/// Value of a `**Label:** value` line, bold markers optional
fn field<'a>(line: &'a str, label: &str) -> Option<&'a str> {
    let stripped = line.trim().trim_start_matches("- ").replace("**", "");
    let (name, _) = stripped.split_once(':')?;
    if !name.trim().eq_ignore_ascii_case(label) {
        return None;
    }
    // Locate the value in the original line, after the first ':' and any
    // closing bold marker.
    let (_, rest) = line.split_once(':')?;
    Some(rest.trim_start_matches("**").trim())
}

fn heading_title(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    if trimmed.starts_with('#') {
        Some(trimmed.trim_start_matches('#').trim())
    } else {
        None
    }
}

fn section(text: &str, title: &str) -> Option<String> {
    let mut lines = text.lines();
    lines.find(|l| heading_title(l).is_some_and(|t| t.eq_ignore_ascii_case(title)))?;

    let body: Vec<&str> = lines
        .take_while(|l| heading_title(l).is_none() && l.trim() != "---")
        .collect();
    Some(body.join("\n").trim().to_string())
}

fn valid_handle(handle: &str) -> bool {
    !handle.is_empty()
        && handle.len() <= MAX_HANDLE_LEN
        && handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

pub fn valid_wallet(wallet: &str) -> bool {
    WALLET_LEN.contains(&wallet.len())
        && wallet
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Parses a claim comment into a validated request. Missing or blank
/// fields and malformed identifiers fail with `InvalidClaimFormat`.
pub fn parse_claim_comment(text: &str) -> Result<ClaimRequest> {
    let mut handle = None;
    let mut wallet = None;
    for line in text.lines() {
        if handle.is_none() {
            handle = field(line, "claimant");
        }
        if wallet.is_none() {
            wallet = field(line, "wallet");
        }
    }

    let handle = handle
        .map(|h| h.trim_start_matches('@'))
        .filter(|h| !h.is_empty())
        .ok_or_else(|| BountyError::InvalidClaimFormat("missing claimant".into()))?;
    if !valid_handle(handle) {
        return Err(BountyError::InvalidClaimFormat(format!(
            "malformed claimant handle '{}'",
            handle
        )));
    }

    let wallet = wallet
        .filter(|w| !w.is_empty())
        .ok_or_else(|| BountyError::InvalidClaimFormat("missing wallet".into()))?;
    if !valid_wallet(wallet) {
        return Err(BountyError::InvalidClaimFormat(format!(
            "malformed wallet id '{}'",
            wallet
        )));
    }

    let approach = section(text, "Implementation Plan")
        .filter(|a| !a.is_empty())
        .ok_or_else(|| BountyError::InvalidClaimFormat("missing implementation plan".into()))?;

    Ok(ClaimRequest::new(
        AgentId::new(handle),
        WalletId::new(wallet),
        approach,
    ))
}
