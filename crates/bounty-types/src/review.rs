use crate::id::{AgentId, BountyId, ClaimId, DecisionId, SubmissionId, WalletId};
use crate::time::MonoTime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub const MAX_DIMENSION_SCORE: u8 = 5;
pub const DEFAULT_APPROVAL_THRESHOLD: u8 = 13;

/// Evidence accompanying a submission. The pull request is never fetched;
/// only its reference is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub pr_reference: String,
    pub links: Vec<String>,
    pub summary: String,
}

impl Evidence {
    pub fn new(pr_reference: impl Into<String>) -> Self {
        Self {
            pr_reference: pr_reference.into(),
            links: Vec::new(),
            summary: String::new(),
        }
    }

    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.links.push(link.into());
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    /// PR reference with case and trailing slashes removed, so the same
    /// pull request submitted twice compares equal
    pub fn normalized_pr(&self) -> String {
        self.pr_reference.trim().trim_end_matches('/').to_lowercase()
    }

    pub fn has_links(&self) -> bool {
        self.links.iter().any(|l| !l.trim().is_empty())
    }

    /// Content fingerprint used to spot unchanged resubmissions
    pub fn fingerprint(&self) -> String {
        let mut links: Vec<String> = self
            .links
            .iter()
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty())
            .collect();
        links.sort();

        let summary = self
            .summary
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        let mut hasher = blake3::Hasher::new();
        hasher.update(self.normalized_pr().as_bytes());
        hasher.update(&[0]);
        for link in &links {
            hasher.update(link.as_bytes());
            hasher.update(&[0]);
        }
        hasher.update(summary.as_bytes());
        hex::encode(hasher.finalize().as_bytes())
    }
}

/// The four scored review dimensions, each 0..=5
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DimensionScores {
    pub impact: u8,
    pub correctness: u8,
    pub evidence: u8,
    pub craft: u8,
}

impl DimensionScores {
    /// Builds scores from raw reviewer input, clamping each to [0, 5]
    pub fn new(impact: i32, correctness: i32, evidence: i32, craft: i32) -> Self {
        let clamp = |v: i32| v.clamp(0, MAX_DIMENSION_SCORE as i32) as u8;
        Self {
            impact: clamp(impact),
            correctness: clamp(correctness),
            evidence: clamp(evidence),
            craft: clamp(craft),
        }
    }

    /// Re-clamps values that bypassed `new` (e.g. deserialized input)
    pub fn clamped(&self) -> Self {
        Self {
            impact: self.impact.min(MAX_DIMENSION_SCORE),
            correctness: self.correctness.min(MAX_DIMENSION_SCORE),
            evidence: self.evidence.min(MAX_DIMENSION_SCORE),
            craft: self.craft.min(MAX_DIMENSION_SCORE),
        }
    }

    pub fn total(&self) -> u8 {
        let c = self.clamped();
        c.impact + c.correctness + c.evidence + c.craft
    }
}

/// Hard gates: any one forces rejection regardless of score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disqualifier {
    TemplatedContent,
    /// Same work submitted under more than one identity
    DuplicateSubmission,
    MissingEvidence,
    /// Unchanged resubmission after a prior rejection
    RepeatedLowEffort,
}

impl fmt::Display for Disqualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Disqualifier::TemplatedContent => "templated or low-effort content",
            Disqualifier::DuplicateSubmission => "duplicate or sybil submission",
            Disqualifier::MissingEvidence => "missing evidence links",
            Disqualifier::RepeatedLowEffort => "repeated low-effort resubmission",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewOutcome {
    Approved,
    Rejected,
}

/// The decision rule: approved iff total >= threshold, correctness > 0 and
/// no disqualifier is set. A threshold below
/// [`DEFAULT_APPROVAL_THRESHOLD`] is raised to it.
pub fn decide_outcome(
    scores: &DimensionScores,
    disqualifiers: &BTreeSet<Disqualifier>,
    approval_threshold: u8,
) -> ReviewOutcome {
    let scores = scores.clamped();
    let threshold = approval_threshold.max(DEFAULT_APPROVAL_THRESHOLD);
    if disqualifiers.is_empty() && scores.correctness > 0 && scores.total() >= threshold {
        ReviewOutcome::Approved
    } else {
        ReviewOutcome::Rejected
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub bounty_id: BountyId,
    pub claim_id: ClaimId,
    pub agent: AgentId,
    pub wallet: WalletId,
    pub evidence: Evidence,
    pub self_scores: DimensionScores,
    pub fingerprint: String,
    pub submitted_at: MonoTime,
    pub submitted_wall: DateTime<Utc>,
    pub decision: Option<DecisionId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewDecision {
    pub id: DecisionId,
    pub submission_id: SubmissionId,
    pub bounty_id: BountyId,
    pub reviewer: String,
    pub scores: DimensionScores,
    pub total: u8,
    pub disqualifiers: BTreeSet<Disqualifier>,
    pub outcome: ReviewOutcome,
    pub approval_threshold: u8,
    pub notes: Option<String>,
    pub decided_at: MonoTime,
    pub decided_wall: DateTime<Utc>,
}

impl ReviewDecision {
    pub fn is_approved(&self) -> bool {
        self.outcome == ReviewOutcome::Approved
    }
}
