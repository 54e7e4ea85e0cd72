use thiserror::Error;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Hash chain broken at seq {seq}: {reason}")]
    ChainBroken { seq: u64, reason: String },

    #[error("Malformed ledger line {line}: {reason}")]
    MalformedLine { line: usize, reason: String },

    #[error("Replay diverged at seq {seq}: {reason}")]
    ReplayDivergence { seq: u64, reason: String },

    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

impl LedgerError {
    /// Failures that may succeed if the same append is attempted again
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Io(_) | LedgerError::Unavailable(_))
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        LedgerError::Serialization(err.to_string())
    }
}
