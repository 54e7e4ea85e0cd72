use crate::entry::{ChainState, LedgerEntry};
use crate::error::{LedgerError, Result};
use crate::event::LedgerEvent;
use crate::ledger::AuditLedger;
use async_trait::async_trait;
use bounty_types::BountyId;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

struct JsonlInner {
    state: ChainState,
    file: File,
}

/// File-backed ledger: one JSON entry per line. Every append is flushed and
/// synced before it becomes visible to readers.
pub struct JsonlAuditLedger {
    path: PathBuf,
    inner: Mutex<JsonlInner>,
}

impl JsonlAuditLedger {
    /// Opens (or creates) the ledger at `path`, verifying the existing chain
    /// before any new append is accepted.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => Self::parse_contents(&path, &contents).await?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let state = ChainState::from_entries(entries)?;

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        info!(
            path = %path.display(),
            entries = state.entries.len(),
            head = %short(&state.head_hash()),
            "📒 Audit ledger opened"
        );

        Ok(Self {
            path,
            inner: Mutex::new(JsonlInner { state, file }),
        })
    }

    /// Reads and verifies a ledger file without opening it for append
    pub async fn read_entries(path: impl AsRef<Path>) -> Result<Vec<LedgerEntry>> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path).await?;
        let entries = parse_lines(&contents, false)?;
        crate::entry::verify_chain(&entries)?;
        Ok(entries)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn parse_contents(path: &Path, contents: &str) -> Result<Vec<LedgerEntry>> {
        match parse_lines(contents, true) {
            Ok(entries) => Ok(entries),
            Err(LedgerError::MalformedLine { line, reason }) if !contents.ends_with('\n') => {
                // A torn final write: keep everything up to the last newline.
                let keep = contents.rfind('\n').map(|i| i + 1).unwrap_or(0);
                warn!(
                    path = %path.display(),
                    line,
                    reason = %reason,
                    truncated_bytes = contents.len() - keep,
                    "Discarding incomplete trailing ledger line"
                );
                let file = OpenOptions::new().write(true).open(path).await?;
                file.set_len(keep as u64).await?;
                file.sync_all().await?;
                parse_lines(&contents[..keep], false)
            }
            Err(e) => Err(e),
        }
    }
}

/// Parses one entry per non-empty line. With `tolerate_tail` a bad final
/// line is reported so the caller can decide whether it was a torn write.
fn parse_lines(contents: &str, tolerate_tail: bool) -> Result<Vec<LedgerEntry>> {
    let lines: Vec<(usize, &str)> = contents
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .collect();
    let last = lines.len().saturating_sub(1);

    let mut entries = Vec::with_capacity(lines.len());
    for (pos, (index, line)) in lines.iter().enumerate() {
        match serde_json::from_str::<LedgerEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => {
                let err = LedgerError::MalformedLine {
                    line: index + 1,
                    reason: e.to_string(),
                };
                if tolerate_tail && pos == last {
                    return Err(err);
                }
                return Err(LedgerError::ChainBroken {
                    seq: entries.len() as u64 + 1,
                    reason: err.to_string(),
                });
            }
        }
    }
    Ok(entries)
}

/// The append side of the ledger file
#[async_trait]
trait AppendTarget: Send {
    async fn end(&mut self) -> io::Result<u64>;

    /// Writes `buf` at the end and syncs it
    async fn append_synced(&mut self, buf: &[u8]) -> io::Result<()>;

    async fn truncate(&mut self, len: u64) -> io::Result<()>;
}

#[async_trait]
impl AppendTarget for File {
    async fn end(&mut self) -> io::Result<u64> {
        Ok(self.metadata().await?.len())
    }

    async fn append_synced(&mut self, buf: &[u8]) -> io::Result<()> {
        self.write_all(buf).await?;
        self.flush().await?;
        self.sync_data().await
    }

    async fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len).await?;
        self.sync_all().await
    }
}

/// Appends one sealed batch. On failure the file is cut back to its
/// previous length so no partial line is left ahead of later appends.
async fn write_batch<T: AppendTarget + ?Sized>(target: &mut T, buf: &[u8]) -> Result<()> {
    let start = target.end().await?;
    if let Err(e) = target.append_synced(buf).await {
        warn!(error = %e, restore_len = start, "Ledger write failed, rolling back torn batch");
        if let Err(rollback) = target.truncate(start).await {
            warn!(error = %rollback, "Could not roll back torn ledger batch");
        }
        return Err(e.into());
    }
    Ok(())
}

fn short(hash: &str) -> &str {
    &hash[..hash.len().min(12)]
}

#[async_trait]
impl AuditLedger for JsonlAuditLedger {
    async fn append(&self, bounty_id: BountyId, events: Vec<LedgerEvent>) -> Result<Vec<LedgerEntry>> {
        let mut inner = self.inner.lock().await;
        let sealed = inner.state.seal(bounty_id, events)?;

        let mut buf = Vec::new();
        for entry in &sealed {
            serde_json::to_writer(&mut buf, entry)?;
            buf.push(b'\n');
        }

        write_batch(&mut inner.file, &buf).await?;
        inner.state.commit(&sealed);

        debug!(
            bounty_id = %bounty_id,
            appended = sealed.len(),
            head = %short(&inner.state.head_hash()),
            "Ledger entries persisted"
        );
        Ok(sealed)
    }

    async fn entries(&self) -> Result<Vec<LedgerEntry>> {
        Ok(self.inner.lock().await.state.entries.clone())
    }

    async fn len(&self) -> usize {
        self.inner.lock().await.state.entries.len()
    }

    async fn head_hash(&self) -> String {
        self.inner.lock().await.state.head_hash()
    }
}
