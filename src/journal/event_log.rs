use chrono::Utc;
use log::{debug, error, info, warn};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::journal::entry::{LogEntry, LogStats};

/// Error returned by a replay handler
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

const SEGMENT_PREFIX: &str = "wal_";
const SEGMENT_SUFFIX: &str = ".log";

/// Journal errors
#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("journal serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("journal is closed")]
    Closed,

    #[error("replay handler failed at seq {sequence}: {source}")]
    Handler {
        sequence: u64,
        #[source]
        source: HandlerError,
    },

    #[error("replay cancelled")]
    Cancelled,
}

/// Active segment state, guarded by the log's lock
struct Segment {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    sequence: u64,
    /// Bytes covered by acknowledged entries
    committed: u64,
}

impl Segment {
    /// Drop whatever a failed append left behind, buffered or on disk.
    ///
    /// If the segment cannot be cut back it is left closed, so later appends
    /// fail instead of landing behind a torn line.
    async fn discard_uncommitted(&mut self) {
        // dropping the writer throws away its buffer without flushing it
        self.writer = None;
        match truncate_for_append(&self.path, self.committed).await {
            Ok(file) => {
                self.writer = Some(BufWriter::new(file));
                warn!(
                    "Event log truncated {} back to {} bytes after a failed append",
                    self.path.display(),
                    self.committed
                );
            }
            Err(e) => error!(
                "Event log {} could not be repaired, closing it: {}",
                self.path.display(),
                e
            ),
        }
    }
}

/// Append-only, line-delimited JSON write-ahead log.
///
/// Every `append` is flushed and synced before it returns, so an entry that
/// was acknowledged survives a crash. Entries are totally ordered by their
/// sequence number, which starts at 1 for a fresh segment.
///
/// Rotation is destructive: the new segment starts empty and nothing from the
/// previous segment is carried over.
pub struct EventLog {
    dir: PathBuf,
    segment: RwLock<Segment>,
    #[cfg(test)]
    fault: std::sync::Mutex<Option<WriteStage>>,
}

/// Points in an append where a write can fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteStage {
    /// The line is in the writer's buffer, nothing flushed yet
    Buffered,
    /// The line reached the file but was not synced
    Flushed,
}

impl EventLog {
    /// Create the directory if needed and open a brand-new segment in it
    pub async fn create(dir: impl AsRef<Path>) -> Result<Self, JournalError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).await?;

        let (path, file) = open_new_segment(&dir).await?;
        info!("Event log opened new segment {}", path.display());

        Ok(Self {
            dir,
            segment: RwLock::new(Segment {
                path,
                writer: Some(BufWriter::new(file)),
                sequence: 0,
                committed: 0,
            }),
            #[cfg(test)]
            fault: std::sync::Mutex::new(None),
        })
    }

    /// Reopen an existing segment for appending.
    ///
    /// The sequence counter continues from the last well-formed entry in the
    /// segment. A torn trailing line is terminated so the next entry starts on
    /// a fresh line.
    pub async fn resume(path: impl AsRef<Path>) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        let bytes = fs::read(&path).await?;

        let mut sequence = 0;
        for line in bytes.split(|b| *b == b'\n') {
            if let Some(entry) = parse_line(line) {
                sequence = sequence.max(entry.sequence);
            }
        }

        let file = OpenOptions::new().append(true).open(&path).await?;
        let mut writer = BufWriter::new(file);
        let mut committed = bytes.len() as u64;
        if bytes.last().is_some_and(|b| *b != b'\n') {
            warn!(
                "Event log segment {} ends with a partial line, terminating it",
                path.display()
            );
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            committed += 1;
        }

        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        info!(
            "Event log resumed segment {} at seq {}",
            path.display(),
            sequence
        );

        Ok(Self {
            dir,
            segment: RwLock::new(Segment {
                path,
                writer: Some(writer),
                sequence,
                committed,
            }),
            #[cfg(test)]
            fault: std::sync::Mutex::new(None),
        })
    }

    /// Most recent segment in `dir`, if any
    pub async fn latest_segment(dir: impl AsRef<Path>) -> Result<Option<PathBuf>, JournalError> {
        let mut entries = match fs::read_dir(dir.as_ref()).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let mut latest: Option<(i64, PathBuf)> = None;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let Some(stamp) = segment_stamp(&path) else {
                continue;
            };
            if latest.as_ref().map_or(true, |(best, _)| stamp > *best) {
                latest = Some((stamp, path));
            }
        }
        Ok(latest.map(|(_, path)| path))
    }

    /// Durably append one entry and return it.
    ///
    /// The sequence number is only consumed when the write succeeded. A failed
    /// write is cut back out of the segment before the error is returned.
    pub async fn append<T>(&self, kind: &str, payload: &T) -> Result<LogEntry, JournalError>
    where
        T: Serialize + ?Sized,
    {
        let payload = serde_json::to_value(payload)?;

        let mut guard = self.segment.write().await;
        let segment = &mut *guard;
        let writer = segment.writer.as_mut().ok_or(JournalError::Closed)?;

        let entry = LogEntry {
            sequence: segment.sequence + 1,
            kind: kind.to_string(),
            timestamp: Utc::now(),
            payload,
        };
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');

        let written = async {
            writer.write_all(&line).await?;
            self.inject_fault(WriteStage::Buffered)?;
            writer.flush().await?;
            self.inject_fault(WriteStage::Flushed)?;
            writer.get_ref().sync_data().await
        }
        .await;

        if let Err(e) = written {
            error!("Event log append of seq {} failed: {}", entry.sequence, e);
            segment.discard_uncommitted().await;
            return Err(e.into());
        }

        segment.sequence = entry.sequence;
        segment.committed += line.len() as u64;
        debug!("Event log appended seq {} ({})", entry.sequence, entry.kind);
        Ok(entry)
    }

    /// Replay every entry of the current segment in order
    pub async fn replay_all<F>(
        &self,
        cancel: &CancellationToken,
        handler: F,
    ) -> Result<usize, JournalError>
    where
        F: FnMut(LogEntry) -> Result<(), HandlerError>,
    {
        self.replay(None, cancel, handler).await
    }

    /// Replay entries with a sequence number strictly greater than `sequence`
    pub async fn replay_from<F>(
        &self,
        sequence: u64,
        cancel: &CancellationToken,
        handler: F,
    ) -> Result<usize, JournalError>
    where
        F: FnMut(LogEntry) -> Result<(), HandlerError>,
    {
        self.replay(Some(sequence), cancel, handler).await
    }

    async fn replay<F>(
        &self,
        after: Option<u64>,
        cancel: &CancellationToken,
        mut handler: F,
    ) -> Result<usize, JournalError>
    where
        F: FnMut(LogEntry) -> Result<(), HandlerError>,
    {
        let path = self.segment.read().await.path.clone();
        let mut reader = BufReader::new(File::open(&path).await?);

        let mut delivered = 0;
        let mut line_no = 0usize;
        let mut buf = Vec::new();
        loop {
            if cancel.is_cancelled() {
                return Err(JournalError::Cancelled);
            }

            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            line_no += 1;

            let line = trim_line(&buf);
            if line.is_empty() {
                continue;
            }
            let Some(entry) = parse_line(line) else {
                warn!(
                    "Skipping malformed line {} in {}",
                    line_no,
                    path.display()
                );
                continue;
            };

            if after.is_some_and(|after| entry.sequence <= after) {
                continue;
            }

            let sequence = entry.sequence;
            handler(entry).map_err(|source| JournalError::Handler { sequence, source })?;
            delivered += 1;
        }

        debug!("Replayed {} entries from {}", delivered, path.display());
        Ok(delivered)
    }

    /// Start a new, empty segment and set the counter to `sequence`.
    ///
    /// The next append is assigned `sequence + 1`. Entries in the previous
    /// segment stay on disk but are no longer visible to replay.
    pub async fn rotate(&self, sequence: u64) -> Result<(), JournalError> {
        let mut guard = self.segment.write().await;
        if guard.writer.is_none() {
            return Err(JournalError::Closed);
        }

        let (path, file) = open_new_segment(&self.dir).await?;
        let previous = guard.writer.replace(BufWriter::new(file));
        let old_path = std::mem::replace(&mut guard.path, path);
        guard.sequence = sequence;
        guard.committed = 0;

        if let Some(mut old) = previous {
            if let Err(e) = old.flush().await {
                warn!("Failed to flush rotated segment {}: {}", old_path.display(), e);
            }
        }

        info!(
            "Event log rotated {} -> {} at seq {}",
            old_path.display(),
            guard.path.display(),
            sequence
        );
        Ok(())
    }

    #[cfg(not(test))]
    fn inject_fault(&self, _stage: WriteStage) -> io::Result<()> {
        Ok(())
    }

    #[cfg(test)]
    fn inject_fault(&self, stage: WriteStage) -> io::Result<()> {
        let mut fault = self.fault.lock().unwrap();
        if *fault == Some(stage) {
            *fault = None;
            return Err(io::Error::new(io::ErrorKind::Other, "injected write failure"));
        }
        Ok(())
    }

    #[cfg(test)]
    fn fail_next_append(&self, stage: WriteStage) {
        *self.fault.lock().unwrap() = Some(stage);
    }

    /// Current segment path, size on disk and last sequence number
    pub async fn stats(&self) -> Result<LogStats, JournalError> {
        let guard = self.segment.read().await;
        let size_bytes = fs::metadata(&guard.path).await?.len();
        Ok(LogStats {
            segment: guard.path.clone(),
            size_bytes,
            sequence: guard.sequence,
        })
    }

    /// Last sequence number assigned
    pub async fn sequence(&self) -> u64 {
        self.segment.read().await.sequence
    }

    pub async fn segment_path(&self) -> PathBuf {
        self.segment.read().await.path.clone()
    }

    pub async fn is_closed(&self) -> bool {
        self.segment.read().await.writer.is_none()
    }

    /// Flush and release the segment. Safe to call more than once.
    pub async fn close(&self) -> Result<(), JournalError> {
        let mut guard = self.segment.write().await;
        if let Some(mut writer) = guard.writer.take() {
            writer.flush().await?;
            writer.get_ref().sync_all().await?;
            info!(
                "Event log closed {} at seq {}",
                guard.path.display(),
                guard.sequence
            );
        }
        Ok(())
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog").field("dir", &self.dir).finish()
    }
}

/// Cut `path` back to `len` bytes and reopen it for appending
async fn truncate_for_append(path: &Path, len: u64) -> io::Result<File> {
    let file = OpenOptions::new().write(true).open(path).await?;
    file.set_len(len).await?;
    file.sync_data().await?;
    drop(file);
    OpenOptions::new().append(true).open(path).await
}

/// Open `wal_<unix-nanos>.log`, bumping the stamp if the name is taken
async fn open_new_segment(dir: &Path) -> io::Result<(PathBuf, File)> {
    let mut stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    loop {
        let path = dir.join(format!("{SEGMENT_PREFIX}{stamp}{SEGMENT_SUFFIX}"));
        match OpenOptions::new()
            .append(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => stamp += 1,
            Err(e) => return Err(e),
        }
    }
}

fn segment_stamp(path: &Path) -> Option<i64> {
    path.file_name()?
        .to_str()?
        .strip_prefix(SEGMENT_PREFIX)?
        .strip_suffix(SEGMENT_SUFFIX)?
        .parse()
        .ok()
}

fn trim_line(buf: &[u8]) -> &[u8] {
    let mut end = buf.len();
    while end > 0 && matches!(buf[end - 1], b'\n' | b'\r') {
        end -= 1;
    }
    &buf[..end]
}

fn parse_line(line: &[u8]) -> Option<LogEntry> {
    let line = trim_line(line);
    if line.is_empty() {
        return None;
    }
    serde_json::from_slice(line).ok()
}
