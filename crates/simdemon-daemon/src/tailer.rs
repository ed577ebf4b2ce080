//! Log Tailer
//!
//! Follows log files line by line from their current end, republishing each
//! complete line tagged with its [`LogSource`]. One polling task runs per
//! source, so per-source order is preserved while lines from different
//! sources interleave in arrival order.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use simdemon_core::prelude::*;
use simdemon_core::LogSource;

/// Default delay between polls of a followed file
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Unterminated bytes held back before they are flushed as a line anyway
pub const MAX_PARTIAL_LINE: usize = 64 * 1024;

/// One complete line read from a followed source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailedLine {
    pub source: LogSource,
    pub line: String,
}

/// Read position within one followed file
#[derive(Debug)]
pub struct FileCursor {
    path: PathBuf,
    offset: u64,
    file_id: Option<u64>,
    partial: Vec<u8>,
}

impl FileCursor {
    /// Attach at the current end of `path`, or at its start if it does not exist yet
    pub async fn attach(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (offset, file_id) = match tokio::fs::metadata(&path).await {
            Ok(meta) => (meta.len(), file_id(&meta)),
            Err(_) => (0, None),
        };
        debug!("Attached to {} at offset {}", path.display(), offset);
        Self {
            path,
            offset,
            file_id,
            partial: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read every complete line appended since the last call.
    ///
    /// A file that shrank or was replaced is reread from its start. A missing
    /// file yields nothing. Trailing bytes without a newline are held back
    /// until a newline arrives or they reach [`MAX_PARTIAL_LINE`].
    pub async fn read_lines(&mut self) -> std::io::Result<Vec<String>> {
        let meta = match tokio::fs::metadata(&self.path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let id = file_id(&meta);
        let replaced = self.file_id.is_some() && id != self.file_id;
        if replaced || meta.len() < self.offset {
            debug!("{} was rotated or truncated, rereading", self.path.display());
            self.offset = 0;
            self.partial.clear();
        }
        self.file_id = id;

        if meta.len() == self.offset {
            return Ok(Vec::new());
        }

        let mut file = File::open(&self.path).await?;
        file.seek(SeekFrom::Start(self.offset)).await?;
        let mut buf = Vec::new();
        let read = file.read_to_end(&mut buf).await?;
        self.offset += read as u64;
        self.partial.extend_from_slice(&buf);

        let mut lines = Vec::new();
        while let Some(pos) = self.partial.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.partial.drain(..=pos).collect();
            let text = &raw[..raw.len() - 1];
            let text = text.strip_suffix(b"\r").unwrap_or(text);
            lines.push(String::from_utf8_lossy(text).into_owned());
        }
        if self.partial.len() >= MAX_PARTIAL_LINE {
            debug!(
                "{} has {} bytes without a newline, flushing",
                self.path.display(),
                self.partial.len()
            );
            lines.push(String::from_utf8_lossy(&self.partial).into_owned());
            self.partial.clear();
        }
        Ok(lines)
    }
}

#[cfg(unix)]
fn file_id(meta: &std::fs::Metadata) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    Some(meta.ino())
}

#[cfg(not(unix))]
fn file_id(_meta: &std::fs::Metadata) -> Option<u64> {
    None
}

/// Follows any number of log files for the lifetime of a session
#[derive(Debug)]
pub struct LogTailer {
    poll_interval: Duration,
    followers: Vec<(LogSource, JoinHandle<()>)>,
}

impl Default for LogTailer {
    fn default() -> Self {
        Self::new(DEFAULT_POLL_INTERVAL)
    }
}

impl LogTailer {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            followers: Vec::new(),
        }
    }

    /// Start following `path` as `source`.
    ///
    /// The follower attaches at the current end of the file before this
    /// returns, so lines written afterwards are never missed. It stops on
    /// [`stop`](Self::stop), on drop, or once `tx` is closed.
    pub async fn follow(
        &mut self,
        source: LogSource,
        path: impl Into<PathBuf>,
        tx: mpsc::Sender<TailedLine>,
    ) {
        let cursor = FileCursor::attach(path).await;
        info!("Tailing {} ({})", cursor.path().display(), source.label());

        let handle = tokio::spawn(run_follower(
            cursor,
            source.clone(),
            self.poll_interval,
            tx,
        ));
        self.followers.push((source, handle));
    }

    /// Sources currently followed
    pub fn sources(&self) -> Vec<LogSource> {
        self.followers
            .iter()
            .filter(|(_, h)| !h.is_finished())
            .map(|(s, _)| s.clone())
            .collect()
    }

    pub fn is_following(&self, source: &LogSource) -> bool {
        self.followers
            .iter()
            .any(|(s, h)| s == source && !h.is_finished())
    }

    /// Abort every follower
    pub fn stop(&mut self) {
        for (source, handle) in self.followers.drain(..) {
            trace!("Detaching {} tailer", source.label());
            handle.abort();
        }
    }
}

impl Drop for LogTailer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_follower(
    mut cursor: FileCursor,
    source: LogSource,
    poll_interval: Duration,
    tx: mpsc::Sender<TailedLine>,
) {
    let mut interval = tokio::time::interval(poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tx.closed() => break,
            _ = interval.tick() => {}
        }

        let lines = match cursor.read_lines().await {
            Ok(lines) => lines,
            Err(e) => {
                warn!("Failed to read {}: {}", cursor.path().display(), e);
                continue;
            }
        };

        for line in lines {
            let tailed = TailedLine {
                source: source.clone(),
                line,
            };
            if tx.send(tailed).await.is_err() {
                debug!("{} tailer receiver dropped", source.label());
                return;
            }
        }
    }
}
