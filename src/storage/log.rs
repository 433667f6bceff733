//! Append-only, size-bounded text logs
//!
//! Each entry is one line, `"<unix-seconds>|<message>\n"`. When a file grows
//! past its cap the oldest lines are dropped so that the newest
//! `max(75%, 100)` lines survive. A per-file line count is cached under the
//! storage lock so appends and reads do not rescan the whole file.

use super::StorageLock;
use super::error::LogError;
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, info};

pub const NORMAL_LOG: &str = "normal_log.txt";
pub const ERROR_LOG: &str = "error_log.txt";

/// Timestamps below this (2020-01-01) were written before the clock was set
pub const CLOCK_SYNC_THRESHOLD: i64 = 1_577_836_800;

const MIN_KEPT_LINES: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogLine {
    pub timestamp: i64,
    pub message: String,
    /// False when `timestamp` is an uptime offset rather than wall-clock time
    #[serde(rename = "synced")]
    pub clock_synced: bool,
}

impl LogLine {
    fn parse(raw: &[u8]) -> Option<Self> {
        let text = String::from_utf8_lossy(raw);
        let text = text.trim_end_matches(['\n', '\r']);
        let (ts, message) = text.split_once('|')?;
        let timestamp: i64 = ts.trim().parse().ok()?;
        Some(Self {
            timestamp,
            message: message.to_string(),
            clock_synced: timestamp >= CLOCK_SYNC_THRESHOLD,
        })
    }
}

#[derive(Debug, Clone)]
pub struct LogStore {
    dir: PathBuf,
    lock: StorageLock,
    max_bytes: u64,
}

impl LogStore {
    pub fn new(dir: impl Into<PathBuf>, lock: StorageLock, max_bytes: u64) -> Self {
        Self {
            dir: dir.into(),
            lock,
            max_bytes,
        }
    }

    /// Append one entry, rotating first if the file is over its cap
    ///
    /// Empty messages are ignored. Newlines inside `message` become spaces.
    pub async fn append(&self, log_name: &str, timestamp: i64, message: &str) -> Result<(), LogError> {
        if message.trim().is_empty() {
            return Ok(());
        }
        let line = format!("{}|{}\n", timestamp, message.replace(['\n', '\r'], " "));

        let mut state = self.lock.acquire().await?;
        let path = self.dir.join(log_name);

        let mut count = match state.line_counts.get(log_name) {
            Some(count) => *count,
            None => count_lines(&path).await?,
        };

        let size = match fs::metadata(&path).await {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        if size > self.max_bytes {
            count = rotate(&path, count).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        state.line_counts.insert(log_name.to_string(), count + 1);
        Ok(())
    }

    /// Up to `max_entries` most recent entries, newest first
    ///
    /// Lines that do not parse as `timestamp|message` are skipped.
    pub async fn read_recent(&self, log_name: &str, max_entries: usize) -> Result<Vec<LogLine>, LogError> {
        let mut state = self.lock.acquire().await?;
        let path = self.dir.join(log_name);

        let file = match File::open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let total = match state.line_counts.get(log_name) {
            Some(count) => *count,
            None => {
                let count = count_lines(&path).await?;
                state.line_counts.insert(log_name.to_string(), count);
                count
            }
        };

        let mut reader = BufReader::new(file);
        skip_lines(&mut reader, total.saturating_sub(max_entries)).await?;

        let mut lines = Vec::with_capacity(max_entries.min(total));
        let mut raw = Vec::new();
        loop {
            raw.clear();
            if reader.read_until(b'\n', &mut raw).await? == 0 {
                break;
            }
            if let Some(line) = LogLine::parse(&raw) {
                lines.push(line);
            }
        }

        if lines.len() > max_entries {
            lines.drain(..lines.len() - max_entries);
        }
        lines.reverse();
        Ok(lines)
    }

    /// Cached line count for `log_name`, counting the file if not cached yet
    pub async fn line_count(&self, log_name: &str) -> Result<usize, LogError> {
        let mut state = self.lock.acquire().await?;
        if let Some(count) = state.line_counts.get(log_name) {
            return Ok(*count);
        }
        let count = count_lines(&self.dir.join(log_name)).await?;
        state.line_counts.insert(log_name.to_string(), count);
        Ok(count)
    }
}

async fn count_lines(path: &Path) -> Result<usize, LogError> {
    let file = match File::open(path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    let mut reader = BufReader::new(file);
    let mut count = 0;
    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            break;
        }
        count += buf.iter().filter(|&&b| b == b'\n').count();
        let len = buf.len();
        reader.consume(len);
    }
    debug!(path = %path.display(), lines = count, "Counted log lines");
    Ok(count)
}

/// Advance past `n` newline-terminated lines without reading them into memory
async fn skip_lines<R>(reader: &mut R, mut n: usize) -> Result<(), LogError>
where
    R: AsyncBufRead + Unpin,
{
    while n > 0 {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            break;
        }
        let mut consumed = buf.len();
        for (i, b) in buf.iter().enumerate() {
            if *b == b'\n' {
                n -= 1;
                if n == 0 {
                    consumed = i + 1;
                    break;
                }
            }
        }
        reader.consume(consumed);
    }
    Ok(())
}

/// Rewrite `path` keeping the newest `max(75%, 100)` of `total` lines,
/// returning how many lines the rewritten file holds
async fn rotate(path: &Path, total: usize) -> Result<usize, LogError> {
    let keep = (total * 3 / 4).max(MIN_KEPT_LINES);
    let skip = total.saturating_sub(keep);
    if skip == 0 {
        return Ok(total);
    }

    let mut reader = BufReader::new(File::open(path).await?);
    skip_lines(&mut reader, skip).await?;

    let tmp_path = path.with_extension("rotate");
    let mut writer = BufWriter::new(File::create(&tmp_path).await?);
    let mut kept = 0;
    loop {
        let buf = reader.fill_buf().await?;
        if buf.is_empty() {
            break;
        }
        kept += buf.iter().filter(|&&b| b == b'\n').count();
        writer.write_all(buf).await?;
        let len = buf.len();
        reader.consume(len);
    }
    writer.flush().await?;
    drop(writer);
    drop(reader);

    fs::rename(&tmp_path, path).await?;
    info!(path = %path.display(), dropped = skip, kept, "Rotated log file");
    Ok(kept)
}
