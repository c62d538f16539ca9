//! The log is an ordered collection of segments. It assigns absolute
//! offsets by delegating to its active (tail) segment, rolls over to a new
//! segment after a successful append that leaves the active segment
//! maxed, routes reads to whichever segment owns the requested offset,
//! and exposes a streaming byte reader over every segment's store for
//! bulk replication snapshots.
use crate::LogResult;
use crate::errors::LogError;
use crate::storage::segment::{Segment, SegmentConfig};
use crate::storage::store::Store;
use std::collections::BTreeSet;
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, instrument};

/// Configuration for the log. Mirrors the spec's `segment.*` options.
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub max_store_bytes: u64,
    pub max_index_bytes: u64,
    pub initial_offset: u64,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            max_store_bytes: 1024,
            max_index_bytes: 1024,
            initial_offset: 0,
        }
    }
}

impl LogConfig {
    fn segment_config(&self) -> SegmentConfig {
        SegmentConfig {
            max_store_bytes: self.max_store_bytes,
            max_index_bytes: self.max_index_bytes,
        }
    }
}

struct LogInner {
    segments: Vec<Segment>,
}

impl LogInner {
    fn active(&self) -> &Segment {
        self.segments.last().expect("log always has a segment")
    }

    fn active_mut(&mut self) -> &mut Segment {
        self.segments.last_mut().expect("log always has a segment")
    }
}

/// An ordered collection of segments backed by a directory on disk. A
/// single exclusive mutex covers every operation, because the active
/// segment's store uses a buffered writer that requires a flush-before-read
/// discipline — the simplest correct design under that constraint.
pub struct Log {
    dir: PathBuf,
    config: LogConfig,
    inner: Mutex<LogInner>,
}

impl Log {
    #[instrument(skip(config), fields(dir = ?dir.clone()))]
    pub fn new(dir: PathBuf, config: LogConfig) -> LogResult<Self> {
        fs::create_dir_all(&dir).map_err(|source| LogError::DirectoryError {
            path: dir.to_string_lossy().into_owned(),
            source,
        })?;

        let segments = Self::setup(&dir, &config)?;

        info!(
            dir = ?dir,
            segment_count = segments.len(),
            "log opened"
        );

        Ok(Log {
            dir,
            config,
            inner: Mutex::new(LogInner { segments }),
        })
    }

    /// Scans the directory for existing segment base offsets, deduplicates
    /// them (each base offset has both a `.store` and an `.index` file,
    /// which must not each spawn their own segment), and opens one segment
    /// per unique base offset in ascending order. An empty directory gets a
    /// single fresh segment at `config.initial_offset`.
    fn setup(dir: &std::path::Path, config: &LogConfig) -> LogResult<Vec<Segment>> {
        let mut base_offsets = BTreeSet::new();

        for entry in fs::read_dir(dir).map_err(|source| LogError::DirectoryError {
            path: dir.to_string_lossy().into_owned(),
            source,
        })? {
            let entry = entry.map_err(|source| LogError::DirectoryError {
                path: dir.to_string_lossy().into_owned(),
                source,
            })?;
            let path = entry.path();
            let Some(stem) = path.file_stem() else {
                continue;
            };
            let Some(stem) = stem.to_str() else {
                return Err(LogError::InvalidSegmentFileName {
                    name: path.file_name().unwrap_or(stem).to_owned(),
                });
            };
            let Ok(base_offset) = stem.parse::<u64>() else {
                continue;
            };
            base_offsets.insert(base_offset);
        }

        if base_offsets.is_empty() {
            let segment = Segment::new(dir, config.initial_offset, config.segment_config())?;
            return Ok(vec![segment]);
        }

        base_offsets
            .into_iter()
            .map(|base_offset| Segment::new(dir, base_offset, config.segment_config()).map_err(LogError::from))
            .collect()
    }

    /// Appends `payload` to the active segment, rolling over to a fresh
    /// segment if the active one becomes maxed. Returns the assigned offset.
    #[instrument(skip(self, payload), fields(len = payload.len()))]
    pub fn append(&self, payload: &[u8]) -> LogResult<u64> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let offset = inner.active_mut().append(payload)?;

        if inner.active().is_maxed() {
            debug!(next_base = offset + 1, "active segment maxed, rolling over");
            let segment = Segment::new(&self.dir, offset + 1, self.config.segment_config())?;
            inner.segments.push(segment);
        }

        Ok(offset)
    }

    /// Reads the record at `offset`, or `OffsetOutOfRange` if no segment
    /// covers it.
    #[instrument(skip(self))]
    pub fn read(&self, offset: u64) -> LogResult<Vec<u8>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let segment = inner
            .segments
            .iter()
            .find(|s| s.contains_offset(offset));

        match segment {
            Some(segment) => Ok(segment.read(offset)?),
            None => Err(LogError::OffsetOutOfRange {
                offset,
                lowest: inner.segments.first().map(|s| s.base_offset()).unwrap_or(0),
                highest: inner.active().next_offset().saturating_sub(1),
            }),
        }
    }

    /// Base offset of the first segment.
    pub fn lowest_offset(&self) -> u64 {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.segments.first().map(|s| s.base_offset()).unwrap_or(0)
    }

    /// Last written offset, or 0 if the log is empty (including a log whose
    /// only record is at offset 0 — the spec's stated contract does not
    /// distinguish the two cases).
    pub fn highest_offset(&self) -> u64 {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let next = inner.active().next_offset();
        if next == 0 { 0 } else { next - 1 }
    }

    /// Drops every segment whose records are all at or below `lowest`.
    /// Removed segments are closed (flushed, msynced, truncated) before
    /// their files are deleted.
    #[instrument(skip(self))]
    pub fn truncate(&self, lowest: u64) -> LogResult<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let mut kept = Vec::with_capacity(inner.segments.len());
        for segment in std::mem::take(&mut inner.segments) {
            if segment.next_offset() <= lowest + 1 {
                info!(base_offset = segment.base_offset(), "truncating segment");
                segment.remove()?;
            } else {
                kept.push(segment);
            }
        }
        inner.segments = kept;

        Ok(())
    }

    /// Returns a byte stream concatenating every segment's store file, in
    /// segment order, each starting at byte 0. Intended for bulk
    /// replication snapshots: the stream yields raw framed records: callers
    /// re-parse the length prefixes. Reads store bytes through each
    /// segment's own `Store` lock, not the log's lock.
    #[instrument(skip(self))]
    pub fn reader(&self) -> LogReader {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let stores = inner.segments.iter().map(|s| s.store()).collect();
        LogReader { stores, index: 0, offset: 0 }
    }

    /// Closes every segment, in order. Aborts on the first error.
    #[instrument(skip(self))]
    pub fn close(&self) -> LogResult<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        for segment in inner.segments.iter_mut() {
            segment.close()?;
        }
        Ok(())
    }

    /// Closes the log, then deletes its directory tree.
    #[instrument(skip(self))]
    pub fn remove(self) -> LogResult<()> {
        self.close()?;
        fs::remove_dir_all(&self.dir).map_err(|source| LogError::DirectoryError {
            path: self.dir.to_string_lossy().into_owned(),
            source,
        })
    }

    /// Equivalent to `remove()` followed by re-creating a fresh log at the
    /// same directory.
    pub fn reset(self) -> LogResult<Self> {
        let dir = self.dir.clone();
        let config = self.config.clone();
        self.remove()?;
        Log::new(dir, config)
    }

    pub fn is_empty(&self) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.segments.iter().all(|s| s.is_empty())
    }
}

/// Streams the concatenated bytes of every segment's store, in order.
/// Implements `Read` so callers can treat the whole log as one byte source.
pub struct LogReader {
    stores: Vec<Arc<Store>>,
    index: usize,
    offset: u64,
}

impl Read for LogReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        loop {
            let Some(store) = self.stores.get(self.index) else {
                return Ok(0);
            };

            let n = store
                .read_at(buf, self.offset)
                .map_err(std::io::Error::other)?;

            if n == 0 {
                self.index += 1;
                self.offset = 0;
                continue;
            }

            self.offset += n as u64;
            return Ok(n);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn log(dir: &TempDir, config: LogConfig) -> Log {
        Log::new(dir.path().to_path_buf(), config).unwrap()
    }

    /// Scenario S3 from the spec.
    #[test]
    fn produce_consume_round_trip() {
        let dir = TempDir::new().unwrap();
        let log = log(&dir, LogConfig::default());

        let offset = log.append(b"hello world").unwrap();
        assert_eq!(offset, 0);
        assert_eq!(log.read(0).unwrap(), b"hello world");
        assert!(matches!(
            log.read(1),
            Err(LogError::OffsetOutOfRange { offset: 1, .. })
        ));
    }

    /// Scenario S4 from the spec.
    #[test]
    fn sequential_offsets_in_order() {
        let dir = TempDir::new().unwrap();
        let log = log(&dir, LogConfig::default());

        let o0 = log.append(b"first message").unwrap();
        let o1 = log.append(b"secod message").unwrap();
        assert_eq!((o0, o1), (0, 1));
        assert_eq!(log.read(o0).unwrap(), b"first message");
        assert_eq!(log.read(o1).unwrap(), b"secod message");
    }

    #[test]
    fn rollover_creates_new_segment_on_store_limit() {
        let dir = TempDir::new().unwrap();
        let record = b"hello world";
        // store frame is 8 + 11 = 19 bytes; cap at 2 records per segment.
        let config = LogConfig {
            max_store_bytes: 19 * 2,
            max_index_bytes: 1024,
            initial_offset: 0,
        };
        let log = log(&dir, config);

        for i in 0..5u64 {
            let offset = log.append(record).unwrap();
            assert_eq!(offset, i);
        }

        assert_eq!(log.lowest_offset(), 0);
        assert_eq!(log.highest_offset(), 4);
        for i in 0..5u64 {
            assert_eq!(log.read(i).unwrap(), record);
        }
    }

    /// Scenario S5 from the spec.
    #[test]
    fn truncate_drops_old_segments() {
        let dir = TempDir::new().unwrap();
        let record = b"hello world";
        let config = LogConfig {
            max_store_bytes: (8 + record.len() as u64) * 4,
            max_index_bytes: 1024,
            initial_offset: 0,
        };
        let log = log(&dir, config);

        for _ in 0..10 {
            log.append(record).unwrap();
        }

        log.truncate(3).unwrap();

        assert!(log.lowest_offset() >= 4);
        for offset in 0..=3u64 {
            assert!(matches!(
                log.read(offset),
                Err(LogError::OffsetOutOfRange { .. })
            ));
        }
        for offset in 4..=9u64 {
            assert_eq!(log.read(offset).unwrap(), record);
        }
    }

    /// Property 4 from the spec: reopen preserves offsets and content.
    #[test]
    fn reopen_preserves_state() {
        let dir = TempDir::new().unwrap();
        let records: Vec<&[u8]> = vec![b"a", b"b", b"c"];

        {
            let log = log(&dir, LogConfig::default());
            for record in &records {
                log.append(record).unwrap();
            }
            log.close().unwrap();
        }

        let log = log(&dir, LogConfig::default());
        assert_eq!(log.highest_offset(), 2);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(&log.read(i as u64).unwrap(), record);
        }
    }

    /// Scenario S6 from the spec: the reader concatenates raw store frames.
    #[test]
    fn reader_concatenates_segment_stores() {
        let dir = TempDir::new().unwrap();
        let config = LogConfig {
            max_store_bytes: (8 + 1) * 2,
            max_index_bytes: 1024,
            initial_offset: 0,
        };
        let log = log(&dir, config);

        for record in [b"a", b"b", b"c", b"d"] {
            log.append(record).unwrap();
        }

        let mut out = Vec::new();
        log.reader().read_to_end(&mut out).unwrap();

        let mut expected = Vec::new();
        for record in [b"a", b"b", b"c", b"d"] {
            expected.extend_from_slice(&1u64.to_be_bytes());
            expected.extend_from_slice(record);
        }
        assert_eq!(out, expected);
        assert_eq!(out.len(), 36);
    }

    #[test]
    fn setup_deduplicates_base_offsets() {
        let dir = TempDir::new().unwrap();
        {
            let log = log(&dir, LogConfig::default());
            log.append(b"x").unwrap();
            log.close().unwrap();
        }

        let log = log(&dir, LogConfig::default());
        assert_eq!(log.lowest_offset(), 0);
        assert_eq!(log.highest_offset(), 0);
    }

    #[test]
    fn empty_log_highest_offset_is_zero() {
        let dir = TempDir::new().unwrap();
        let log = log(&dir, LogConfig::default());
        assert_eq!(log.highest_offset(), 0);
        assert!(log.is_empty());
    }
}
