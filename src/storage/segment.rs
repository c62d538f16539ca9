//! A segment pairs one store with one index, assigns absolute offsets to
//! appended records, and decides when it is full (maxed) so the log knows
//! when to roll over to a fresh segment.
use crate::SegmentResult;
use crate::errors::{IndexError, SegmentError};
use crate::storage::index::{ENTRY_WIDTH, Index};
use crate::storage::store::Store;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Per-segment sizing limits. `max_index_bytes` must be at least
/// `ENTRY_WIDTH` (12) for a segment to accept any appends at all; a
/// smaller value is an acceptable degenerate configuration that is "born
/// maxed" and used by tests to exercise the segment-full path directly.
#[derive(Debug, Clone, Copy)]
pub struct SegmentConfig {
    pub max_store_bytes: u64,
    pub max_index_bytes: u64,
}

pub struct Segment {
    store_path: PathBuf,
    index_path: PathBuf,
    /// Shared so the log's streaming `reader()` can hold its own clone and
    /// read store bytes without taking the log's lock.
    store: Arc<Store>,
    index: Index,
    base_offset: u64,
    next_offset: u64,
    config: SegmentConfig,
}

impl Segment {
    #[instrument(skip(config), fields(base_offset))]
    pub fn new(
        dir: impl AsRef<Path>,
        base_offset: u64,
        config: SegmentConfig,
    ) -> SegmentResult<Self> {
        let store_path = dir.as_ref().join(format!("{base_offset:020}.store"));
        let index_path = dir.as_ref().join(format!("{base_offset:020}.index"));

        let store = Arc::new(Store::new(&store_path)?);
        let index = Index::new(&index_path, config.max_index_bytes)?;

        let next_offset = if index.is_empty() {
            base_offset
        } else {
            let (rel_offset, _) = index.read(-1)?;
            base_offset + rel_offset as u64 + 1
        };

        info!(
            base_offset,
            next_offset,
            store_size = store.size(),
            index_size = index.size(),
            "segment opened"
        );

        Ok(Segment {
            store_path,
            index_path,
            store,
            index,
            base_offset,
            next_offset,
            config,
        })
    }

    /// Assigns the next absolute offset, appends `payload` to the store and
    /// records the mapping in the index. Returns the assigned offset.
    #[instrument(skip(self, payload), fields(base_offset = self.base_offset, len = payload.len()))]
    pub fn append(&mut self, payload: &[u8]) -> SegmentResult<u64> {
        if self.is_maxed() {
            return Err(self.full_error());
        }

        let cur = self.next_offset;
        let (_, position) = self.store.append(payload)?;

        let rel_offset = (cur - self.base_offset) as u32;
        match self.index.write(rel_offset, position) {
            Ok(()) => {}
            Err(IndexError::EndOfStream) => return Err(self.full_error()),
            Err(e) => return Err(e.into()),
        }

        self.next_offset += 1;

        debug!(offset = cur, position, "record appended to segment");

        Ok(cur)
    }

    /// Reads the record at the given absolute offset.
    #[instrument(skip(self), fields(base_offset = self.base_offset))]
    pub fn read(&self, offset: u64) -> SegmentResult<Vec<u8>> {
        if offset < self.base_offset || offset >= self.next_offset {
            return Err(SegmentError::OffsetOutOfRange {
                offset,
                base_offset: self.base_offset,
                next_offset: self.next_offset,
            });
        }

        let rel_offset = (offset - self.base_offset) as i64;
        let (_, position) = self.index.read(rel_offset)?;
        Ok(self.store.read(position)?)
    }

    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    pub fn contains_offset(&self, offset: u64) -> bool {
        offset >= self.base_offset && offset < self.next_offset
    }

    /// A segment is maxed when either its store or its index has reached
    /// its configured size limit.
    pub fn is_maxed(&self) -> bool {
        self.store.size() >= self.config.max_store_bytes
            || self.index.size() >= self.config.max_index_bytes
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Shared handle to this segment's store, for the log's streaming reader.
    pub fn store(&self) -> Arc<Store> {
        Arc::clone(&self.store)
    }

    fn full_error(&self) -> SegmentError {
        SegmentError::SegmentFull {
            base_offset: self.base_offset,
            store_size: self.store.size(),
            max_store_bytes: self.config.max_store_bytes,
            index_size: self.index.size(),
            max_index_bytes: self.config.max_index_bytes,
        }
    }

    /// Closes the index (msync, fsync, truncate to valid size) then the
    /// store, matching the order the source's durability guarantees depend
    /// on: the index's tail-discovery-on-reopen needs its file length to
    /// exactly equal its valid byte count.
    #[instrument(skip(self), fields(base_offset = self.base_offset))]
    pub fn close(&mut self) -> SegmentResult<()> {
        self.index.close()?;
        self.store.close()?;
        Ok(())
    }

    /// Closes the segment, then deletes its store and index files.
    #[instrument(skip(self), fields(base_offset = self.base_offset))]
    pub fn remove(mut self) -> SegmentResult<()> {
        self.close()?;
        std::fs::remove_file(&self.store_path).map_err(|source| SegmentError::RemoveFailed {
            base_offset: self.base_offset,
            source,
        })?;
        std::fs::remove_file(&self.index_path).map_err(|source| SegmentError::RemoveFailed {
            base_offset: self.base_offset,
            source,
        })?;
        Ok(())
    }
}
