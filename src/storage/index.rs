//! The index speeds up reads by mapping a segment-relative offset to a
//! byte position in the store. Because relative offsets are dense and
//! monotonic starting at 0, lookup is a direct index: entry `k` lives at
//! byte `k * ENTRY_WIDTH`. The file is pre-truncated to its configured
//! maximum size and memory-mapped read/write/shared so that appends never
//! need to remap, and reads are a single page access.
use crate::IndexResult;
use crate::errors::IndexError;
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::path::Path;
use tracing::{debug, instrument};

const OFFSET_WIDTH: u64 = 4;
const POSITION_WIDTH: u64 = 8;
pub const ENTRY_WIDTH: u64 = OFFSET_WIDTH + POSITION_WIDTH;

/// Fixed-width `(relative_offset -> byte_position)` lookup table, memory
/// mapped over its entire pre-allocated maximum size. `size` counts valid
/// bytes written so far and is always a multiple of `ENTRY_WIDTH`.
pub struct Index {
    file: File,
    mmap: MmapMut,
    size: u64,
}

impl Index {
    #[instrument(skip_all, fields(path = ?path.as_ref(), max_size))]
    pub fn new(path: impl AsRef<Path>, max_size: u64) -> IndexResult<Self> {
        let path_str = path.as_ref().to_string_lossy().into_owned();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path.as_ref())
            .map_err(|source| IndexError::OpenFailed {
                path: path_str.clone(),
                source,
            })?;

        let size = file
            .metadata()
            .map_err(|source| IndexError::OpenFailed {
                path: path_str,
                source,
            })?
            .len();

        // Pre-allocate the full mapping so appends never need to remap.
        file.set_len(max_size)
            .map_err(|source| IndexError::GrowFailed {
                target_size: max_size,
                source,
            })?;

        let mmap = unsafe {
            MmapOptions::new()
                .len(max_size as usize)
                .map_mut(&file)
                .map_err(|source| IndexError::MmapFailed {
                    size: max_size,
                    source,
                })?
        };

        debug!(size, max_size, "index opened");

        Ok(Index { file, mmap, size })
    }

    /// Reads entry number `want`, or the last entry if `want == -1`.
    /// Returns `(relative_offset, byte_position)`.
    pub fn read(&self, want: i64) -> IndexResult<(u32, u64)> {
        if self.size == 0 {
            return Err(IndexError::EndOfStream);
        }

        let entry = if want == -1 {
            (self.size / ENTRY_WIDTH) - 1
        } else {
            want as u64
        };

        let pos = entry * ENTRY_WIDTH;
        if pos + ENTRY_WIDTH > self.size {
            return Err(IndexError::EndOfStream);
        }

        let rel_offset = u32::from_be_bytes(
            self.mmap[pos as usize..(pos + OFFSET_WIDTH) as usize]
                .try_into()
                .unwrap(),
        );
        let position = u64::from_be_bytes(
            self.mmap[(pos + OFFSET_WIDTH) as usize..(pos + ENTRY_WIDTH) as usize]
                .try_into()
                .unwrap(),
        );

        Ok((rel_offset, position))
    }

    /// Appends one entry at the tail. Returns `EndOfStream` if the mapped
    /// region has no room left — this is how a segment detects that its
    /// index has become full.
    pub fn write(&mut self, rel_offset: u32, position: u64) -> IndexResult<()> {
        if self.size + ENTRY_WIDTH > self.mmap.len() as u64 {
            return Err(IndexError::EndOfStream);
        }

        let pos = self.size as usize;
        self.mmap[pos..pos + OFFSET_WIDTH as usize].copy_from_slice(&rel_offset.to_be_bytes());
        self.mmap[pos + OFFSET_WIDTH as usize..pos + ENTRY_WIDTH as usize]
            .copy_from_slice(&position.to_be_bytes());
        self.size += ENTRY_WIDTH;

        Ok(())
    }

    /// Number of valid bytes written so far (always a multiple of `ENTRY_WIDTH`).
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[instrument(skip(self))]
    pub fn close(&mut self) -> IndexResult<()> {
        self.mmap.flush().map_err(IndexError::CloseFailed)?;
        self.file.sync_all().map_err(IndexError::CloseFailed)?;
        self.file
            .set_len(self.size)
            .map_err(IndexError::CloseFailed)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn empty_index_read_is_end_of_stream() {
        let dir = TempDir::new().unwrap();
        let idx = Index::new(dir.path().join("test.index"), 1024).unwrap();
        assert!(matches!(idx.read(-1), Err(IndexError::EndOfStream)));
    }

    /// Scenario S2 from the spec: write two entries, read them back, then
    /// exercise the -1 "last entry" lookup across a close/reopen cycle.
    #[test]
    fn tail_lookup_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.index");

        {
            let mut idx = Index::new(&path, 1024).unwrap();
            idx.write(0, 0).unwrap();
            idx.write(1, 10).unwrap();

            assert_eq!(idx.read(0).unwrap(), (0, 0));
            assert_eq!(idx.read(1).unwrap(), (1, 10));
            assert!(matches!(idx.read(2), Err(IndexError::EndOfStream)));

            idx.close().unwrap();
        }

        let idx = Index::new(&path, 1024).unwrap();
        assert_eq!(idx.read(-1).unwrap(), (1, 10));
    }

    #[test]
    fn write_past_max_size_is_end_of_stream() {
        let dir = TempDir::new().unwrap();
        let mut idx = Index::new(dir.path().join("test.index"), ENTRY_WIDTH).unwrap();
        idx.write(0, 0).unwrap();
        assert!(matches!(idx.write(1, 10), Err(IndexError::EndOfStream)));
    }

    #[test]
    fn close_truncates_file_to_valid_size() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.index");

        let mut idx = Index::new(&path, 4096).unwrap();
        idx.write(0, 0).unwrap();
        idx.write(1, 1).unwrap();
        idx.close().unwrap();

        let len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(len, ENTRY_WIDTH * 2);
    }
}
