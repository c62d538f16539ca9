//! The store is the append-only file holding the actual log records. Each
//! record is framed as an 8-byte big-endian length prefix followed by
//! exactly that many payload bytes; a *byte position* is the offset of a
//! frame's length prefix within the file.
use crate::StorageResult;
use crate::errors::StorageError;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, instrument};

const LEN_WIDTH: u64 = 8;

struct StoreInner {
    writer: BufWriter<File>,
    size: u64,
}

/// Append-only, length-prefixed record file. A single mutex guards the
/// buffered writer and the size counter: appends and reads serialize
/// against each other because a read may need to flush pending writes
/// before it can observe them.
pub struct Store {
    /// Separate handle used for positional reads, independent of the
    /// `BufWriter`'s handle.
    file: File,
    inner: Mutex<StoreInner>,
}

impl Store {
    #[instrument(skip_all, fields(path = ?path.as_ref()))]
    pub fn new(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path_str = path.as_ref().to_string_lossy().into_owned();

        let file = OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(path.as_ref())
            .map_err(|source| StorageError::OpenFailed {
                path: path_str.clone(),
                source,
            })?;

        let read_handle = file.try_clone().map_err(|source| StorageError::OpenFailed {
            path: path_str,
            source,
        })?;

        let size = file.metadata().map_err(StorageError::FlushFailed)?.len();

        debug!(size, "store opened");

        Ok(Store {
            file: read_handle,
            inner: Mutex::new(StoreInner {
                writer: BufWriter::new(file),
                size,
            }),
        })
    }

    /// Appends `payload` to the store and returns `(bytes_written, position)`,
    /// where `position` is the byte offset of the record's length prefix.
    #[instrument(skip(self, payload), fields(len = payload.len()))]
    pub fn append(&self, payload: &[u8]) -> StorageResult<(u64, u64)> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());

        let position = inner.size;
        let len = payload.len() as u64;

        inner
            .writer
            .write_all(&len.to_be_bytes())
            .map_err(|source| StorageError::WriteFailed { position, source })?;
        inner
            .writer
            .write_all(payload)
            .map_err(|source| StorageError::WriteFailed { position, source })?;

        let written = LEN_WIDTH + len;
        inner.size += written;

        Ok((written, position))
    }

    /// Reads the record whose length prefix starts at `position`.
    #[instrument(skip(self), fields(position))]
    pub fn read(&self, position: u64) -> StorageResult<Vec<u8>> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.writer.flush().map_err(StorageError::FlushFailed)?;

        if position + LEN_WIDTH > inner.size {
            return Err(StorageError::ReadBeyondEnd {
                position,
                size: inner.size,
            });
        }

        let mut len_buf = [0u8; LEN_WIDTH as usize];
        self.file
            .read_exact_at(&mut len_buf, position)
            .map_err(|source| StorageError::ReadFailed { position, source })?;
        let len = u64::from_be_bytes(len_buf);

        if position + LEN_WIDTH + len > inner.size {
            return Err(StorageError::ReadBeyondEnd {
                position,
                size: inner.size,
            });
        }

        let mut payload = vec![0u8; len as usize];
        self.file
            .read_exact_at(&mut payload, position + LEN_WIDTH)
            .map_err(|source| StorageError::ReadFailed { position, source })?;

        Ok(payload)
    }

    /// Raw positional read used by the log's streaming reader. Flushes
    /// pending writes first so the stream never observes a torn frame.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> StorageResult<usize> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.writer.flush().map_err(StorageError::FlushFailed)?;

        if offset >= inner.size {
            return Ok(0);
        }

        let remaining = (inner.size - offset) as usize;
        let to_read = remaining.min(buf.len());

        self.file
            .read_at(&mut buf[..to_read], offset)
            .map_err(|source| StorageError::ReadFailed {
                position: offset,
                source,
            })
    }

    /// Current size of the store in bytes.
    pub fn size(&self) -> u64 {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).size
    }

    #[instrument(skip(self))]
    pub fn close(&self) -> StorageResult<()> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.writer.flush().map_err(StorageError::CloseFailed)?;
        inner
            .writer
            .get_ref()
            .sync_all()
            .map_err(StorageError::CloseFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn append_then_read_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().join("test.store")).unwrap();

        let (written, pos0) = store.append(b"hello world").unwrap();
        assert_eq!(written, LEN_WIDTH + 11);
        assert_eq!(pos0, 0);

        let (_, pos1) = store.append(b"second").unwrap();
        assert_eq!(pos1, LEN_WIDTH + 11);

        assert_eq!(store.read(pos0).unwrap(), b"hello world");
        assert_eq!(store.read(pos1).unwrap(), b"second");
    }

    #[test]
    fn read_beyond_end_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().join("test.store")).unwrap();
        store.append(b"x").unwrap();

        assert!(matches!(
            store.read(1024),
            Err(StorageError::ReadBeyondEnd { .. })
        ));
    }

    #[test]
    fn reopen_preserves_size_and_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.store");

        let pos = {
            let store = Store::new(&path).unwrap();
            let (_, pos) = store.append(b"durable").unwrap();
            store.close().unwrap();
            pos
        };

        let store = Store::new(&path).unwrap();
        assert_eq!(store.size(), LEN_WIDTH + 7);
        assert_eq!(store.read(pos).unwrap(), b"durable");
    }

    #[test]
    fn read_at_streams_raw_frames() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().join("test.store")).unwrap();
        store.append(b"a").unwrap();
        store.append(b"b").unwrap();

        let mut buf = vec![0u8; (LEN_WIDTH as usize + 1) * 2];
        let n = store.read_at(&mut buf, 0).unwrap();
        assert_eq!(n, buf.len());
        assert_eq!(&buf[LEN_WIDTH as usize..LEN_WIDTH as usize + 1], b"a");
        assert_eq!(&buf[buf.len() - 1..], b"b");
    }
}
