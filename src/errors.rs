use std::io;
use thiserror::Error;

/// Errors raised by the record store (the length-prefixed append-only file).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("failed to open store file {path}")]
    OpenFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write to store at position {position}")]
    WriteFailed {
        position: u64,
        #[source]
        source: io::Error,
    },

    #[error("failed to read from store at position {position}")]
    ReadFailed {
        position: u64,
        #[source]
        source: io::Error,
    },

    #[error("read at position {position} would read past store size {size}")]
    ReadBeyondEnd { position: u64, size: u64 },

    #[error("failed to flush store buffer")]
    FlushFailed(#[source] io::Error),

    #[error("failed to close store")]
    CloseFailed(#[source] io::Error),
}

/// Errors raised by the offset index (the fixed-width memory-mapped lookup table).
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("failed to open index file {path}")]
    OpenFailed {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to grow index file to {target_size} bytes")]
    GrowFailed {
        target_size: u64,
        #[source]
        source: io::Error,
    },

    #[error("failed to memory-map index of size {size}")]
    MmapFailed {
        size: u64,
        #[source]
        source: io::Error,
    },

    #[error("failed to sync or close index")]
    CloseFailed(#[source] io::Error),

    /// Read/write ran off the end of the populated or mapped region. Mirrors the
    /// source implementation's reuse of `io.EOF` for both "entry not found" and
    /// "index full" conditions.
    #[error("index read or write reached end of stream")]
    EndOfStream,
}

/// Errors raised by a segment (one store + one index, offset-assigning).
#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("segment {base_offset} is full: store={store_size}/{max_store_bytes}, index={index_size}/{max_index_bytes}")]
    SegmentFull {
        base_offset: u64,
        store_size: u64,
        max_store_bytes: u64,
        index_size: u64,
        max_index_bytes: u64,
    },

    #[error("offset {offset} out of range for segment {base_offset}..{next_offset}")]
    OffsetOutOfRange {
        offset: u64,
        base_offset: u64,
        next_offset: u64,
    },

    #[error("failed to remove segment files for base offset {base_offset}")]
    RemoveFailed {
        base_offset: u64,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Index(#[from] IndexError),
}

/// Errors surfaced by the log, the API surface consumed by the RPC layer.
#[derive(Debug, Error)]
pub enum LogError {
    #[error("failed to read log directory {path}")]
    DirectoryError {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse segment file name {name:?} as a base offset")]
    InvalidSegmentFileName { name: std::ffi::OsString },

    /// The domain-level error: requested offset is below the lowest segment
    /// base or at/above the active segment's next offset.
    #[error("offset {offset} out of range: log spans {lowest}..{highest}")]
    OffsetOutOfRange {
        offset: u64,
        lowest: u64,
        highest: u64,
    },

    #[error(transparent)]
    Segment(#[from] SegmentError),
}

/// Errors surfaced at the network/RPC boundary, above the log proper.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("blocking task failed: {0}")]
    TaskFailed(String),
}
