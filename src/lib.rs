pub mod errors;
pub mod server;
pub mod storage;

use crate::errors::*;

pub type StorageResult<T> = Result<T, StorageError>;
pub type IndexResult<T> = Result<T, IndexError>;
pub type SegmentResult<T> = Result<T, SegmentError>;
pub type LogResult<T> = Result<T, LogError>;

pub use storage::index::Index;
pub use storage::log::{Log, LogConfig};
pub use storage::segment::{Segment, SegmentConfig};
pub use storage::store::Store;
