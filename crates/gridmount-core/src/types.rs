use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Chunk size used for newly created files (256 KiB)
pub const DEFAULT_CHUNK_SIZE: u32 = 256 * 1024;

/// Store timestamps are milliseconds; wall-clock times are seconds
pub const STORE_TIME_SCALE: u64 = 1000;

/// Identifier shared by a metadata record and all of its chunk records
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(uuid::Uuid);

impl FileId {
    pub fn new() -> Self {
        FileId(uuid::Uuid::new_v4())
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Metadata record describing one stored file.
///
/// Chunk records are keyed by `(id, sequence)` and are never referenced by
/// name, so renaming a file only rewrites this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileId,
    pub filename: String,
    pub chunk_size: u32,
    pub length: u64,
    /// Upload time in store-native units (milliseconds since the epoch)
    pub upload_time: u64,
    /// Digest of the full content, e.g. `blake3:<hex>`
    #[serde(default)]
    pub content_hash: String,
    /// Free-form attributes, exposed read-only as extended attributes
    #[serde(default)]
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl FileRecord {
    /// Number of chunk records backing `length` bytes.
    pub fn chunk_count(&self) -> u64 {
        if self.chunk_size == 0 {
            return 0;
        }
        self.length.div_ceil(self.chunk_size as u64)
    }

    /// Expected byte length of chunk `seq`, or `None` past the last chunk.
    pub fn chunk_len(&self, seq: u64) -> Option<u64> {
        if seq >= self.chunk_count() {
            return None;
        }
        let start = seq * self.chunk_size as u64;
        Some((self.length - start).min(self.chunk_size as u64))
    }

    /// Same record under a different name; id and chunks are untouched.
    pub fn renamed(&self, filename: impl Into<String>) -> Self {
        FileRecord {
            filename: filename.into(),
            ..self.clone()
        }
    }

    pub fn upload_system_time(&self) -> SystemTime {
        store_time_to_system_time(self.upload_time)
    }
}

/// Current wall-clock time in store-native units.
pub fn store_time_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Convert a store timestamp to whole Unix seconds.
pub fn store_time_to_unix_secs(t: u64) -> u64 {
    t / STORE_TIME_SCALE
}

/// Convert a store timestamp to a `SystemTime`, truncated to whole seconds.
pub fn store_time_to_system_time(t: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(store_time_to_unix_secs(t))
}
