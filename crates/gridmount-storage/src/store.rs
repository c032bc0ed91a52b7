//! Chunked object store: the primitives the filesystem layer builds on.
//!
//! ## Layout
//!
//! Under a configurable prefix (the "database"), every stored file is one
//! JSON metadata record plus zero or more numbered chunk objects:
//!
//! ```text
//! {prefix}/files/{id}.json        → FileRecord
//! {prefix}/chunks/{id}/00000000   → first chunk_size bytes
//! {prefix}/chunks/{id}/00000001   → next chunk_size bytes
//! ```
//!
//! The store has no hierarchy of its own: a record's `filename` may contain
//! `/` but is never used as a key. Several records may briefly share a
//! filename while a commit repoints it; lookups return the newest.

use async_trait::async_trait;
use bytes::Bytes;
use gridmount_core::FileId;
use gridmount_core::FileRecord;
use opendal::{ErrorKind, Operator};
use thiserror::Error;
use tracing::debug;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend error: {0}")]
    Backend(#[from] opendal::Error),

    #[error("corrupt metadata record {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no metadata record with id {0}")]
    MissingRecord(FileId),

    #[error("chunk {seq} of {id} is missing")]
    MissingChunk { id: FileId, seq: u64 },
}

/// Primitives offered by the remote chunk store.
///
/// Every call is independent: implementations acquire whatever connection
/// they need per call and release it before returning.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Newest record carrying `filename`, if any.
    async fn find_metadata(&self, filename: &str) -> StoreResult<Option<FileRecord>>;

    /// Every metadata record in the store.
    async fn list_metadata(&self) -> StoreResult<Vec<FileRecord>>;

    /// Remove every object named `filename`; returns how many were removed.
    async fn delete_object(&self, filename: &str) -> StoreResult<usize>;

    /// Remove one object (record and chunks) by id.
    async fn delete_record(&self, id: FileId) -> StoreResult<()>;

    async fn insert_chunk(&self, parent: FileId, seq: u64, data: Bytes) -> StoreResult<()>;

    async fn insert_metadata(&self, record: &FileRecord) -> StoreResult<()>;

    /// Replace the record stored under `id`; fails if there is none.
    async fn update_metadata(&self, id: FileId, record: &FileRecord) -> StoreResult<()>;

    /// Digest of the chunk stream of `id`, in sequence order.
    async fn compute_digest(&self, id: FileId) -> StoreResult<String>;

    async fn read_chunk(&self, parent: FileId, seq: u64) -> StoreResult<Bytes>;
}

/// [`ChunkStore`] over an OpenDAL operator.
#[derive(Clone)]
pub struct GridStore {
    op: Operator,
    prefix: String,
}

impl GridStore {
    pub fn new(op: Operator, prefix: &str) -> Self {
        GridStore {
            op,
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn files_dir(&self) -> String {
        format!("{}/files/", self.prefix)
    }

    fn record_key(&self, id: FileId) -> String {
        format!("{}/files/{}.json", self.prefix, id)
    }

    fn chunks_dir(&self, id: FileId) -> String {
        format!("{}/chunks/{}/", self.prefix, id)
    }

    fn chunk_key(&self, id: FileId, seq: u64) -> String {
        format!("{}/chunks/{}/{:08}", self.prefix, id, seq)
    }

    async fn read_record(&self, key: &str) -> StoreResult<Option<FileRecord>> {
        let data = match self.op.read(key).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record = serde_json::from_slice(&data.to_bytes()).map_err(|source| {
            StoreError::Corrupt {
                key: key.to_string(),
                source,
            }
        })?;
        Ok(Some(record))
    }

    async fn write_record(&self, record: &FileRecord) -> StoreResult<()> {
        let key = self.record_key(record.id);
        let json = serde_json::to_vec(record).map_err(|source| StoreError::Corrupt {
            key: key.clone(),
            source,
        })?;
        self.op.write(&key, json).await?;
        Ok(())
    }

    /// Chunk object keys of `id`, in sequence order.
    async fn chunk_keys(&self, id: FileId) -> StoreResult<Vec<String>> {
        let dir = self.chunks_dir(id);
        let mut keys: Vec<String> = self
            .op
            .list(&dir)
            .await?
            .into_iter()
            .map(|entry| entry.path().to_string())
            .filter(|path| path.len() > dir.len() && !path.ends_with('/'))
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn remove_chunks(&self, id: FileId) -> StoreResult<()> {
        for key in self.chunk_keys(id).await? {
            self.op.delete(&key).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ChunkStore for GridStore {
    async fn find_metadata(&self, filename: &str) -> StoreResult<Option<FileRecord>> {
        let newest = self
            .list_metadata()
            .await?
            .into_iter()
            .filter(|r| r.filename == filename)
            .max_by(|a, b| (a.upload_time, a.id).cmp(&(b.upload_time, b.id)));
        Ok(newest)
    }

    async fn list_metadata(&self) -> StoreResult<Vec<FileRecord>> {
        let entries = self.op.list(&self.files_dir()).await?;
        let mut records = Vec::with_capacity(entries.len());
        for entry in entries {
            let path = entry.path();
            if !path.ends_with(".json") {
                continue;
            }
            // Records can vanish between list and read under a concurrent delete.
            if let Some(record) = self.read_record(path).await? {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.filename.cmp(&b.filename));
        Ok(records)
    }

    async fn delete_object(&self, filename: &str) -> StoreResult<usize> {
        let victims: Vec<FileRecord> = self
            .list_metadata()
            .await?
            .into_iter()
            .filter(|r| r.filename == filename)
            .collect();
        for record in &victims {
            self.delete_record(record.id).await?;
        }
        debug!(filename, removed = victims.len(), "deleted object");
        Ok(victims.len())
    }

    async fn delete_record(&self, id: FileId) -> StoreResult<()> {
        // Record first, so no reader can find a record whose chunks are gone.
        self.op.delete(&self.record_key(id)).await?;
        self.remove_chunks(id).await
    }

    async fn insert_chunk(&self, parent: FileId, seq: u64, data: Bytes) -> StoreResult<()> {
        let key = self.chunk_key(parent, seq);
        debug!(key = %key, bytes = data.len(), "insert chunk");
        self.op.write(&key, data).await?;
        Ok(())
    }

    async fn insert_metadata(&self, record: &FileRecord) -> StoreResult<()> {
        debug!(id = %record.id, filename = %record.filename, length = record.length, "insert metadata");
        self.write_record(record).await
    }

    async fn update_metadata(&self, id: FileId, record: &FileRecord) -> StoreResult<()> {
        if self.read_record(&self.record_key(id)).await?.is_none() {
            return Err(StoreError::MissingRecord(id));
        }
        let record = FileRecord {
            id,
            ..record.clone()
        };
        debug!(id = %id, filename = %record.filename, "update metadata");
        self.write_record(&record).await
    }

    async fn compute_digest(&self, id: FileId) -> StoreResult<String> {
        let mut hasher = blake3::Hasher::new();
        for key in self.chunk_keys(id).await? {
            let data = self.op.read(&key).await?;
            hasher.update(&data.to_bytes());
        }
        Ok(format!("blake3:{}", hasher.finalize().to_hex()))
    }

    async fn read_chunk(&self, parent: FileId, seq: u64) -> StoreResult<Bytes> {
        match self.op.read(&self.chunk_key(parent, seq)).await {
            Ok(data) => Ok(data.to_bytes()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(StoreError::MissingChunk { id: parent, seq })
            }
            Err(e) => Err(e.into()),
        }
    }
}
