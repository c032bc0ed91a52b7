//! Commit: turn a staged file into chunk records plus a metadata record.
//!
//! Two orderings are supported when an object with the same name exists:
//!
//! - [`CommitStrategy::Repoint`] uploads chunks, digest and metadata under a
//!   fresh id, then deletes the previous object(s). A failure before the
//!   metadata insert leaves the old object untouched. Until the old record
//!   is deleted both records exist and lookups pick the newer one.
//! - [`CommitStrategy::DeleteFirst`] deletes the old object, then uploads.
//!   A failure part-way leaves no object, or one with missing chunks.
//!
//! Neither ordering retries or rolls back the old object.

use std::collections::BTreeMap;

use gridmount_core::config::CommitStrategy;
use gridmount_core::types::store_time_now;
use gridmount_core::{FileId, FileRecord};
use gridmount_storage::{ChunkStore, StoreResult};
use tracing::{debug, info, warn};

use crate::error::{FsError, FsResult};
use crate::staged::Snapshot;
use crate::table::OpenFileTable;

#[derive(Debug, Clone, PartialEq)]
pub enum CommitOutcome {
    /// Nothing to do; no store call was made
    Clean,
    Committed(FileRecord),
}

pub struct CommitEngine<'a> {
    table: &'a OpenFileTable,
    store: &'a dyn ChunkStore,
    strategy: CommitStrategy,
}

impl<'a> CommitEngine<'a> {
    pub fn new(
        table: &'a OpenFileTable,
        store: &'a dyn ChunkStore,
        strategy: CommitStrategy,
    ) -> Self {
        CommitEngine {
            table,
            store,
            strategy,
        }
    }

    pub async fn flush(&self, name: &str) -> FsResult<CommitOutcome> {
        let file = self.table.lookup(name).ok_or(FsError::NotFound)?;
        let snapshot = file.lock().unwrap().begin_commit();
        let Some(snapshot) = snapshot else {
            debug!(name, "flush of clean file");
            return Ok(CommitOutcome::Clean);
        };

        let result = match self.strategy {
            CommitStrategy::Repoint => self.commit_repoint(name, &snapshot).await,
            CommitStrategy::DeleteFirst => self.commit_delete_first(name, &snapshot).await,
        };
        file.lock()
            .unwrap()
            .finish_commit(snapshot.generation, result.is_ok());

        match result {
            Ok(record) => {
                info!(
                    name,
                    id = %record.id,
                    bytes = record.length,
                    chunks = record.chunk_count(),
                    "committed"
                );
                Ok(CommitOutcome::Committed(record))
            }
            Err(e) => {
                warn!(name, "commit failed: {e}");
                Err(e.into())
            }
        }
    }

    async fn commit_repoint(&self, name: &str, snapshot: &Snapshot) -> StoreResult<FileRecord> {
        let previous: Vec<FileId> = self
            .store
            .list_metadata()
            .await?
            .into_iter()
            .filter(|r| r.filename == name)
            .map(|r| r.id)
            .collect();

        let id = FileId::new();
        let record = match self.upload(id, name, snapshot).await {
            Ok(record) => record,
            Err(e) => {
                if let Err(cleanup) = self.store.delete_record(id).await {
                    warn!(name, id = %id, "removing partial upload failed: {cleanup}");
                }
                return Err(e);
            }
        };

        for old in previous {
            self.store.delete_record(old).await?;
            debug!(name, id = %old, "dropped superseded object");
        }
        Ok(record)
    }

    async fn commit_delete_first(
        &self,
        name: &str,
        snapshot: &Snapshot,
    ) -> StoreResult<FileRecord> {
        if self.store.find_metadata(name).await?.is_some() {
            self.store.delete_object(name).await?;
        }
        self.upload(FileId::new(), name, snapshot).await
    }

    async fn upload(&self, id: FileId, name: &str, snapshot: &Snapshot) -> StoreResult<FileRecord> {
        let chunk_size = snapshot.chunk_size as usize;
        let length = snapshot.data.len();
        let mut seq = 0u64;
        let mut start = 0usize;
        while start < length {
            let end = (start + chunk_size).min(length);
            self.store
                .insert_chunk(id, seq, snapshot.data.slice(start..end))
                .await?;
            seq += 1;
            start = end;
        }

        let content_hash = self.store.compute_digest(id).await?;
        let record = FileRecord {
            id,
            filename: name.to_string(),
            chunk_size: snapshot.chunk_size,
            length: length as u64,
            upload_time: store_time_now(),
            content_hash,
            attributes: BTreeMap::new(),
        };
        self.store.insert_metadata(&record).await?;
        Ok(record)
    }
}
