//! Read path: staged content first, committed chunks otherwise.

use gridmount_storage::ChunkStore;
use tracing::debug;

use crate::error::{FsError, FsResult};
use crate::table::{OpenFileTable, SharedFile};

pub struct ReadRouter<'a> {
    table: &'a OpenFileTable,
    store: &'a dyn ChunkStore,
}

impl<'a> ReadRouter<'a> {
    pub fn new(table: &'a OpenFileTable, store: &'a dyn ChunkStore) -> Self {
        ReadRouter { table, store }
    }

    /// Up to `size` bytes of `name` starting at `offset`; empty at EOF.
    pub async fn read(&self, name: &str, size: usize, offset: u64) -> FsResult<Vec<u8>> {
        if let Some(file) = self.table.lookup(name) {
            return Ok(read_staged(&file, size, offset));
        }
        self.read_stored(name, size, offset).await
    }

    async fn read_stored(&self, name: &str, size: usize, offset: u64) -> FsResult<Vec<u8>> {
        let record = self
            .store
            .find_metadata(name)
            .await?
            .ok_or(FsError::NotFound)?;
        if record.chunk_size == 0 || offset >= record.length {
            return Ok(Vec::new());
        }

        let chunk_size = record.chunk_size as u64;
        let mut out = Vec::with_capacity(size.min((record.length - offset) as usize));
        let mut seq = offset / chunk_size;
        let mut skip = (offset % chunk_size) as usize;

        while out.len() < size {
            let Some(expected) = record.chunk_len(seq) else {
                break;
            };
            let chunk = self.store.read_chunk(record.id, seq).await?;
            // bytes past the record's length are never served
            let chunk = &chunk[..chunk.len().min(expected as usize)];
            if skip >= chunk.len() {
                break;
            }
            let n = (chunk.len() - skip).min(size - out.len());
            out.extend_from_slice(&chunk[skip..skip + n]);
            skip = 0;
            seq += 1;
        }

        debug!(name, offset, requested = size, returned = out.len(), "read committed chunks");
        Ok(out)
    }
}

fn read_staged(file: &SharedFile, size: usize, offset: u64) -> Vec<u8> {
    let file = file.lock().unwrap();
    let available = file.len().saturating_sub(offset) as usize;
    let mut buf = vec![0u8; size.min(available)];
    let n = file.read(&mut buf, offset);
    buf.truncate(n);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use gridmount_core::types::store_time_now;
    use gridmount_core::{FileId, FileRecord};
    use gridmount_storage::GridStore;
    use std::collections::BTreeMap;

    async fn stored(store: &GridStore, name: &str, content: &[u8], chunk_size: u32) {
        let id = FileId::new();
        for (seq, chunk) in content.chunks(chunk_size as usize).enumerate() {
            store
                .insert_chunk(id, seq as u64, Bytes::copy_from_slice(chunk))
                .await
                .unwrap();
        }
        store
            .insert_metadata(&FileRecord {
                id,
                filename: name.into(),
                chunk_size,
                length: content.len() as u64,
                upload_time: store_time_now(),
                content_hash: String::new(),
                attributes: BTreeMap::new(),
            })
            .await
            .unwrap();
    }

    fn store() -> GridStore {
        GridStore::new(gridmount_storage::memory_operator().unwrap(), "readtest")
    }

    #[tokio::test]
    async fn reads_across_remote_chunks() {
        let store = store();
        let table = OpenFileTable::new();
        stored(&store, "a.txt", b"0123456789", 4).await;
        let router = ReadRouter::new(&table, &store);

        assert_eq!(router.read("a.txt", 100, 0).await.unwrap(), b"0123456789");
        assert_eq!(router.read("a.txt", 5, 3).await.unwrap(), b"34567");
        assert_eq!(router.read("a.txt", 10, 8).await.unwrap(), b"89");
        assert!(router.read("a.txt", 10, 10).await.unwrap().is_empty());
        assert!(router.read("a.txt", 10, 50).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn staged_copy_wins() {
        let store = store();
        let table = OpenFileTable::new();
        stored(&store, "a.txt", b"remote", 4).await;
        table.create("a.txt", 4).lock().unwrap().write(b"local", 0);

        let router = ReadRouter::new(&table, &store);
        assert_eq!(router.read("a.txt", 64, 0).await.unwrap(), b"local");
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let store = store();
        let table = OpenFileTable::new();
        let router = ReadRouter::new(&table, &store);
        assert!(matches!(
            router.read("nope.txt", 10, 0).await,
            Err(FsError::NotFound)
        ));
    }

    #[tokio::test]
    async fn empty_object_reads_empty() {
        let store = store();
        let table = OpenFileTable::new();
        stored(&store, "empty.txt", b"", 4).await;
        let router = ReadRouter::new(&table, &store);
        assert!(router.read("empty.txt", 10, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversized_last_chunk_is_clamped_to_length() {
        let store = store();
        let table = OpenFileTable::new();
        let id = FileId::new();
        store.insert_chunk(id, 0, Bytes::from_static(b"0123")).await.unwrap();
        store.insert_chunk(id, 1, Bytes::from_static(b"45zz")).await.unwrap();
        store
            .insert_metadata(&FileRecord {
                id,
                filename: "pad.txt".into(),
                chunk_size: 4,
                length: 6,
                upload_time: store_time_now(),
                content_hash: String::new(),
                attributes: BTreeMap::new(),
            })
            .await
            .unwrap();

        let router = ReadRouter::new(&table, &store);
        assert_eq!(router.read("pad.txt", 64, 0).await.unwrap(), b"012345");
        assert_eq!(router.read("pad.txt", 64, 5).await.unwrap(), b"5");
    }
}
