//! Rename: rewrite the metadata record's filename, never the chunks.
//!
//! Only committed objects can be renamed. A staged copy under the old name
//! is left alone and will be committed under the old name on its next flush.

use gridmount_storage::ChunkStore;
use tracing::debug;

use crate::error::{FsError, FsResult};

pub struct RenameEngine<'a> {
    store: &'a dyn ChunkStore,
}

impl<'a> RenameEngine<'a> {
    pub fn new(store: &'a dyn ChunkStore) -> Self {
        RenameEngine { store }
    }

    /// Rename stored object `from` to `to`, replacing any object at `to`.
    pub async fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        let record = self
            .store
            .find_metadata(from)
            .await?
            .ok_or(FsError::NotFound)?;
        if from == to {
            return Ok(());
        }

        let replaced = self.store.delete_object(to).await?;
        self.store
            .update_metadata(record.id, &record.renamed(to))
            .await?;
        debug!(from, to, id = %record.id, replaced, "renamed");
        Ok(())
    }
}
